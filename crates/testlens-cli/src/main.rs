// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use testlens_cli::commands;
use testlens_config::{ProcessEnv, Properties, TelemetryConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "testlens", version, about = "Test-run trace and metrics correlator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Process property as KEY=VALUE. Can be repeated; wins over [properties].
    #[arg(short = 'D', value_name = "KEY=VALUE", global = true, value_parser = parse_define)]
    define: Vec<(String, String)>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON-lines event stream through the correlator.
    Replay {
        /// Events file.
        events: PathBuf,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Load and validate the configuration.
    CheckConfig,

    /// Print the JSON schema of the configuration file.
    Schema,
}

fn parse_define(raw: &str) -> Result<(String, String), String> {
    Properties::parse_pair(raw).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load(cli.config.as_deref(), &ProcessEnv);

    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else if cli.debug {
        EnvFilter::new("testlens=debug")
    } else {
        let level = config
            .as_ref()
            .ok()
            .and_then(|c| c.log_level.as_deref())
            .unwrap_or("info");
        EnvFilter::try_new(format!("testlens={level}"))
            .unwrap_or_else(|_| EnvFilter::new("testlens=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Schema => {
            println!("{}", commands::schema_json()?);
            Ok(())
        }
        Commands::CheckConfig => cmd_check_config(config?),
        Commands::Replay { events, json } => {
            let properties: Properties = cli.define.into_iter().collect();
            cmd_replay(config?, properties, &events, json)
        }
    }
}

fn cmd_check_config(config: TelemetryConfig) -> Result<()> {
    let warnings = commands::check_config(&config)?;
    for warning in &warnings {
        println!("warning: {warning}");
    }
    println!("config ok");
    Ok(())
}

fn cmd_replay(
    config: TelemetryConfig,
    properties: Properties,
    events: &std::path::Path,
    json: bool,
) -> Result<()> {
    let report = commands::run_replay(&config, properties, events, ProcessEnv)?;
    if json {
        let text = serde_json::to_string_pretty(&report).context("serialize report")?;
        println!("{text}");
    } else {
        print!("{}", commands::format_report(&report));
    }
    Ok(())
}
