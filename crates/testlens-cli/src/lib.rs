// SPDX-License-Identifier: MIT OR Apache-2.0
//! Library half of the `testlens` binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Subcommand implementations.
pub mod commands;
/// Event-stream replay.
pub mod replay;

pub use replay::{ReplayError, ReplayEvent, ReplayReport};
