// SPDX-License-Identifier: MIT OR Apache-2.0
//! Lazily started HTTP endpoint serving `GET /metrics`.
//!
//! The endpoint runs on its own thread with a single-threaded tokio runtime so
//! that callers (test-framework callbacks) never need an async context.

use crate::MetricsError;
use crate::recorder::encode_registry;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus::Registry;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{debug, error};

#[derive(Default)]
struct Running {
    addr: Option<SocketAddr>,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

/// A once-only exposition endpoint.
///
/// `ensure_started` uses double-checked locking: an atomic fast path for the
/// common already-running case and a mutex around the bind so that concurrent
/// first callers produce exactly one server.
pub struct ExpositionEndpoint {
    bind: String,
    started: AtomicBool,
    running: Mutex<Running>,
}

impl ExpositionEndpoint {
    /// Endpoint that will bind `bind` (`host:port`) on first start.
    pub fn new(bind: impl Into<String>) -> Self {
        Self {
            bind: bind.into(),
            started: AtomicBool::new(false),
            running: Mutex::new(Running::default()),
        }
    }

    /// Whether the endpoint has been started (or shut down) already.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Address actually bound, while serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .addr
    }

    /// Start serving `registry` unless already started.
    ///
    /// Returns `Ok(true)` for the call that bound the socket and `Ok(false)`
    /// for every other call. A failed start leaves the endpoint unstarted, so
    /// a later call retries.
    pub fn ensure_started(&self, registry: &Registry) -> Result<bool, MetricsError> {
        if self.started.load(Ordering::Acquire) {
            return Ok(false);
        }
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if self.started.load(Ordering::Acquire) {
            return Ok(false);
        }

        let addr = resolve_bind(&self.bind)?;
        let listener = TcpListener::bind(addr).map_err(|source| MetricsError::Bind { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| MetricsError::Bind { addr, source })?;
        let local = listener
            .local_addr()
            .map_err(|source| MetricsError::Bind { addr, source })?;

        let app = Router::new()
            .route("/metrics", get(serve_metrics))
            .with_state(registry.clone());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("testlens-metrics".into())
            .spawn(move || serve(listener, app, stop_rx))
            .map_err(MetricsError::Spawn)?;

        running.addr = Some(local);
        running.stop = Some(stop_tx);
        running.thread = Some(thread);
        self.started.store(true, Ordering::Release);
        Ok(true)
    }

    /// Stop serving and join the server thread. The endpoint stays marked as
    /// started, so it is never bound again.
    pub fn shutdown(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        self.started.store(true, Ordering::Release);
        if let Some(stop) = running.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = running.thread.take() {
            if thread.join().is_err() {
                error!("metrics server thread panicked");
            }
        }
        if let Some(addr) = running.addr.take() {
            debug!(addr = %addr, "metrics endpoint stopped");
        }
    }
}

impl Drop for ExpositionEndpoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ExpositionEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpositionEndpoint")
            .field("bind", &self.bind)
            .field("started", &self.is_started())
            .finish()
    }
}

fn resolve_bind(bind: &str) -> Result<SocketAddr, MetricsError> {
    bind.to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| MetricsError::InvalidBind {
            addr: bind.to_string(),
        })
}

fn serve(listener: TcpListener, app: Router, stop: oneshot::Receiver<()>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build metrics server runtime");
            return;
        }
    };
    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::from_std(listener) {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, "failed to register metrics listener");
                return;
            }
        };
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = stop.await;
        });
        if let Err(e) = server.await {
            error!(error = %e, "metrics server exited with error");
        }
    });
}

async fn serve_metrics(State(registry): State<Registry>) -> Response {
    match encode_registry(&registry) {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
