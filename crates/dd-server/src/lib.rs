//! dd-server: DASH origin server.
//!
//! Serves packaged streams from `<output_dir>/<stream>/` over HTTP/1.1:
//!
//! - a custom accept loop bounded by a semaphore of `max_connections` permits
//! - one tracked Tokio task per connection, one request per connection
//! - graceful shutdown via a [`CancellationToken`], waiting up to the grace
//!   period for in-flight requests
//! - [`OriginServer::publish`], which packages a recording and only then makes
//!   it visible through the [`StreamRegistry`]

pub mod context;
pub mod error;
pub mod middleware;
pub mod registry;
pub mod router;
pub mod routes;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use dd_av::{validate_stream_name, DashPackager};
use dd_core::config::ServerConfig;
use dd_core::{Error, Result};
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub use crate::context::AppContext;
pub use crate::registry::StreamRegistry;

/// Packager plus the segment length it is run with.
#[derive(Clone)]
struct Publisher {
    packager: Arc<dyn DashPackager>,
    segment_duration_secs: f64,
}

/// The DASH origin. Share it behind an `Arc` to publish while it runs.
pub struct OriginServer {
    config: ServerConfig,
    ctx: AppContext,
    publisher: Option<Publisher>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
}

impl OriginServer {
    pub fn new(config: ServerConfig) -> Self {
        let ctx = AppContext::new(Arc::new(StreamRegistry::new()), config.output_dir.clone());
        let permits = Arc::new(Semaphore::new(config.max_connections.max(1)));
        Self {
            config,
            ctx,
            publisher: None,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            permits,
        }
    }

    /// Enable [`publish`](Self::publish).
    pub fn with_packager(mut self, packager: Arc<dyn DashPackager>, segment_duration_secs: f64) -> Self {
        self.publisher = Some(Publisher {
            packager,
            segment_duration_secs,
        });
        self
    }

    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.ctx.registry
    }

    pub fn output_dir(&self) -> &Path {
        self.ctx.output_dir()
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Make an already packaged stream visible. Returns the path it replaced.
    pub fn register(&self, stream_name: &str, source: impl AsRef<Path>) -> Result<Option<PathBuf>> {
        validate_stream_name(stream_name)?;
        Ok(self.ctx.registry.register(stream_name, source))
    }

    /// Package `source` into `<output_dir>/<stream_name>/` and register the
    /// stream once every output file is closed. Returns the manifest path.
    pub async fn publish(&self, source: &Path, stream_name: &str) -> Result<PathBuf> {
        validate_stream_name(stream_name)?;
        let publisher = self
            .publisher
            .as_ref()
            .ok_or_else(|| Error::Configuration("no DASH packager configured".into()))?;

        let packaged = publisher
            .packager
            .package(
                source,
                self.ctx.output_dir(),
                stream_name,
                publisher.segment_duration_secs,
            )
            .await?;

        self.ctx.registry.register(stream_name, source);
        tracing::info!(
            stream = stream_name,
            manifest = %packaged.manifest.display(),
            "stream published"
        );
        Ok(packaged.manifest)
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| Error::Bind { addr: addr.clone(), source })?;
        if let Ok(local) = listener.local_addr() {
            tracing::info!("DASH origin listening on http://{local}");
        }
        Ok(listener)
    }

    /// Bind and serve until the cancellation token fires.
    pub async fn serve(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.run(listener).await
    }

    /// Accept connections on `listener` until cancelled, then wait for
    /// in-flight connections for at most the grace period.
    pub async fn run(&self, listener: TcpListener) -> Result<()> {
        std::fs::create_dir_all(self.ctx.output_dir())
            .map_err(|e| Error::path(self.ctx.output_dir(), e))?;

        let app = router::build_router(self.ctx.clone());
        let header_timeout = Duration::from_secs(self.config.header_read_timeout_secs.max(1));

        self.accept_loop(listener, app, header_timeout).await;

        self.tracker.close();
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                in_flight = self.tracker.len(),
                "grace period elapsed; abandoning in-flight connections"
            );
        }
        tracing::info!("DASH origin stopped");
        Ok(())
    }

    /// Stop accepting connections and begin graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// The listener is dropped when this returns.
    async fn accept_loop(&self, listener: TcpListener, app: Router, header_timeout: Duration) {
        loop {
            let permit = tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = self.cancel.cancelled() => break,
            };

            let (stream, peer) = tokio::select! {
                result = listener.accept() => match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::debug!("Accept error: {e}");
                        continue;
                    }
                },
                _ = self.cancel.cancelled() => break,
            };

            let app = app.clone();
            self.tracker.spawn(async move {
                handle_connection(stream, peer, app, header_timeout).await;
                drop(permit);
            });
        }
    }
}

/// Serve one request on `stream`, then close it.
async fn handle_connection(stream: TcpStream, peer: SocketAddr, app: Router, header_timeout: Duration) {
    let io = TokioIo::new(stream);
    let service = TowerToHyperService::new(app.into_service());
    if let Err(e) = hyper::server::conn::http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(header_timeout)
        .keep_alive(false)
        .serve_connection(io, service)
        .await
    {
        tracing::debug!(%peer, "Connection error: {e}");
    }
}

/// Resolve on SIGINT, SIGTERM or cancellation of `cancel`.
pub async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
