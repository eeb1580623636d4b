//! HTTP server and graceful shutdown.
//!
//! Connections are served by hyper's auto builder (HTTP/1.1 and HTTP/2).
//! Each request body is read in full up to a size limit, turned into a
//! [`Request`] and passed to [`Router::handle`].
//!
//! On SIGTERM or Ctrl-C the server stops accepting, waits for in-flight
//! connections to finish and returns from [`Server::serve`]. Keep the
//! orchestrator's grace period longer than the slowest request.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    body_limit: usize,
}

impl Server {
    /// Largest request body read unless [`body_limit`](Server::body_limit)
    /// says otherwise: 100 KiB.
    pub const DEFAULT_BODY_LIMIT: usize = 100 * 1024;

    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust
    /// use turnstile::Server;
    /// let server = Server::bind("0.0.0.0:3000")?;
    /// # Ok::<(), turnstile::Error>(())
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr: SocketAddr = addr.parse()?;
        Ok(Self { addr, body_limit: Self::DEFAULT_BODY_LIMIT })
    }

    /// Bodies longer than `bytes` are answered with `413 Payload Too Large`
    /// before routing. Defaults to [`DEFAULT_BODY_LIMIT`](Server::DEFAULT_BODY_LIMIT).
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// The address the server will listen on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;

        let router = Arc::new(router);
        let body_limit = self.body_limit;

        info!(addr = %self.addr, "turnstile listening");

        // In-flight connections, drained on shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown wins over queued connections.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { dispatch(router, req, remote_addr, body_limit).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connections.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("turnstile stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Core hot path: reads one request body, routes it, produces one response.
///
/// The error type is [`Infallible`] so hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    body_limit: usize,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let bytes = match read_body(body, body_limit).await {
        Ok(bytes) => bytes,
        Err(res) => {
            debug!(peer = %remote_addr, status = %res.status_code(), "request body rejected");
            return Ok(res.into_inner());
        }
    };

    let req = Request::from_http(http::Request::from_parts(parts, bytes));
    Ok(router.handle(req).await.into_inner())
}

/// Collects at most `limit` bytes: 413 past the limit, 400 when the body
/// cannot be read.
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, Response>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(Response::status(StatusCode::PAYLOAD_TOO_LARGE))
        }
        Err(e) => {
            debug!(error = %e, "failed to read request body");
            Err(Response::status(StatusCode::BAD_REQUEST))
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or Ctrl-C. A signal that cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
