//! hyper transport adapter and graceful shutdown.
//!
//! The server is the only part of the crate that touches sockets. Per
//! request it collects the body, normalizes the request into a [`Request`],
//! dispatches it, and writes the result through a [`ResponseSink`].
//!
//! On SIGTERM or Ctrl-C the accept loop stops and every in-flight connection
//! is allowed to finish before [`Server::serve`] returns.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::request::{CancelHandle, Request};
use crate::response::{Response, ResponseSink};
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("bind address `{addr}`: {e}")))?;
        Ok(Self { addr })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, Error> {
        Ok(Self { addr: config.addr()? })
    }

    /// Accepts connections and dispatches them through `router` until a
    /// shutdown signal arrives and in-flight connections have drained.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let router = Arc::new(router);

        info!(addr = %self.addr, "weir listening");

        let mut tasks = tokio::task::JoinSet::new();
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!(error = %e, "accept failed");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { handle(&router, req).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            debug!(%peer, error = %e, "connection closed with error");
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("weir stopped");
        Ok(())
    }
}

// ── Request handling ──────────────────────────────────────────────────────────

/// Marks the request cancelled if hyper drops the service future before the
/// response is ready, which is what happens when the client goes away.
struct CancelOnDrop(Option<CancelHandle>);

impl CancelOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.cancel();
        }
    }
}

async fn handle(
    router: &Router,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return Ok(into_http(Response::status(http::StatusCode::BAD_REQUEST)));
        }
    };

    let request = Request::from_parts(parts, body);
    let guard = CancelOnDrop(Some(request.cancel_handle()));
    let response = router.dispatch(request).await;
    guard.disarm();

    let mut sink = ResponseSink::new();
    if let Err(e) = sink.send(response) {
        error!(error = %e, "response rejected by sink");
    }
    let response = sink
        .take()
        .unwrap_or_else(|| Response::status(http::StatusCode::INTERNAL_SERVER_ERROR));
    Ok(into_http(response))
}

fn into_http(response: Response) -> http::Response<Full<Bytes>> {
    let (status, headers, body) = response.into_parts();
    let mut out = http::Response::new(Full::new(body));
    *out.status_mut() = status;
    for (name, value) in headers {
        match (
            http::HeaderName::try_from(name.as_str()),
            http::HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(n), Ok(v)) => {
                out.headers_mut().append(n, v);
            }
            _ => warn!(header = %name, "dropping invalid response header"),
        }
    }
    out
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on SIGTERM or Ctrl-C. If a handler cannot be installed, that
/// signal is simply never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_rejects_garbage() {
        assert!(matches!(Server::bind("not an address"), Err(Error::Config(_))));
        assert!(Server::bind("127.0.0.1:0").is_ok());
    }

    #[test]
    fn into_http_copies_status_and_headers() {
        let res = Response::builder()
            .status(http::StatusCode::CREATED)
            .header("location", "/users/1")
            .header("bad header", "x")
            .text("made");
        let out = into_http(res);
        assert_eq!(out.status(), http::StatusCode::CREATED);
        assert_eq!(out.headers()["location"], "/users/1");
        assert_eq!(out.headers().len(), 2);
    }

    #[test]
    fn dropped_guard_cancels() {
        let req = Request::builder().build();
        drop(CancelOnDrop(Some(req.cancel_handle())));
        assert!(req.is_cancelled());

        let req = Request::builder().build();
        CancelOnDrop(Some(req.cancel_handle())).disarm();
        assert!(!req.is_cancelled());
    }
}
