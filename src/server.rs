//! HTTP server and graceful shutdown.
//!
//! The server owns the accept loop and the request boundary. Per request it
//! buffers the whole body up front, resolves the route, and builds the
//! [`Request`] the rest of the crate works with. A body that cannot be read
//! fails the request with a plain `500` before any routing or validation
//! logic runs.
//!
//! On SIGTERM or Ctrl-C the listener stops accepting, in-flight connections
//! drain, and [`Server::serve`] returns. Kubernetes sends SIGTERM and waits
//! `terminationGracePeriodSeconds` before SIGKILL; set that longer than your
//! slowest request.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::Error;
use crate::messages::Messages;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    messages: Option<Messages>,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr.parse().expect("invalid socket address");
        Self { addr, messages: None }
    }

    /// Injects a flat localization map into every request, making
    /// [`Request::message`] and localized validation errors work. Typically
    /// one language picked from a [`Catalog`](crate::Catalog).
    pub fn messages(mut self, messages: Messages) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown: SIGTERM or Ctrl-C
    /// followed by all in-flight requests completing.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;

        // Shared across connection tasks without copying the route tables.
        let router = Arc::new(router);
        let messages = self.messages;

        info!(addr = %self.addr, "torii listening");

        // Tracks every spawned connection task so shutdown can drain them.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops the accept loop even
                // when more connections are queued.
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
                    let messages = messages.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection, not once
                        // per connection.
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            let messages = messages.clone();
                            async move { dispatch(router, messages, req, remote_addr).await }
                        });

                        // Serves whichever of HTTP/1.1 and HTTP/2 the client
                        // negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the set stays bounded on
                // long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("torii stopped");
        Ok(())
    }
}

/// Routes one request and produces one response. All failures are handled
/// internally (404, 500, the envelope shapes), so hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    messages: Option<Messages>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_owned();

    // Buffer the whole body before anything else; the validation pipeline
    // and handlers both work on bytes, not streams.
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!(method = %parts.method, path, "failed to read body: {e}");
            let res = Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .text("failed to read body");
            return Ok(res.into_http());
        }
    };

    let response = match router.lookup(&parts.method, &path) {
        Some((handler, params)) => {
            let headers = parts
                .headers
                .iter()
                .map(|(k, v)| {
                    (k.as_str().to_owned(), String::from_utf8_lossy(v.as_bytes()).into_owned())
                })
                .collect();
            let mut request = Request::new(parts.method, path, headers, body, params)
                .with_remote_addr(remote_addr)
                .with_table(router.table());
            if let Some(messages) = messages {
                request = request.with_messages(messages);
            }
            handler.call(request).await
        }
        None => Response::status(StatusCode::NOT_FOUND),
    };

    Ok(response.into_http())
}

/// Resolves on the first shutdown signal the process receives: SIGTERM or
/// SIGINT on Unix, Ctrl-C elsewhere.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    // Never resolves, so the SIGTERM arm is effectively disabled off-Unix.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
