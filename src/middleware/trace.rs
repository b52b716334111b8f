//! Per-request structured logging.

use std::time::Instant;

use tracing::info;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Logs one line per request: method, path, status, response size, latency,
/// and the peer address when known.
///
/// Register it first on a route or group so it observes the full chain,
/// including responses produced by inner middleware and the validation step.
pub struct Trace;

impl Middleware for Trace {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let method = req.method().clone();
        let path = req.path().to_owned();
        let remote_addr = req.remote_addr();
        Box::pin(async move {
            let start = Instant::now();
            let res = next.run(req).await;
            info!(
                %method,
                path,
                status = res.status_code().as_u16(),
                size = res.body().len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                remote_addr = ?remote_addr,
                "http request"
            );
            res
        })
    }
}
