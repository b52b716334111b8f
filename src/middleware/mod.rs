//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns: structured tracing, CORS headers, request-id
//! injection, and authentication-header inspection.
//!
//! A middleware wraps everything downstream of it, including the body
//! validation step of routes that declare a schema. Route middleware nests in
//! registration order: the first one registered is the outermost wrapper, so
//! it runs first on the way in and last on the way out.
//!
//! ```rust,ignore
//! use torii::middleware::{Middleware, Next};
//! use torii::{BoxFuture, Request};
//!
//! struct RequireHeader;
//!
//! impl Middleware for RequireHeader {
//!     fn handle(&self, req: Request, next: Next) -> BoxFuture {
//!         Box::pin(async move {
//!             if req.header("x-api-key").is_none() {
//!                 return torii::Response::status(torii::StatusCode::UNAUTHORIZED);
//!             }
//!             next.run(req).await
//!         })
//!     }
//! }
//! ```

mod cors;
mod trace;

pub use cors::Cors;
pub use trace::Trace;

use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler};
use crate::request::Request;

/// A request-wrapping behavior attached to a route or group.
///
/// Call `next.run(req)` to continue down the chain; skip it to short-circuit
/// with your own response.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

/// The remainder of a route's chain: the not-yet-run middleware followed by
/// the validation step and the application handler.
pub struct Next {
    chain: Vec<Arc<dyn Middleware>>,
    index: usize,
    endpoint: BoxedHandler,
}

impl Next {
    pub(crate) fn new(chain: Vec<Arc<dyn Middleware>>, endpoint: BoxedHandler) -> Self {
        Self { chain, index: 0, endpoint }
    }

    /// Runs the rest of the chain to completion.
    pub fn run(mut self, req: Request) -> BoxFuture {
        if self.index < self.chain.len() {
            let mw = Arc::clone(&self.chain[self.index]);
            self.index += 1;
            mw.handle(req, self)
        } else {
            self.endpoint.call(req)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use bytes::Bytes;
    use http::{Method, StatusCode};

    use crate::response::Response;
    use crate::router::Router;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    struct Recorder {
        log: Log,
        pre: &'static str,
        post: &'static str,
    }

    impl Middleware for Recorder {
        fn handle(&self, req: Request, next: Next) -> BoxFuture {
            let log = Arc::clone(&self.log);
            let (pre, post) = (self.pre, self.post);
            Box::pin(async move {
                log.lock().expect("log lock").push(pre);
                let res = next.run(req).await;
                log.lock().expect("log lock").push(post);
                res
            })
        }
    }

    async fn send(router: &Router, method: Method, path: &str, body: &[u8]) -> Response {
        let (handler, params) = router.lookup(&method, path).expect("route");
        let req = Request::new(
            method,
            path.to_owned(),
            Vec::new(),
            Bytes::copy_from_slice(body),
            params,
        );
        handler.call(req).await
    }

    #[tokio::test]
    async fn first_registered_middleware_is_outermost() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let handler_log = Arc::clone(&log);
        let mut router = Router::new();
        router
            .get("/ping", move |_req: Request| {
                let log = Arc::clone(&handler_log);
                async move {
                    log.lock().expect("log lock").push("handler");
                    Response::text("pong")
                }
            })
            .middleware(Recorder { log: Arc::clone(&log), pre: "m1-pre", post: "m1-post" })
            .middleware(Recorder { log: Arc::clone(&log), pre: "m2-pre", post: "m2-post" });

        let res = send(&router, Method::GET, "/ping", b"").await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(
            *log.lock().expect("log lock"),
            vec!["m1-pre", "m2-pre", "handler", "m2-post", "m1-post"],
        );
    }

    #[tokio::test]
    async fn middleware_runs_before_validation_and_wraps_its_failures() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        router
            .post("/items", |_req: Request| async { Response::text("never reached") })
            .json_body()
            .middleware(Recorder { log: Arc::clone(&log), pre: "pre", post: "post" });

        let res = send(&router, Method::POST, "/items", b"").await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(*log.lock().expect("log lock"), vec!["pre", "post"]);
    }

    #[tokio::test]
    async fn short_circuiting_middleware_skips_the_handler() {
        struct Reject;
        impl Middleware for Reject {
            fn handle(&self, _req: Request, _next: Next) -> BoxFuture {
                Box::pin(async { Response::status(StatusCode::UNAUTHORIZED) })
            }
        }

        let mut router = Router::new();
        router
            .get("/private", |_req: Request| async { Response::text("secret") })
            .middleware(Reject);

        let res = send(&router, Method::GET, "/private", b"").await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        assert!(res.body().is_empty());
    }

    #[tokio::test]
    async fn group_middleware_wraps_route_middleware() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        let mut api = router
            .group("/api")
            .middleware(Recorder { log: Arc::clone(&log), pre: "group-pre", post: "group-post" });
        api.get("/ping", |_req: Request| async { Response::text("pong") })
            .middleware(Recorder { log: Arc::clone(&log), pre: "route-pre", post: "route-post" });

        send(&router, Method::GET, "/api/ping", b"").await;
        assert_eq!(
            *log.lock().expect("log lock"),
            vec!["group-pre", "route-pre", "route-post", "group-post"],
        );
    }
}
