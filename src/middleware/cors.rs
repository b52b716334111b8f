//! CORS headers and preflight handling.

use http::{Method, StatusCode};

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

const DEFAULT_METHODS: &str = "GET,POST,PUT,PATCH,DELETE,OPTIONS";

/// Applies `Access-Control-Allow-*` headers and answers `OPTIONS` preflight
/// requests with `204 No Content` without invoking the route chain.
///
/// The default configuration allows any origin and the common REST methods.
pub struct Cors {
    allowed_origin: String,
    allowed_methods: String,
}

impl Cors {
    pub fn new() -> Self {
        Self {
            allowed_origin: "*".to_owned(),
            allowed_methods: DEFAULT_METHODS.to_owned(),
        }
    }

    /// Restricts the allowed origin. Only a single origin is supported; put a
    /// reverse proxy in front if you need per-origin reflection.
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origin = origin.into();
        self
    }

    pub fn allow_methods(mut self, methods: &[&str]) -> Self {
        self.allowed_methods = methods.join(",");
        self
    }

    fn apply(&self, res: &mut Response) {
        res.set_header("access-control-allow-origin", &self.allowed_origin);
        res.set_header("access-control-allow-methods", &self.allowed_methods);
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for Cors {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        if req.method() == Method::OPTIONS {
            let mut res = Response::status(StatusCode::NO_CONTENT);
            self.apply(&mut res);
            return Box::pin(async move { res });
        }
        let origin = self.allowed_origin.clone();
        let methods = self.allowed_methods.clone();
        Box::pin(async move {
            let mut res = next.run(req).await;
            res.set_header("access-control-allow-origin", &origin);
            res.set_header("access-control-allow-methods", &methods);
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;

    use crate::router::Router;

    async fn send(router: &Router, method: Method, path: &str) -> Response {
        let (handler, params) = router.lookup(&method, path).expect("route");
        let req = Request::new(method, path.to_owned(), Vec::new(), Bytes::new(), params);
        handler.call(req).await
    }

    #[tokio::test]
    async fn preflight_short_circuits_with_no_content() {
        let mut router = Router::new();
        router
            .on(Method::OPTIONS, "/things", |_req: Request| async {
                Response::text("handler must not run")
            })
            .middleware(Cors::new());

        let res = send(&router, Method::OPTIONS, "/things").await;
        assert_eq!(res.status_code(), StatusCode::NO_CONTENT);
        assert!(res.body().is_empty());
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
        assert_eq!(res.header("access-control-allow-methods"), Some(DEFAULT_METHODS));
    }

    #[tokio::test]
    async fn responses_carry_cors_headers() {
        let mut router = Router::new();
        router
            .get("/things", |_req: Request| async { Response::text("ok") })
            .middleware(Cors::new().allow_origin("https://app.example"));

        let res = send(&router, Method::GET, "/things").await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("access-control-allow-origin"), Some("https://app.example"));
    }
}
