//! Route registration, metadata tables, and dispatch.
//!
//! One radix tree per HTTP method does the path matching (`matchit`,
//! O(path-length) lookup). Everything torii adds on top lives in the
//! [`RouteTable`]: per-route body schemas, middleware chains, and the name
//! index for reverse routing, all keyed by the route's method plus its
//! normalized template.
//!
//! Registration returns a [`RouteHandle`] for fluent per-route
//! configuration:
//!
//! ```rust,ignore
//! let mut app = Router::new();
//! app.post("/products", create_product)
//!     .body::<CreateProduct>()
//!     .middleware(Trace)
//!     .name("products.create");
//! ```
//!
//! The metadata maps take a read lock on every dispatch and a write lock on
//! every registration, so registering a route while traffic is already
//! flowing is safe; whether in-flight requests observe it is only a
//! visibility question. No lock is held while a body is read or validated.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use http::Method;
use matchit::Router as MatchitRouter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;
use validator::Validate;

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::validate::{self, BodySchema, JsonBody};

/// Matches `{name:constraint}` segments whose constraint must be discarded.
static CONSTRAINED_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+):[^}]+\}").expect("constraint pattern"));

/// Matches any `{name}` or `{name:constraint}` placeholder for substitution.
static TEMPLATE_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)(?::[^}]+)?\}").expect("template pattern"));

/// Identity of a registered route: uppercased method plus normalized
/// template. Two registrations that normalize identically share one entry in
/// every metadata map.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) struct RouteKey {
    method: Method,
    template: String,
}

impl RouteKey {
    pub(crate) fn new(method: Method, template: &str) -> Self {
        Self { method, template: template.to_owned() }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template)
    }
}

/// Rewrites `{name:constraint}` segments to plain `{name}`.
///
/// The matching engine does not understand inline constraints, so they are
/// dropped before the pattern reaches it; a constrained and an unconstrained
/// spelling of the same route are the same route. Idempotent, and never
/// touches literal segments.
pub(crate) fn normalize(pattern: &str) -> String {
    CONSTRAINED_PARAM.replace_all(pattern, "{$1}").into_owned()
}

fn join(prefix: &str, path: &str) -> String {
    if prefix.is_empty() || prefix == "/" {
        return path.to_owned();
    }
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        prefix.to_owned()
    } else {
        format!("{prefix}/{path}")
    }
}

#[derive(Default)]
struct NameIndex {
    by_name: HashMap<String, RouteKey>,
    templates: HashMap<RouteKey, String>,
}

/// Shared per-route metadata: schema bindings, middleware chains, and the
/// name index. Read on every dispatch, written only by registration.
#[derive(Default)]
pub(crate) struct RouteTable {
    schemas: RwLock<HashMap<RouteKey, Option<Arc<dyn BodySchema>>>>,
    middleware: RwLock<HashMap<RouteKey, Vec<Arc<dyn Middleware>>>>,
    names: RwLock<NameIndex>,
}

impl RouteTable {
    fn set_template(&self, key: &RouteKey, template: &str) {
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .templates
            .insert(key.clone(), template.to_owned());
    }

    fn set_schema(&self, key: &RouteKey, schema: Option<Arc<dyn BodySchema>>) {
        self.schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), schema);
    }

    fn push_middleware(&self, key: &RouteKey, mw: Arc<dyn Middleware>) {
        self.middleware
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .push(mw);
    }

    fn set_name(&self, name: &str, key: &RouteKey) {
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .by_name
            .insert(name.to_owned(), key.clone());
    }

    /// The route's schema map entry. Outer `None` means the route declared no
    /// body contract at all; `Some(None)` means syntax-only JSON checking.
    pub(crate) fn schema_for(&self, key: &RouteKey) -> Option<Option<Arc<dyn BodySchema>>> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub(crate) fn middleware_for(&self, key: &RouteKey) -> Vec<Arc<dyn Middleware>> {
        self.middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Best-effort reverse routing: placeholders with no matching param
    /// substitute as empty strings rather than failing, so callers must
    /// validate params themselves when that matters. `None` only for an
    /// unknown name.
    pub(crate) fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        let key = names.by_name.get(name)?;
        let template = names.templates.get(key)?.clone();
        drop(names);

        let out = TEMPLATE_PARAM.replace_all(&template, |caps: &regex::Captures<'_>| {
            let wanted = &caps[1];
            params
                .iter()
                .find(|(k, _)| *k == wanted)
                .map(|(_, v)| (*v).to_owned())
                .unwrap_or_default()
        });
        Some(out.into_owned())
    }
}

/// Dispatch wrapper stored in the matching tree for every registered route.
/// Knows its own key, so metadata lookups at request time use exactly the
/// identity that registration wrote.
struct Endpoint {
    key: RouteKey,
    table: Arc<RouteTable>,
    handler: BoxedHandler,
}

impl ErasedHandler for Endpoint {
    fn call(&self, req: Request) -> BoxFuture {
        let chain = self.table.middleware_for(&self.key);
        let unit: BoxedHandler = match self.table.schema_for(&self.key) {
            Some(binding) => {
                Arc::new(ValidatingHandler { binding, inner: Arc::clone(&self.handler) })
            }
            None => Arc::clone(&self.handler),
        };
        Next::new(chain, unit).run(req)
    }
}

/// The {validation step, application handler} unit that route middleware
/// wraps.
struct ValidatingHandler {
    binding: Option<Arc<dyn BodySchema>>,
    inner: BoxedHandler,
}

impl ErasedHandler for ValidatingHandler {
    fn call(&self, req: Request) -> BoxFuture {
        let mut req = req;
        match validate::check(self.binding.clone(), &mut req) {
            Ok(()) => self.inner.call(req),
            Err(res) => Box::pin(async move { res }),
        }
    }
}

/// The application router.
///
/// Build it once at startup, configure routes through the returned
/// [`RouteHandle`]s, then hand it to [`Server::serve`](crate::Server::serve).
pub struct Router {
    trees: HashMap<Method, MatchitRouter<BoxedHandler>>,
    table: Arc<RouteTable>,
}

impl Router {
    pub fn new() -> Self {
        Self { trees: HashMap::new(), table: Arc::new(RouteTable::default()) }
    }

    /// Registers a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax, optionally with an inline
    /// constraint (`{id:[0-9]+}`) that is discarded during normalization.
    /// `req.param("name")` retrieves the matched value.
    ///
    /// # Panics
    ///
    /// Panics if the path is not a valid route pattern. Registering the same
    /// method + normalized path twice keeps the first handler and is
    /// otherwise a no-op, so repeated identical registrations are safe.
    pub fn on(&mut self, method: Method, path: &str, handler: impl Handler) -> RouteHandle {
        self.register(method, path, handler.into_boxed_handler(), &[])
    }

    pub fn get(&mut self, path: &str, handler: impl Handler) -> RouteHandle {
        self.on(Method::GET, path, handler)
    }

    pub fn post(&mut self, path: &str, handler: impl Handler) -> RouteHandle {
        self.on(Method::POST, path, handler)
    }

    pub fn put(&mut self, path: &str, handler: impl Handler) -> RouteHandle {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(&mut self, path: &str, handler: impl Handler) -> RouteHandle {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(&mut self, path: &str, handler: impl Handler) -> RouteHandle {
        self.on(Method::DELETE, path, handler)
    }

    /// A route group rooted at `prefix`. Middleware attached to the group
    /// wraps (outside) the middleware of every route registered through it.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group { router: self, prefix: prefix.to_owned(), middleware: Vec::new() }
    }

    /// Builds the path for a named route. See
    /// [`Request::url_for`](crate::Request::url_for) for the request-scoped
    /// variant.
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Option<String> {
        self.table.url_for(name, params)
    }

    fn register(
        &mut self,
        method: Method,
        path: &str,
        handler: BoxedHandler,
        group_middleware: &[Arc<dyn Middleware>],
    ) -> RouteHandle {
        let template = normalize(path);
        let key = RouteKey::new(method.clone(), &template);
        self.table.set_template(&key, &template);
        for mw in group_middleware {
            self.table.push_middleware(&key, Arc::clone(mw));
        }

        let endpoint: BoxedHandler = Arc::new(Endpoint {
            key: key.clone(),
            table: Arc::clone(&self.table),
            handler,
        });
        match self.trees.entry(method).or_default().insert(&template, endpoint) {
            Ok(()) => debug!(route = %key, "route registered"),
            Err(matchit::InsertError::Conflict { .. }) => {
                debug!(route = %key, "route re-registered")
            }
            Err(e) => panic!("invalid route `{path}`: {e}"),
        }
        RouteHandle { key, table: Arc::clone(&self.table) }
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.trees.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((handler, params))
    }

    pub(crate) fn table(&self) -> Arc<RouteTable> {
        Arc::clone(&self.table)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// A group of routes under a common prefix, optionally sharing middleware.
pub struct Group<'r> {
    router: &'r mut Router,
    prefix: String,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Group<'_> {
    /// Attaches middleware to every route subsequently registered through
    /// this group.
    pub fn middleware(mut self, mw: impl Middleware) -> Self {
        self.middleware.push(Arc::new(mw));
        self
    }

    pub fn on(&mut self, method: Method, path: &str, handler: impl Handler) -> RouteHandle {
        let full = join(&self.prefix, path);
        self.router
            .register(method, &full, handler.into_boxed_handler(), &self.middleware)
    }

    pub fn get(&mut self, path: &str, handler: impl Handler) -> RouteHandle {
        self.on(Method::GET, path, handler)
    }

    pub fn post(&mut self, path: &str, handler: impl Handler) -> RouteHandle {
        self.on(Method::POST, path, handler)
    }

    pub fn put(&mut self, path: &str, handler: impl Handler) -> RouteHandle {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(&mut self, path: &str, handler: impl Handler) -> RouteHandle {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(&mut self, path: &str, handler: impl Handler) -> RouteHandle {
        self.on(Method::DELETE, path, handler)
    }
}

/// Fluent per-route configuration, returned by every registration call.
///
/// The handle writes into the shared route table, so it does not borrow the
/// router and can outlive the registration statement.
pub struct RouteHandle {
    key: RouteKey,
    table: Arc<RouteTable>,
}

impl RouteHandle {
    /// Declares the expected body shape. The request body must deserialize
    /// into `T` and pass `T`'s field rules before the handler runs; the
    /// bound value is retrievable once via
    /// [`Request::validated`](crate::Request::validated). Overwrites any
    /// previously declared shape for this route.
    pub fn body<T>(self) -> Self
    where
        T: DeserializeOwned + Validate + Send + 'static,
    {
        self.table.set_schema(&self.key, Some(Arc::new(JsonBody::<T>::new())));
        self
    }

    /// Requires the body to be syntactically valid JSON without binding it to
    /// any shape.
    pub fn json_body(self) -> Self {
        self.table.set_schema(&self.key, None);
        self
    }

    /// Appends middleware to this route. Repeated calls accumulate; the
    /// first middleware registered is the outermost wrapper.
    pub fn middleware(self, mw: impl Middleware) -> Self {
        self.table.push_middleware(&self.key, Arc::new(mw));
        self
    }

    /// Names the route for reverse lookup via
    /// [`Router::url_for`]. An empty name is a no-op; reusing a name
    /// overwrites the previous binding.
    pub fn name(self, name: &str) -> Self {
        if !name.is_empty() {
            self.table.set_name(name, &self.key);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use http::StatusCode;
    use serde::Deserialize;

    use crate::response::Response;

    #[derive(Default, Deserialize, Validate)]
    #[serde(default)]
    struct Payload {
        #[validate(length(min = 1))]
        name: String,
    }

    async fn ok(_req: Request) -> Response {
        Response::status(StatusCode::OK)
    }

    #[test]
    fn normalize_drops_inline_constraints() {
        assert_eq!(normalize("/products/{id:[0-9]+}"), "/products/{id}");
        assert_eq!(normalize("/a/{x:\\d+}/b/{y:[a-z]+}"), "/a/{x}/b/{y}");
        assert_eq!(normalize("/plain/path"), "/plain/path");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("/products/{id:[0-9]+}");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn constrained_and_plain_spellings_share_a_route_key() {
        let mut router = Router::new();
        router.post("/products/{id:[0-9]+}", ok).body::<Payload>();

        let key = RouteKey::new(Method::POST, &normalize("/products/{id}"));
        assert!(router.table().schema_for(&key).is_some());
    }

    #[test]
    fn join_handles_prefixes() {
        assert_eq!(join("/", "/x"), "/x");
        assert_eq!(join("", "/x"), "/x");
        assert_eq!(join("/api", "/x"), "/api/x");
        assert_eq!(join("/api/", "x"), "/api/x");
        assert_eq!(join("/api", "/"), "/api");
    }

    #[test]
    fn url_for_substitutes_every_placeholder() {
        let mut router = Router::new();
        router.get("/users/{id}/posts/{post:[0-9]+}", ok).name("users.post");

        let path = router
            .url_for("users.post", &[("id", "7"), ("post", "42")])
            .expect("named route");
        assert_eq!(path, "/users/7/posts/42");
        assert!(!path.contains('{') && !path.contains('}'));
    }

    #[test]
    fn url_for_missing_param_becomes_empty() {
        let mut router = Router::new();
        router.get("/users/{id}/posts/{post}", ok).name("users.post");

        let path = router.url_for("users.post", &[("id", "7")]).expect("named route");
        assert_eq!(path, "/users/7/posts/");
    }

    #[test]
    fn url_for_unknown_name_is_none() {
        let router = Router::new();
        assert!(router.url_for("nope", &[]).is_none());
        assert!(router.url_for("", &[]).is_none());
    }

    #[test]
    fn reregistration_is_observably_idempotent() {
        let mut router = Router::new();
        router.post("/items", ok).body::<Payload>().name("items.create");
        router.post("/items", ok).body::<Payload>().name("items.create");

        let key = RouteKey::new(Method::POST, "/items");
        let table = router.table();
        assert!(table.schema_for(&key).is_some());
        assert_eq!(router.url_for("items.create", &[]), Some("/items".to_owned()));
        assert!(table.middleware_for(&key).is_empty());
    }

    #[test]
    fn middleware_accumulates_by_design() {
        struct Noop;
        impl Middleware for Noop {
            fn handle(&self, req: Request, next: Next) -> BoxFuture {
                next.run(req)
            }
        }

        let mut router = Router::new();
        router.get("/x", ok).middleware(Noop).middleware(Noop);

        let key = RouteKey::new(Method::GET, "/x");
        assert_eq!(router.table().middleware_for(&key).len(), 2);
    }

    #[test]
    fn empty_name_is_a_silent_noop() {
        let mut router = Router::new();
        router.get("/x", ok).name("");
        assert!(router.url_for("", &[]).is_none());
    }

    #[tokio::test]
    async fn lookup_extracts_named_params() {
        let mut router = Router::new();
        router.get("/users/{id}", |req: Request| async move {
            Response::text(req.param("id").unwrap_or("missing").to_owned())
        });

        let (handler, params) = router.lookup(&Method::GET, "/users/42").expect("route");
        assert_eq!(params.get("id").map(String::as_str), Some("42"));

        let req = Request::new(
            Method::GET,
            "/users/42".to_owned(),
            Vec::new(),
            Bytes::new(),
            params,
        );
        let res = handler.call(req).await;
        assert_eq!(res.body(), b"42");
    }

    #[test]
    fn lookup_misses_unknown_method_or_path() {
        let mut router = Router::new();
        router.get("/only", ok);
        assert!(router.lookup(&Method::POST, "/only").is_none());
        assert!(router.lookup(&Method::GET, "/other").is_none());
    }
}
