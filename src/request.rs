//! Incoming HTTP request type.

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use serde::de::DeserializeOwned;

use crate::messages::Messages;
use crate::router::RouteTable;

/// An incoming HTTP request.
///
/// Owns the fully buffered body, the matched path parameters, and two pieces
/// of per-request scope injected by the framework: the flat localization map
/// (when the server was given one) and the validated body produced by the
/// route's schema binding (when one is declared).
pub struct Request {
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
    body: Bytes,
    params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
    messages: Option<Messages>,
    table: Option<Arc<RouteTable>>,
    validated: Option<Box<dyn Any + Send>>,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        path: String,
        headers: Vec<(String, String)>,
        body: Bytes,
        params: HashMap<String, String>,
    ) -> Self {
        Self {
            method,
            path,
            headers,
            body,
            params,
            remote_addr: None,
            messages: None,
            table: None,
            validated: None,
        }
    }

    pub(crate) fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub(crate) fn with_messages(mut self, messages: Messages) -> Self {
        self.messages = Some(messages);
        self
    }

    pub(crate) fn with_table(mut self, table: Arc<RouteTable>) -> Self {
        self.table = Some(table);
        self
    }

    /// Set at most once, by the validation step, before the handler runs.
    pub(crate) fn stash_validated(&mut self, value: Box<dyn Any + Send>) {
        debug_assert!(self.validated.is_none());
        self.validated = Some(value);
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The raw body bytes. Always fully buffered, still readable after the
    /// validation step has bound it.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn body_bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// The client's remote address, when known.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/products/{id}`, `req.param("id")` on `/products/42`
    /// returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Looks up a localized message by dotted key in the flat map the server
    /// injected for the active language. `None` when no map was injected or
    /// the key is absent.
    pub fn message(&self, key: &str) -> Option<&str> {
        self.messages.as_ref()?.get(key)
    }

    /// Decodes the raw body as JSON into `T`, independent of any declared
    /// body schema.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Takes the validated body produced by this route's schema binding.
    ///
    /// Returns `Some` exactly once per request, and only when the route
    /// declared a concrete body shape and the request passed validation. A
    /// `T` that does not match the declared shape leaves the value in place
    /// and returns `None`.
    pub fn validated<T: Send + 'static>(&mut self) -> Option<T> {
        match self.validated.take()?.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.validated = Some(other);
                None
            }
        }
    }

    /// Builds the path for a named route, substituting `params` into the
    /// route's template. Missing parameters substitute as empty strings; only
    /// an unknown name yields `None`.
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Option<String> {
        self.table.as_ref()?.url_for(name, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_body(body: &[u8]) -> Request {
        Request::new(
            Method::POST,
            "/products".to_owned(),
            vec![("Content-Type".to_owned(), "application/json".to_owned())],
            Bytes::copy_from_slice(body),
            HashMap::new(),
        )
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = request_with_body(b"{}");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(req.header("accept"), None);
    }

    #[test]
    fn validated_is_taken_exactly_once() {
        let mut req = request_with_body(b"{}");
        req.stash_validated(Box::new(41_i64));
        assert_eq!(req.validated::<i64>(), Some(41));
        assert_eq!(req.validated::<i64>(), None);
    }

    #[test]
    fn validated_with_wrong_type_leaves_value_in_place() {
        let mut req = request_with_body(b"{}");
        req.stash_validated(Box::new("bound".to_owned()));
        assert_eq!(req.validated::<i64>(), None);
        assert_eq!(req.validated::<String>(), Some("bound".to_owned()));
    }

    #[test]
    fn message_without_injected_map_is_none() {
        let req = request_with_body(b"{}");
        assert_eq!(req.message("locale.invalid_body"), None);
    }

    #[test]
    fn json_decodes_the_raw_body() {
        let req = request_with_body(br#"{"id": 9}"#);
        let v: serde_json::Value = req.json().expect("valid json");
        assert_eq!(v["id"], 9);
    }
}
