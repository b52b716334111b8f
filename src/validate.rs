//! Request-body validation pipeline.
//!
//! Routes declare an expected body shape at registration time
//! ([`RouteHandle::body`](crate::RouteHandle::body)). On every dispatch to
//! such a route the pipeline runs before the handler:
//!
//! 1. empty body → `400` with the `INVALID_BODY` envelope
//! 2. JSON syntax check → same failure
//! 3. bind into a fresh instance of the declared shape; a shape mismatch is
//!    reported exactly like invalid JSON (one error class, on purpose)
//! 4. field rules via the `validator` crate; violations become a `422` with
//!    one localized entry per field
//! 5. on success the bound value is stashed on the request, retrievable once
//!    via [`Request::validated`](crate::Request::validated)
//!
//! Field messages resolve against the request's localization map with the
//! precedence `fields.<field>.<rule>`, then `rules.<rule>`, then
//! `fields.<field>`, then the engine's own message, then a literal
//! "Invalid value". The tokens `{field}` and `{param}` inside a resolved
//! message are substituted with the field's display label and the rule
//! parameter. Missing localization data never fails a request.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use http::StatusCode;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::envelope::{self, ErrorExtras, FieldError};
use crate::request::Request;
use crate::response::Response;

/// A declared request-body shape.
///
/// Implemented for every DTO through the blanket [`JsonBody`] adapter; hand
/// implementations are possible when a body needs custom binding.
pub trait BodySchema: Send + Sync + 'static {
    fn bind(&self, body: &[u8]) -> BindResult;
}

/// Outcome of binding a body against a schema.
pub enum BindResult {
    /// Bound and field-valid. The value is stashed on the request.
    Bound(Box<dyn Any + Send>),
    /// Bound, but one or more field rules failed. Codes carry the raw rule
    /// form `INVALID_<RULE>` or `INVALID_<RULE>|<param>`.
    Invalid(Vec<FieldError>),
    /// The body did not deserialize into the declared shape.
    Malformed,
}

/// [`BodySchema`] adapter for any `T` that is deserializable and carries
/// `validator` field rules.
pub struct JsonBody<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonBody<T> {
    pub(crate) fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> BodySchema for JsonBody<T>
where
    T: DeserializeOwned + Validate + Send + 'static,
{
    fn bind(&self, body: &[u8]) -> BindResult {
        let value: T = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(_) => return BindResult::Malformed,
        };
        match value.validate() {
            Ok(()) => BindResult::Bound(Box::new(value)),
            Err(errors) => BindResult::Invalid(violations(&errors)),
        }
    }
}

/// Runs the pipeline for one request. `binding` is the route's schema map
/// entry: `None` means the body only has to be syntactically valid JSON.
/// Returns the failure response to short-circuit with, if any.
pub(crate) fn check(
    binding: Option<Arc<dyn BodySchema>>,
    req: &mut Request,
) -> Result<(), Response> {
    let body = req.body_bytes();
    if body.is_empty() {
        return Err(invalid_body(req));
    }
    if serde_json::from_slice::<serde_json::Value>(&body).is_err() {
        return Err(invalid_body(req));
    }
    let Some(schema) = binding else {
        return Ok(());
    };
    match schema.bind(&body) {
        BindResult::Malformed => Err(invalid_body(req)),
        BindResult::Invalid(mut fields) => {
            for field in &mut fields {
                localize(req, field);
            }
            Err(validation_failed(req, fields))
        }
        BindResult::Bound(value) => {
            req.stash_validated(value);
            Ok(())
        }
    }
}

fn invalid_body(req: &Request) -> Response {
    let message = req.message("locale.invalid_body").unwrap_or("Invalid JSON body");
    envelope::error(
        StatusCode::BAD_REQUEST,
        message,
        Vec::new(),
        &[ErrorExtras::new("INVALID_REQUEST", "INVALID_BODY")],
    )
}

fn validation_failed(req: &Request, fields: Vec<FieldError>) -> Response {
    let message = req
        .message("locale.validation_failed")
        .filter(|s| !s.is_empty())
        .unwrap_or("Validation failed");
    envelope::error(
        StatusCode::UNPROCESSABLE_ENTITY,
        message,
        fields,
        &[ErrorExtras::new("VALIDATION_ERROR", "INVALID_ATTRIBUTES")],
    )
}

/// Adapts the engine's error set into raw field errors, sorted by field name
/// so responses are deterministic.
fn violations(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut by_field: Vec<(String, &Vec<ValidationError>)> = errors
        .field_errors()
        .into_iter()
        .map(|(field, list)| (field.to_string(), list))
        .collect();
    by_field.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = Vec::new();
    for (field, list) in by_field {
        for error in list {
            let rule = error.code.to_uppercase();
            let code = match rule_param(error) {
                Some(param) => format!("INVALID_{rule}|{param}"),
                None => format!("INVALID_{rule}"),
            };
            let message = error.message.as_ref().map(|m| m.to_string()).unwrap_or_default();
            out.push(FieldError { field: field.to_lowercase(), code, message });
        }
    }
    out
}

/// The parameter a rule was configured with, when it has a meaningful one.
fn rule_param(error: &ValidationError) -> Option<String> {
    for key in ["min", "max", "equal"] {
        if let Some(value) = error.params.get(key) {
            return Some(render_param(value));
        }
    }
    None
}

fn render_param(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => {
            // integral floats print without the trailing ".0"
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    return format!("{}", f as i64);
                }
            }
            n.to_string()
        }
        other => other.to_string(),
    }
}

/// Splits a raw rule code into its lower-cased rule name and parameter. The
/// optional `INVALID_` prefix is stripped case-insensitively.
fn rule_and_param(code: &str) -> (String, String) {
    let (main, param) = match code.split_once('|') {
        Some((main, param)) => (main, param),
        None => (code, ""),
    };
    let main = if main.len() >= 8 && main[..8].eq_ignore_ascii_case("INVALID_") {
        &main[8..]
    } else {
        main
    };
    (main.to_ascii_lowercase(), param.to_owned())
}

/// Resolves one field error's human message and display label against the
/// request's localization map.
fn localize(req: &Request, field_error: &mut FieldError) {
    let (rule, param) = rule_and_param(&field_error.code);
    let field_key = format!("fields.{}", field_error.field.to_lowercase());
    let candidates = [format!("{field_key}.{rule}"), format!("rules.{rule}"), field_key.clone()];

    let message = candidates
        .iter()
        .find_map(|key| req.message(key).filter(|s| !s.is_empty()).map(str::to_owned))
        .unwrap_or_else(|| {
            if field_error.message.is_empty() {
                "Invalid value".to_owned()
            } else {
                field_error.message.clone()
            }
        });
    let label = req
        .message(&field_key)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| field_error.field.clone());

    field_error.message = message.replace("{field}", &label).replace("{param}", &param);
}
