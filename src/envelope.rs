//! The two JSON envelopes every torii service speaks.
//!
//! Every response is exactly one of two shapes:
//!
//! ```text
//! {"status":"success", "code":200, "message":"…", "data":…}
//! {"status":"error",   "code":422, "error":{"type":"…","code":"…","message":"…","fields":[…]}}
//! ```
//!
//! `fields` is omitted entirely when there are no field errors, never emitted
//! as an empty list.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::error as log_error;

use crate::response::Response;

/// One field-level validation failure.
///
/// `code` carries the normalized rule name, optionally with a rule parameter
/// after a `|` separator (`INVALID_LENGTH|3`). `field` is always lower-cased.
/// After formatting, `message` is never empty.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FieldError {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Machine-readable tags attached to an error envelope.
///
/// The mapping into the envelope is crossed and callers depend on it:
/// `code` lands in `error.type` and `kind` lands in `error.code`. When
/// several extras are supplied, later ones override earlier ones.
#[derive(Clone, Debug, Default)]
pub struct ErrorExtras {
    pub code: String,
    pub kind: String,
}

impl ErrorExtras {
    pub fn new(code: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { code: code.into(), kind: kind.into() }
    }
}

/// Structure inside the top-level `error` key. Field order here is the wire
/// order: type, code, message, fields.
#[derive(Serialize)]
struct ErrorBody<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "<[FieldError]>::is_empty")]
    fields: &'a [FieldError],
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    status: &'static str,
    code: u16,
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct SuccessEnvelope<'a, T: Serialize> {
    status: &'static str,
    code: u16,
    #[serde(skip_serializing_if = "str::is_empty")]
    message: &'a str,
    data: &'a T,
}

/// Builds a success envelope. For 2xx statuses; the status line matches the
/// code passed in.
pub fn success<T: Serialize>(status: StatusCode, message: &str, data: &T) -> Response {
    let env = SuccessEnvelope { status: "success", code: status.as_u16(), message, data };
    match serde_json::to_vec(&env) {
        Ok(body) => Response::builder().status(status).json(body),
        Err(e) => {
            log_error!(error = %e, "success envelope serialization failed");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Builds an error envelope. `fields` are included under `error.fields` when
/// non-empty; `extras` populate `error.type` and `error.code` (see
/// [`ErrorExtras`] for the crossed mapping).
pub fn error(
    status: StatusCode,
    message: &str,
    fields: Vec<FieldError>,
    extras: &[ErrorExtras],
) -> Response {
    let mut kind = "";
    let mut code = "";
    for extra in extras {
        if !extra.code.is_empty() {
            kind = &extra.code;
        }
        if !extra.kind.is_empty() {
            code = &extra.kind;
        }
    }
    let env = ErrorEnvelope {
        status: "error",
        code: status.as_u16(),
        error: ErrorBody { kind, code, message, fields: &fields },
    };
    match serde_json::to_vec(&env) {
        Ok(body) => Response::builder().status(status).json(body),
        Err(e) => {
            log_error!(error = %e, "error envelope serialization failed");
            Response::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Picks the envelope by status: success for 2xx, error otherwise.
pub fn json<T: Serialize>(status: StatusCode, message: &str, data: &T) -> Response {
    if status.is_success() {
        success(status, message, data)
    } else {
        error(status, message, Vec::new(), &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(res: &Response) -> Value {
        serde_json::from_slice(res.body()).expect("valid envelope json")
    }

    #[test]
    fn success_shape() {
        let res = success(StatusCode::OK, "created", &serde_json::json!({"id": 7}));
        assert_eq!(res.status_code(), StatusCode::OK);
        let v = parse(&res);
        assert_eq!(v["status"], "success");
        assert_eq!(v["code"], 200);
        assert_eq!(v["message"], "created");
        assert_eq!(v["data"]["id"], 7);
    }

    #[test]
    fn success_omits_empty_message() {
        let res = success(StatusCode::OK, "", &Value::Null);
        let v = parse(&res);
        assert!(v.get("message").is_none());
        assert!(v.get("data").is_some());
    }

    #[test]
    fn error_omits_empty_fields() {
        let res = error(StatusCode::BAD_REQUEST, "nope", Vec::new(), &[]);
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        let v = parse(&res);
        assert_eq!(v["status"], "error");
        assert_eq!(v["code"], 400);
        assert!(v["error"].get("fields").is_none());
    }

    #[test]
    fn error_includes_fields_when_present() {
        let fields = vec![FieldError {
            field: "name".into(),
            code: "INVALID_LENGTH|1".into(),
            message: "Name is required".into(),
        }];
        let res = error(StatusCode::UNPROCESSABLE_ENTITY, "Validation failed", fields, &[]);
        let v = parse(&res);
        assert_eq!(v["error"]["fields"][0]["field"], "name");
        assert_eq!(v["error"]["fields"][0]["message"], "Name is required");
    }

    #[test]
    fn extras_mapping_is_crossed() {
        let res = error(
            StatusCode::BAD_REQUEST,
            "bad",
            Vec::new(),
            &[ErrorExtras::new("INVALID_REQUEST", "INVALID_BODY")],
        );
        let v = parse(&res);
        assert_eq!(v["error"]["type"], "INVALID_REQUEST");
        assert_eq!(v["error"]["code"], "INVALID_BODY");
    }

    #[test]
    fn later_extras_override_earlier() {
        let res = error(
            StatusCode::BAD_REQUEST,
            "bad",
            Vec::new(),
            &[
                ErrorExtras::new("FIRST_TYPE", "FIRST_CODE"),
                ErrorExtras::new("SECOND_TYPE", ""),
            ],
        );
        let v = parse(&res);
        assert_eq!(v["error"]["type"], "SECOND_TYPE");
        assert_eq!(v["error"]["code"], "FIRST_CODE");
    }

    #[test]
    fn json_picks_envelope_by_status() {
        let ok = json(StatusCode::OK, "ok", &Value::Null);
        assert_eq!(parse(&ok)["status"], "success");
        let bad = json(StatusCode::CONFLICT, "conflict", &Value::Null);
        assert_eq!(parse(&bad)["status"], "error");
    }
}
