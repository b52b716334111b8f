//! # torii
//!
//! A minimal HTTP routing and request-validation layer for JSON services.
//!
//! ## The contract
//!
//! Your reverse proxy owns TLS, rate limiting, slow clients, and body-size
//! limits. torii owns the part that actually changes between applications:
//!
//! - **Routing** — radix-tree matching via [`matchit`], `{name}` path
//!   parameters, route groups, named routes with reverse lookup
//! - **Body contracts** — declare a typed shape per route; the body is
//!   buffered, syntax-checked, bound, and field-validated before your
//!   handler runs
//! - **Consistent errors** — every failure is one of two fixed JSON
//!   envelopes, with field-level messages resolved through a per-language
//!   localization catalog
//! - **Middleware** — per-route and per-group wrapping, first registered
//!   runs outermost
//! - **Graceful shutdown** — SIGTERM / Ctrl-C, drains in-flight requests
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use serde::{Deserialize, Serialize};
//! use torii::{envelope, Request, Response, Router, Server, StatusCode};
//! use validator::Validate;
//!
//! #[derive(Default, Deserialize, Serialize, Validate)]
//! #[serde(default)]
//! struct CreateProduct {
//!     #[validate(length(min = 1))]
//!     name: String,
//!     #[validate(range(min = 0.01))]
//!     price: f64,
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = Router::new();
//!     app.get("/products/{id:[0-9]+}", show_product).name("products.show");
//!     app.post("/products", create_product).body::<CreateProduct>();
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! async fn show_product(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//!
//! async fn create_product(mut req: Request) -> Response {
//!     match req.validated::<CreateProduct>() {
//!         Some(product) => envelope::success(StatusCode::OK, "created", &product),
//!         None => Response::status(StatusCode::INTERNAL_SERVER_ERROR),
//!     }
//! }
//! ```
//!
//! A request that fails the declared contract never reaches
//! `create_product`: an empty or non-JSON body gets a `400` envelope, a body
//! that violates field rules gets a `422` with one localized entry per
//! field.

mod error;
mod handler;
mod messages;
mod request;
mod response;
mod router;
mod server;
mod validate;

pub mod envelope;
pub mod middleware;

pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use http::{Method, StatusCode};
pub use messages::{Catalog, Messages};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{Group, RouteHandle, Router};
pub use server::Server;
pub use validate::{BindResult, BodySchema, JsonBody};
