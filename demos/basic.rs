//! Minimal torii example — a products API with a validated body contract.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/products/42
//!   curl -X POST http://localhost:3000/products \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"Widget","price":9.99}'
//!   curl -X POST http://localhost:3000/products \
//!        -H 'content-type: application/json' \
//!        -d '{"price":-1}'          # 422 with per-field messages
//!   curl -X POST http://localhost:3000/products -d ''   # 400 invalid body

use serde::{Deserialize, Serialize};
use torii::middleware::{Cors, Trace};
use torii::{envelope, Catalog, Request, Response, Router, Server, StatusCode};
use validator::Validate;

#[derive(Debug, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
struct CreateProduct {
    #[validate(length(min = 1))]
    name: String,
    #[validate(range(min = 0.01))]
    price: f64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut app = Router::new();

    let mut products = app.group("/products").middleware(Trace).middleware(Cors::new());
    products.get("/{id:[0-9]+}", show_product).name("products.show");
    products
        .post("/", create_product)
        .body::<CreateProduct>()
        .name("products.create");

    let mut server = Server::bind("0.0.0.0:3000");
    match Catalog::load("demos/locales") {
        Ok(catalog) => {
            if let Some(messages) = catalog.language("en-US") {
                server = server.messages(messages);
            }
        }
        Err(e) => eprintln!("no locale catalog: {e}"),
    }

    server.serve(app).await.expect("server error");
}

async fn show_product(req: Request) -> Response {
    let id = req.param("id").unwrap_or("unknown");
    envelope::success(
        StatusCode::OK,
        "",
        &serde_json::json!({"id": id, "name": "Widget", "price": 9.99}),
    )
}

async fn create_product(mut req: Request) -> Response {
    let Some(product) = req.validated::<CreateProduct>() else {
        return envelope::error(StatusCode::BAD_REQUEST, "request body is required", Vec::new(), &[]);
    };

    let message = req.message("locale.product_created").unwrap_or("Product created");
    let location = req.url_for("products.show", &[("id", "99")]).unwrap_or_default();

    let mut res = envelope::success(StatusCode::OK, message, &product);
    res.set_header("location", &location);
    res
}
