//! Health check endpoints.

use axum::Json;
use axum::Router;
use axum::routing::get;
use serde_json::{Value, json};

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
}

async fn ping() -> &'static str {
    "pong"
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "dagforge",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
