// handlers/status.rs - GET / and GET /health

use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::app::AppState;

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let functions: Vec<&str> = state.registry.names().collect();

    Json(json!({
        "success": true,
        "data": {
            "name": "Taskflow API (Rust)",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Secured function backend with rate limiting, validation, permissions and audit logging",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "functions": "/api/functions/:name (POST, policy per function)",
            },
            "functions": functions,
        }
    }))
}

/// 200 while the document store answers, 503 otherwise
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let now = chrono::Utc::now();

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "store": "ok"
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "store unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "store_error": e.to_string()
                }
            })),
        ),
    }
}
