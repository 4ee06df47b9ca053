use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use std::net::IpAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::database::DocumentStore;
use crate::functions::FunctionRegistry;
use crate::handlers;
use crate::middleware::identity_middleware;
use crate::security::SecurityLogger;

/// Shared state handed to every handler and to the identity middleware
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FunctionRegistry>,
    pub store: Arc<dyn DocumentStore>,
    pub logger: SecurityLogger,
    pub jwt_secret: String,
    /// Peers whose X-Forwarded-For header names the real client
    pub trusted_proxies: Arc<[IpAddr]>,
}

pub fn router(state: AppState, config: &AppConfig) -> Router {
    let router = Router::new()
        // Public
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        // Secured functions; access rules live in each function's policy
        .route("/api/functions/:name", post(handlers::function_call))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes))
                .layer(cors_layer(&config.api.cors_origins))
                .layer(middleware::from_fn_with_state(state.clone(), identity_middleware)),
        );

    let router = if config.api.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };

    router.with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::permissive().allow_origin(AllowOrigin::list(allowed))
}
