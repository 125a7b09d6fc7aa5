//! Router construction

use axum::{
    extract::DefaultBodyLimit,
    routing::{any, get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::AppState;

/// Build the gateway's HTTP router
///
/// Management endpoints take precedence over proxied service names, so the
/// names in `RESERVED_SERVICE_NAMES` cannot be proxied. Proxied bodies are
/// relayed whole, without the default request body limit.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/services", get(handlers::list_services))
        .route("/register", post(handlers::register))
        .route("/unregister", post(handlers::unregister))
        .route("/enable/:api_name", post(handlers::set_enabled))
        .route(
            "/:api_name",
            any(handlers::proxy_root).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/:api_name/*path",
            any(handlers::proxy).layer(DefaultBodyLimit::disable()),
        )
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
