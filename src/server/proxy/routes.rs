use super::handlers;
use crate::server::auth::middleware::registry_auth_middleware;
use crate::server::state::AppState;
use axum::{middleware, routing::get, Router};

/// The version probe; exempt from registry authentication
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/v2/", get(handlers::api_version_check))
}

/// Catalog, tags, manifests and blobs. Repository names contain slashes, so a
/// single catch-all route is classified by the handler.
pub fn registry_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v2/{*path}", get(handlers::proxy_registry_request))
        .route_layer(middleware::from_fn_with_state(
            state,
            registry_auth_middleware,
        ))
}
