//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (intentionally unauthenticated for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check))
        .route("/v1/auth/whoami", get(handlers::whoami))
        .route("/v1/upload-definition", get(handlers::get_upload_definition))
        // Size is enforced while spooling to the temp store, not by the body limit
        .route(
            "/v1/repositories/{repository}/upload",
            post(handlers::upload_asset).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/v1/repositories/{repository}/assets",
            get(handlers::list_assets),
        )
        .route(
            "/v1/repositories/{repository}/assets/{path}",
            get(handlers::download_asset),
        );

    let mut router = Router::new().merge(api_routes);

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
