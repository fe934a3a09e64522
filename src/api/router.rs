use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;
use super::auth::require_auth;
use super::handlers;

pub fn create_router(state: AppState) -> Router {
    // Public routes: no authentication required
    let public = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::render));

    // Protected API routes: Bearer token required when API_TOKEN is set
    let protected = Router::new()
        // Account
        .route("/api/account", get(handlers::account::summary))
        // Deposit flow
        .route("/api/deposit", get(handlers::deposit::status))
        .route("/api/deposit/quote", post(handlers::deposit::quote))
        .route(
            "/api/deposit/order",
            get(handlers::deposit::current_order).post(handlers::deposit::submit_order),
        )
        .route("/api/deposit/queue", post(handlers::deposit::queue))
        .route("/api/deposit/execute", post(handlers::deposit::execute))
        .route("/api/deposit/reset", post(handlers::deposit::reset))
        // WebSocket
        .route("/ws", get(handlers::ws::handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // CORS: the dashboard is served from a different origin in development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    public
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
