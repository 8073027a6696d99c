use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware, tracking};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let image_cache = state.sanitized_config().image_cache;

    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Tracking list
        .route(
            "/users/{user_id}/tracking",
            get(tracking::list_tracking).post(tracking::add_work),
        )
        .route(
            "/users/{user_id}/tracking/{id}",
            patch(tracking::update_tracking).delete(tracking::remove_work),
        )
        .route("/users/{user_id}/tracking/{id}/acknowledge", post(tracking::acknowledge))
        .route("/users/{user_id}/tracking/{id}/sync", post(tracking::sync_one))
        // Sync, updates and search
        .route("/users/{user_id}/sync", post(tracking::sync_all))
        .route("/users/{user_id}/updates", get(tracking::pending_updates))
        .route("/users/{user_id}/search", get(tracking::search))
        .route("/ingest", post(tracking::ingest))
        .with_state(Arc::clone(&state));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .nest_service(&image_cache.web_prefix, ServeDir::new(&image_cache.dir))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
