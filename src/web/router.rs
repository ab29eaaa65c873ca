use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use super::app_state::AppState;
use super::rest_api;
use super::ws_handler::ws_upgrade;

/// Build the axum router with all HTTP and WebSocket routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", axum::routing::get(ws_upgrade))
        .route("/api/health", axum::routing::get(rest_api::health))
        .route(
            "/api/clubs/{club_id}/messages",
            axum::routing::get(rest_api::get_club_history),
        )
        .route(
            "/api/messages/direct/{user_a}/{user_b}",
            axum::routing::get(rest_api::get_direct_history),
        )
        .layer(cors)
        .with_state(state)
}
