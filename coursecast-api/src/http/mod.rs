// Module: http
// HTTP/JSON + WebSocket surface for the real-time layer

pub mod courses;
pub mod error;
pub mod health;
pub mod middleware;
pub mod notifications;
pub mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use coursecast_core::realtime::{ConnectionRegistry, PresenceTracker, UserNotificationRouter};
use coursecast_core::service::{ChatService, TokenService};

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub notifier: UserNotificationRouter,
    pub presence: PresenceTracker,
    pub chat_service: Arc<ChatService>,
    pub token_service: Arc<TokenService>,
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoints (for monitoring probes)
        .merge(health::create_health_router())
        // Course chat history + presence roster
        .merge(courses::create_course_router())
        // Direct notification push (called by LMS route handlers)
        .route(
            "/api/notifications/{user_id}",
            post(notifications::push_notification),
        )
        // WebSocket entry point; classification happens before the upgrade
        .route("/ws/{*path}", get(websocket::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
