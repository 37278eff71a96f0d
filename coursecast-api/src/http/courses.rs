//! Course-scoped REST endpoints
//!
//! Chat history and the live presence roster. The rest of the course CRUD
//! surface lives in the LMS application, not here.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::http::middleware::AuthUser;
use crate::http::{AppResult, AppState};
use coursecast_core::models::{ChatMessage, CourseId, UserId};

/// Chat history query parameters
#[derive(Debug, Deserialize)]
pub struct ChatHistoryParams {
    pub before: Option<chrono::DateTime<chrono::Utc>>,
    pub limit: Option<i32>,
}

/// Chat history response
#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub messages: Vec<ChatMessage>,
}

/// Presence roster response
#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub users: Vec<UserId>,
}

/// Create course-scoped routes
pub fn create_course_router() -> Router<AppState> {
    Router::new()
        .route("/api/courses/{course_id}/chat", get(get_chat_history))
        .route("/api/courses/{course_id}/presence", get(get_presence))
}

/// GET /api/courses/{course_id}/chat - chat history, newest first
pub async fn get_chat_history(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Query(params): Query<ChatHistoryParams>,
) -> AppResult<Json<ChatHistoryResponse>> {
    let course_id = CourseId::from_string(course_id);
    let limit = params.limit.unwrap_or(50);

    let messages = state
        .chat_service
        .history(&course_id, params.before, limit)
        .await?;

    Ok(Json(ChatHistoryResponse { messages }))
}

/// GET /api/courses/{course_id}/presence - who is currently connected
pub async fn get_presence(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> AppResult<Json<PresenceResponse>> {
    let course_id = CourseId::from_string(course_id);

    Ok(Json(PresenceResponse {
        users: state.presence.current_users(&course_id),
    }))
}
