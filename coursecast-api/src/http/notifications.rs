//! Direct notification push endpoint
//!
//! Called by LMS route handlers (a grading action, an announcement) after
//! their own durable write, to push a live update to the user's bound
//! connection. Delivery is best-effort: if the user has no live connection
//! the payload is dropped, and `delivered` reports that.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::debug;

use crate::http::middleware::AuthUser;
use crate::http::{AppResult, AppState};
use coursecast_core::models::UserId;

/// Push response
#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub delivered: bool,
}

/// POST /api/notifications/{user_id} - push a payload to the user's live
/// connection
pub async fn push_notification(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> AppResult<Json<PushResponse>> {
    let user_id = UserId::from_string(user_id);

    let delivered = state.notifier.notify(&user_id, payload);

    debug!(
        caller = %auth.user_id,
        user_id = %user_id,
        delivered = delivered,
        "Notification push requested"
    );

    Ok(Json(PushResponse { delivered }))
}
