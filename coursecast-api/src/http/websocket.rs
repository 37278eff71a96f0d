//! WebSocket handler for the real-time layer
//!
//! A connection is classified and authenticated before the upgrade:
//! unknown paths and bad tokens never reach the registry. After the
//! upgrade, outbound events flow through an mpsc queue drained by a
//! forwarding task (keeping hub broadcasts synchronous and FIFO per
//! connection), while the inbound loop feeds chat frames to the relay.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Path, Query, RawQuery, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::http::{AppError, AppState};
use coursecast_core::models::{ConnectionId, UserId};
use coursecast_core::realtime::{ChannelEvent, ConnectionHandle, ConnectionIntent};
use coursecast_core::Error;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Session token minted by the LMS
    pub token: Option<String>,
}

/// WebSocket entry point for all three path families:
/// `/ws/chat/{course_id}`, `/ws/presence/{course_id}`,
/// `/ws/notifications?user_id={id}`.
pub async fn websocket_handler(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    Query(query): Query<WsQuery>,
    RawQuery(raw_query): RawQuery,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let path = format!("/ws/{rest}");
    let intent = ConnectionIntent::classify(&path, raw_query.as_deref())?;

    let token = query
        .token
        .ok_or_else(|| AppError::unauthorized("Missing token query parameter"))?;
    let claims = state.token_service.validate(&token)?;
    let user_id = claims.user_id();

    // The notification path names its user explicitly; it must be the
    // authenticated one.
    if let ConnectionIntent::NotificationBind(bind_user) = &intent {
        if *bind_user != user_id {
            return Err(AppError::forbidden("Cannot bind another user's channel"));
        }
    }

    // Limit max message size to 64KB (default is far larger than any chat frame)
    Ok(ws
        .max_message_size(64 * 1024)
        .on_upgrade(move |socket| handle_socket(socket, state, intent, user_id)))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    intent: ConnectionIntent,
    user_id: UserId,
) {
    let connection_id = ConnectionId::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<ChannelEvent>();
    let reply_tx = tx.clone();

    let handle = ConnectionHandle {
        connection_id: connection_id.clone(),
        user_id: user_id.clone(),
        sender: tx,
    };

    let (mut ws_sender, mut ws_receiver) = socket.split();

    if let Err(err) = state.registry.accept(intent.clone(), handle) {
        warn!(
            connection_id = %connection_id,
            user_id = %user_id,
            error = %err,
            "Connection rejected at accept"
        );
        let _ = ws_sender
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: err.to_string().into(),
            })))
            .await;
        return;
    }

    info!(
        connection_id = %connection_id,
        user_id = %user_id,
        "WebSocket connection established"
    );

    // Forward queued events to the socket until the queue closes or the
    // transport dies
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event.to_text() {
                Ok(text) => {
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!("Failed to serialize outbound event: {err}");
                }
            }
        }
    });

    // Inbound loop. Only chat subscriptions process frames; presence and
    // notification connections are outbound-only.
    while let Some(Ok(frame)) = ws_receiver.next().await {
        match frame {
            Message::Text(text) => {
                state.registry.record_activity(&connection_id);

                if let ConnectionIntent::ChatSubscribe(course_id) = &intent {
                    let result = state
                        .chat_service
                        .handle(
                            course_id.clone(),
                            &connection_id,
                            user_id.clone(),
                            text.as_str(),
                        )
                        .await;

                    match result {
                        Ok(_) => {}
                        // Sender-facing failures go back to the originating
                        // connection only
                        Err(err @ (Error::Validation(_) | Error::Persistence(_))) => {
                            let _ = reply_tx.send(ChannelEvent::Error {
                                message: err.to_string(),
                            });
                        }
                        Err(err) => {
                            warn!(
                                connection_id = %connection_id,
                                error = %err,
                                "Unexpected relay error"
                            );
                        }
                    }
                }
            }
            Message::Close(_) => break,
            // Ping/pong are answered by the transport layer
            _ => {}
        }
    }

    state.registry.mark_closing(&connection_id);
    state.registry.on_close(&connection_id);
    drop(reply_tx);
    let _ = send_task.await;

    info!(
        connection_id = %connection_id,
        user_id = %user_id,
        "WebSocket connection closed"
    );
}
