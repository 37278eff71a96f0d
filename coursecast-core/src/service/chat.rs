//! Chat message relay
//!
//! Turns an inbound chat payload into a persisted, broadcast message:
//! parse/validate, persist synchronously through the `ChatStore`
//! collaborator, then fan out to the course channel. A persistence failure
//! means nothing is broadcast; a validation failure leaves channel state
//! untouched.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::{
    models::{ChatMessage, ConnectionId, CourseId, SendChatRequest, UserId},
    realtime::{ChannelEvent, CourseChannelHub},
    repository::ChatStore,
    Error, Result,
};

/// Relay for inbound chat messages.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    hub: CourseChannelHub,
    max_body_len: usize,
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService").finish()
    }
}

impl ChatService {
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>, hub: CourseChannelHub, max_body_len: usize) -> Self {
        Self {
            store,
            hub,
            max_body_len,
        }
    }

    /// Relay one inbound chat payload.
    ///
    /// The broadcast carries the persisted message (durable id and
    /// timestamp) and excludes the sender's own connection; the sender's
    /// client renders optimistically and receives errors instead.
    pub async fn handle(
        &self,
        course_id: CourseId,
        sender_connection: &ConnectionId,
        author_id: UserId,
        raw_payload: &str,
    ) -> Result<ChatMessage> {
        let request: SendChatRequest = serde_json::from_str(raw_payload)
            .map_err(|e| Error::Validation(format!("malformed chat payload: {e}")))?;

        if request.body.is_empty() {
            return Err(Error::Validation(
                "message body cannot be empty".to_string(),
            ));
        }
        if request.body.len() > self.max_body_len {
            return Err(Error::Validation(format!(
                "message body must be at most {} bytes",
                self.max_body_len
            )));
        }

        let message = ChatMessage::new(course_id.clone(), author_id.clone(), request.body);

        // Synchronously awaited; on failure nothing is broadcast
        let persisted = self.store.create(&message).await?;

        let sent = self.hub.broadcast(
            &course_id,
            &ChannelEvent::Chat {
                message: persisted.clone(),
            },
            Some(sender_connection),
        );

        info!(
            course_id = %course_id,
            author_id = %author_id,
            message_id = %persisted.id,
            fanout = sent,
            "Chat message relayed"
        );

        Ok(persisted)
    }

    /// Chat history for a course, newest first.
    pub async fn history(
        &self,
        course_id: &CourseId,
        before: Option<DateTime<Utc>>,
        limit: i32,
    ) -> Result<Vec<ChatMessage>> {
        self.store.list_by_course(course_id, before, limit).await
    }
}
