//! Outbound event envelope for real-time subscribers
//!
//! Every frame a client receives is one of these, serialized as JSON text
//! with a `type` tag so clients demultiplex a single way.

use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, UserId};
use crate::Result;

/// Event delivered to real-time subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// A persisted chat message, fanned out to the course channel
    Chat {
        #[serde(flatten)]
        message: ChatMessage,
    },
    /// The authoritative roster of user ids connected to a course channel
    Presence { users: Vec<UserId> },
    /// A direct notification pushed to a single user's connection
    Notification { payload: serde_json::Value },
    /// An error reported back to the originating connection only
    Error { message: String },
}

impl ChannelEvent {
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat",
            Self::Presence { .. } => "presence",
            Self::Notification { .. } => "notification",
            Self::Error { .. } => "error",
        }
    }

    #[must_use]
    pub fn is_chat(&self) -> bool {
        matches!(self, Self::Chat { .. })
    }

    /// Serialize to the JSON text frame sent over the wire.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMessage, CourseId, UserId};

    #[test]
    fn test_presence_event_shape() {
        let event = ChannelEvent::Presence {
            users: vec![UserId::from_string("u1".to_string())],
        };

        let json = event.to_text().unwrap();
        assert_eq!(json, r#"{"type":"presence","users":["u1"]}"#);
    }

    #[test]
    fn test_chat_event_flattens_message() {
        let message = ChatMessage::new(
            CourseId::from_string("course1".to_string()),
            UserId::from_string("user1".to_string()),
            "hello".to_string(),
        );
        let event = ChannelEvent::Chat { message };

        let json = event.to_text().unwrap();
        assert!(json.contains(r#""type":"chat""#));
        assert!(json.contains(r#""course_id":"course1""#));
        assert!(json.contains(r#""author_id":"user1""#));
        assert!(json.contains(r#""body":"hello""#));
    }

    #[test]
    fn test_notification_event_carries_payload() {
        let event = ChannelEvent::Notification {
            payload: serde_json::json!({"kind": "grade_posted", "assignment_id": "a1"}),
        };

        let json = event.to_text().unwrap();
        assert!(json.contains(r#""type":"notification""#));
        assert!(json.contains("grade_posted"));
    }
}
