use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{CourseId, UserId};

/// A chat message within a course channel.
///
/// `id` and `created_at` become authoritative once the message is persisted;
/// the values assigned here are what the INSERT records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String, // nanoid(12)
    pub course_id: CourseId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(course_id: CourseId, author_id: UserId, body: String) -> Self {
        Self {
            id: super::id::generate_id(),
            course_id,
            author_id,
            body,
            created_at: Utc::now(),
        }
    }
}

/// Inbound chat payload as received from a client frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendChatRequest {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistoryQuery {
    pub course_id: CourseId,
    pub limit: i32,
    pub before: Option<DateTime<Utc>>,
}

impl Default for ChatHistoryQuery {
    fn default() -> Self {
        Self {
            course_id: CourseId::from_string(String::new()),
            limit: 100,
            before: None,
        }
    }
}
