use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::{
    models::{ChatMessage, CourseId, UserId},
    Result,
};

/// The persistence collaborator for chat messages.
///
/// The relay awaits `create` before any fan-out; an error here means the
/// message was never broadcast.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Durably store a message, returning the persisted row.
    async fn create(&self, message: &ChatMessage) -> Result<ChatMessage>;

    /// Chat history for a course in reverse chronological order.
    async fn list_by_course(
        &self,
        course_id: &CourseId,
        before: Option<DateTime<Utc>>,
        limit: i32,
    ) -> Result<Vec<ChatMessage>>;
}

/// PostgreSQL-backed chat message store.
#[derive(Clone)]
pub struct ChatRepository {
    pool: PgPool,
}

impl ChatRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert database row to `ChatMessage`
    fn row_to_message(row: &PgRow) -> Result<ChatMessage> {
        Ok(ChatMessage {
            id: row.try_get("id")?,
            course_id: CourseId::from_string(row.try_get("course_id")?),
            author_id: UserId::from_string(row.try_get("author_id")?),
            body: row.try_get("body")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl ChatStore for ChatRepository {
    async fn create(&self, message: &ChatMessage) -> Result<ChatMessage> {
        let row = sqlx::query(
            r"
            INSERT INTO chat_messages (id, course_id, author_id, body, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, course_id, author_id, body, created_at
            ",
        )
        .bind(&message.id)
        .bind(message.course_id.as_str())
        .bind(message.author_id.as_str())
        .bind(&message.body)
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_message(&row)
    }

    async fn list_by_course(
        &self,
        course_id: &CourseId,
        before: Option<DateTime<Utc>>,
        limit: i32,
    ) -> Result<Vec<ChatMessage>> {
        let limit = limit.min(100); // Cap at 100 messages per request

        let rows = if let Some(before_time) = before {
            sqlx::query(
                r"
                SELECT id, course_id, author_id, body, created_at
                FROM chat_messages
                WHERE course_id = $1 AND created_at < $2
                ORDER BY created_at DESC
                LIMIT $3
                ",
            )
            .bind(course_id.as_str())
            .bind(before_time)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                r"
                SELECT id, course_id, author_id, body, created_at
                FROM chat_messages
                WHERE course_id = $1
                ORDER BY created_at DESC
                LIMIT $2
                ",
            )
            .bind(course_id.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(Self::row_to_message).collect()
    }
}

#[cfg(test)]
mod tests {

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_create_message() {
        // Integration test placeholder
    }
}
