/// Direct chat messages and unread alerts
///
/// Messages are append-only. The one mutation is the read flag, which is set
/// when the recipient opens the conversation.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE messages (
///     id SERIAL PRIMARY KEY,
///     sender_id VARCHAR(255) NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     recipient_id VARCHAR(255) NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     text TEXT NOT NULL,
///     timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     is_read BOOLEAN NOT NULL DEFAULT FALSE
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Characters of message text shown in an alert
pub const SNIPPET_LENGTH: i32 = 50;

/// A direct message between two users
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: i32,
    pub sender_id: String,
    pub recipient_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

/// An unread message summarised for the alert bell
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Alert {
    pub sender_id: String,
    pub sender_username: String,
    pub message_snippet: String,
}

impl Message {
    /// Sends a message; it starts unread
    pub async fn create(
        pool: &PgPool,
        sender_id: &str,
        recipient_id: &str,
        text: &str,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (sender_id, recipient_id, text, is_read)
            VALUES ($1, $2, $3, FALSE)
            RETURNING id, sender_id, recipient_id, text, timestamp, is_read
            "#,
        )
        .bind(sender_id)
        .bind(recipient_id)
        .bind(text)
        .fetch_one(pool)
        .await
    }

    /// Opens a conversation as `viewer_id`
    ///
    /// Returns both directions of the conversation, oldest first, and marks
    /// what `other_id` sent to the viewer as read. Both steps share one
    /// transaction; the rows returned show the read flags as they were
    /// before opening.
    pub async fn open_conversation(
        pool: &PgPool,
        viewer_id: &str,
        other_id: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, sender_id, recipient_id, text, timestamp, is_read
            FROM messages
            WHERE (sender_id = $1 AND recipient_id = $2)
               OR (sender_id = $2 AND recipient_id = $1)
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(viewer_id)
        .bind(other_id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE
            WHERE recipient_id = $1 AND sender_id = $2 AND is_read = FALSE
            "#,
        )
        .bind(viewer_id)
        .bind(other_id)
        .execute(&mut *tx)
        .await?;

        // Dropping `tx` on an early return above rolls back
        tx.commit().await?;

        Ok(messages)
    }

    /// Unread messages addressed to the user, newest first
    pub async fn unread_alerts(pool: &PgPool, user_id: &str) -> Result<Vec<Alert>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            SELECT m.sender_id,
                   u.username AS sender_username,
                   LEFT(m.text, $2) AS message_snippet
            FROM messages m
            JOIN users u ON m.sender_id = u.id
            WHERE m.recipient_id = $1 AND m.is_read = FALSE
            ORDER BY m.timestamp DESC, m.id DESC
            "#,
        )
        .bind(user_id)
        .bind(SNIPPET_LENGTH)
        .fetch_all(pool)
        .await
    }
}
