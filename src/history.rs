//! Conversation persistence and history rendering.
//!
//! Messages are stored in SQLite and keyed by their autoincrement rowid, so
//! replay order is the insertion order, not wall-clock time. History is read
//! fresh on every request, so the model always sees the latest persisted
//! state, at the cost of one read per request.

use sqlx::{Row, SqlitePool};

use crate::models::{Message, Role};

/// Message store over the shared SQLite pool.
#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All of one user's messages in strict insertion order.
    pub async fn history(&self, user_id: i64) -> Result<Vec<Message>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, session_id, user_id, role, content FROM messages \
             WHERE user_id = ? ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let role_str: String = row.get("role");
            let Some(role) = Role::parse(&role_str) else {
                // A row we didn't write; skip rather than poison the replay.
                continue;
            };
            messages.push(Message {
                id: row.get("id"),
                session_id: row.get("session_id"),
                user_id: row.get("user_id"),
                role,
                content: row.get("content"),
            });
        }
        Ok(messages)
    }

    /// Persist one completed exchange: the user turn, then the assistant
    /// turn, in one transaction so a failure leaves no partial state.
    pub async fn append_exchange(
        &self,
        user_id: i64,
        question: &str,
        answer: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let session = session_for(user_id);

        sqlx::query("INSERT INTO messages (session_id, user_id, role, content) VALUES (?, ?, ?, ?)")
            .bind(&session)
            .bind(user_id)
            .bind(Role::User.as_str())
            .bind(question)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO messages (session_id, user_id, role, content) VALUES (?, ?, ?, ?)")
            .bind(&session)
            .bind(user_id)
            .bind(Role::Assistant.as_str())
            .bind(answer)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn session_for(user_id: i64) -> String {
    format!("user_{}", user_id)
}

/// Render messages as one text block, `"<Role>: <content>"` per line, in
/// insertion order. Pure; no I/O.
pub fn render_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.display_name(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
