//! `Message` persistence (§3): keyed by `(chat_room_id, external_message_id)`, never
//! hard-deleted.

use chrono::{DateTime, Utc};
use sqlx::Row;

use super::DbTransaction;
use crate::errors::RepositoryError;
use crate::models::Message;

impl<'c> DbTransaction<'c> {
    pub async fn get_message_by_external_id(
        &mut self,
        chat_room_id: i64,
        external_message_id: &str,
    ) -> Result<Option<Message>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, chat_room_id, external_message_id, text, post_time, signal_id, signal_reply_id
             FROM messages WHERE chat_room_id = ? AND external_message_id = ?",
        )
        .bind(chat_room_id)
        .bind(external_message_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(row_to_message))
    }

    pub async fn insert_message(
        &mut self,
        chat_room_id: i64,
        external_message_id: &str,
        text: &str,
        post_time: DateTime<Utc>,
    ) -> Result<Message, RepositoryError> {
        let id = sqlx::query(
            "INSERT INTO messages (chat_room_id, external_message_id, text, post_time)
             VALUES (?, ?, ?, ?)",
        )
        .bind(chat_room_id)
        .bind(external_message_id)
        .bind(text)
        .bind(post_time.to_rfc3339())
        .execute(&mut *self.tx)
        .await?
        .last_insert_rowid();

        Ok(Message {
            id,
            chat_room_id,
            external_message_id: external_message_id.to_string(),
            text: text.to_string(),
            post_time,
            signal_id: None,
            signal_reply_id: None,
        })
    }

    /// Last-writer-wins text update (§5 "Ordering guarantees"): concurrent edits of the
    /// same message simply overwrite each other in commit order.
    pub async fn update_message_text(
        &mut self,
        message_id: i64,
        text: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE messages SET text = ? WHERE id = ?")
            .bind(text)
            .bind(message_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn link_message_to_signal(
        &mut self,
        message_id: i64,
        signal_id: i64,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE messages SET signal_id = ? WHERE id = ?")
            .bind(signal_id)
            .bind(message_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn link_message_to_signal_reply(
        &mut self,
        message_id: i64,
        signal_reply_id: i64,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE messages SET signal_reply_id = ? WHERE id = ?")
            .bind(signal_reply_id)
            .bind(message_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn get_message_by_id(
        &mut self,
        message_id: i64,
    ) -> Result<Option<Message>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, chat_room_id, external_message_id, text, post_time, signal_id, signal_reply_id
             FROM messages WHERE id = ?",
        )
        .bind(message_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(row_to_message))
    }
}

fn row_to_message(row: sqlx::sqlite::SqliteRow) -> Message {
    let post_time_raw: String = row.get("post_time");
    let post_time = DateTime::parse_from_rfc3339(&post_time_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Message {
        id: row.get("id"),
        chat_room_id: row.get("chat_room_id"),
        external_message_id: row.get("external_message_id"),
        text: row.get("text"),
        post_time,
        signal_id: row.get("signal_id"),
        signal_reply_id: row.get("signal_reply_id"),
    }
}
