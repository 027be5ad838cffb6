//! `ChatRoom` persistence (§3): upserted on first sighting, never deleted.

use sqlx::Row;

use super::DbTransaction;
use crate::errors::RepositoryError;
use crate::models::{ChatKind, ChatRoom};

impl<'c> DbTransaction<'c> {
    pub async fn get_chat_room_by_external_id(
        &mut self,
        external_chat_id: &str,
    ) -> Result<Option<ChatRoom>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, external_chat_id, kind, title, handle FROM chat_rooms
             WHERE external_chat_id = ?",
        )
        .bind(external_chat_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|row| ChatRoom {
            id: row.get("id"),
            external_chat_id: row.get("external_chat_id"),
            kind: row.get::<String, _>("kind").parse().unwrap_or(ChatKind::Unknown),
            title: row.get("title"),
            handle: row.get("handle"),
        }))
    }

    /// Inserts a new `ChatRoom`. Callers upsert-by-read-then-insert; the `UNIQUE`
    /// constraint on `external_chat_id` is the `IntegrityError` fallback's backstop
    /// (§4.2 "Preconditions": "chat is known, upserted on first sighting with
    /// `IntegrityError` fallback to re-fetch").
    pub async fn insert_chat_room(
        &mut self,
        external_chat_id: &str,
        kind: ChatKind,
        title: Option<&str>,
        handle: Option<&str>,
    ) -> Result<ChatRoom, RepositoryError> {
        let id = sqlx::query(
            "INSERT INTO chat_rooms (external_chat_id, kind, title, handle)
             VALUES (?, ?, ?, ?)",
        )
        .bind(external_chat_id)
        .bind(kind.to_string())
        .bind(title)
        .bind(handle)
        .execute(&mut *self.tx)
        .await?
        .last_insert_rowid();

        Ok(ChatRoom {
            id,
            external_chat_id: external_chat_id.to_string(),
            kind,
            title: title.map(str::to_string),
            handle: handle.map(str::to_string),
        })
    }

    /// Read-then-insert upsert: on a unique-constraint race, re-fetches the row another
    /// concurrent transaction just committed (§4.2 "chat is known" precondition).
    pub async fn upsert_chat_room(
        &mut self,
        external_chat_id: &str,
        kind: ChatKind,
        title: Option<&str>,
        handle: Option<&str>,
    ) -> Result<ChatRoom, RepositoryError> {
        if let Some(room) = self.get_chat_room_by_external_id(external_chat_id).await? {
            return Ok(room);
        }
        match self.insert_chat_room(external_chat_id, kind, title, handle).await {
            Ok(room) => Ok(room),
            Err(RepositoryError::Database(sqlx::Error::Database(e))) if e.is_unique_violation() => {
                self.get_chat_room_by_external_id(external_chat_id)
                    .await?
                    .ok_or_else(|| RepositoryError::NotFound(format!("chat_room {external_chat_id}")))
            }
            Err(e) => Err(e),
        }
    }
}
