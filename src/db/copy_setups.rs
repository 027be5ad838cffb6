//! `CopySetup` / `CopySetupConfig` persistence (§3) and the chat↔copy-setup membership
//! association consumed by the lifecycle processor's precondition check and the
//! distribution engine's fan-out (§4.2, §4.3).

use std::collections::HashMap;

use sqlx::Row;

use super::DbTransaction;
use crate::errors::RepositoryError;
use crate::models::{CopySetup, CopySetupConfig};

impl<'c> DbTransaction<'c> {
    pub async fn get_copy_setup_by_token(
        &mut self,
        token: &str,
    ) -> Result<Option<CopySetup>, RepositoryError> {
        let row = sqlx::query("SELECT id, token, active, config FROM copy_setups WHERE token = ?")
            .bind(token)
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(row) = row else { return Ok(None) };
        let copy_setup_id: i64 = row.get("id");
        let chat_room_ids = self.chat_room_ids_for_copy_setup(copy_setup_id).await?;
        Ok(Some(row_to_copy_setup(row, chat_room_ids)?))
    }

    pub async fn get_copy_setup(
        &mut self,
        copy_setup_id: i64,
    ) -> Result<Option<CopySetup>, RepositoryError> {
        let row = sqlx::query("SELECT id, token, active, config FROM copy_setups WHERE id = ?")
            .bind(copy_setup_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(row) = row else { return Ok(None) };
        let chat_room_ids = self.chat_room_ids_for_copy_setup(copy_setup_id).await?;
        Ok(Some(row_to_copy_setup(row, chat_room_ids)?))
    }

    /// Every active `CopySetup` attached to a chat room, eagerly loaded with its config
    /// and membership (§4.3 step 1: "eager-load Signal -> Message -> ChatRoom ->
    /// CopySetups -> CopySetupConfig").
    pub async fn copy_setups_for_chat_room(
        &mut self,
        chat_room_id: i64,
    ) -> Result<Vec<CopySetup>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT cs.id, cs.token, cs.active, cs.config
             FROM copy_setups cs
             JOIN copy_setup_chat_rooms m ON m.copy_setup_id = cs.id
             WHERE m.chat_room_id = ? AND cs.active = 1",
        )
        .bind(chat_room_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let copy_setup_id: i64 = row.get("id");
            let chat_room_ids = self.chat_room_ids_for_copy_setup(copy_setup_id).await?;
            out.push(row_to_copy_setup(row, chat_room_ids)?);
        }
        Ok(out)
    }

    /// §4.2 precondition: "chat has >=1 active CopySetup (otherwise the event is
    /// acknowledged but ignored)".
    pub async fn chat_has_active_copy_setup(
        &mut self,
        chat_room_id: i64,
    ) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT 1 FROM copy_setup_chat_rooms m
             JOIN copy_setups cs ON cs.id = m.copy_setup_id
             WHERE m.chat_room_id = ? AND cs.active = 1
             LIMIT 1",
        )
        .bind(chat_room_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.is_some())
    }

    /// The room's allowed-symbol map (§4.1 "Inputs"): the union of every active
    /// `CopySetup` attached to the room's `symbol_synonyms`, flattened to
    /// `synonym -> canonical`. Chat rooms are shared infrastructure; a room's accepted
    /// tickers are whatever any attached copy setup recognizes.
    pub async fn allowed_symbols_map_for_chat(
        &mut self,
        chat_room_id: i64,
    ) -> Result<HashMap<String, String>, RepositoryError> {
        let setups = self.copy_setups_for_chat_room(chat_room_id).await?;
        let mut merged = HashMap::new();
        for setup in setups {
            merged.extend(setup.config.flatten_synonyms());
        }
        Ok(merged)
    }

    async fn chat_room_ids_for_copy_setup(
        &mut self,
        copy_setup_id: i64,
    ) -> Result<Vec<i64>, RepositoryError> {
        let rows = sqlx::query("SELECT chat_room_id FROM copy_setup_chat_rooms WHERE copy_setup_id = ?")
            .bind(copy_setup_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("chat_room_id")).collect())
    }

    /// Test/fixture helper: administrative creation of copy setups lives outside this
    /// core (§1 Non-goals: "the administrative HTML UI"), but integration tests need a
    /// way to seed one.
    #[cfg(test)]
    pub async fn create_copy_setup(
        &mut self,
        token: &str,
        config: &CopySetupConfig,
        chat_room_ids: &[i64],
    ) -> Result<CopySetup, RepositoryError> {
        let config_json = serde_json::to_string(config)?;
        let id = sqlx::query("INSERT INTO copy_setups (token, active, config) VALUES (?, 1, ?)")
            .bind(token)
            .bind(&config_json)
            .execute(&mut *self.tx)
            .await?
            .last_insert_rowid();

        for chat_room_id in chat_room_ids {
            sqlx::query(
                "INSERT INTO copy_setup_chat_rooms (copy_setup_id, chat_room_id) VALUES (?, ?)",
            )
            .bind(id)
            .bind(chat_room_id)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(CopySetup {
            id,
            token: token.to_string(),
            active: true,
            config: config.clone(),
            chat_room_ids: chat_room_ids.to_vec(),
        })
    }
}

fn row_to_copy_setup(
    row: sqlx::sqlite::SqliteRow,
    chat_room_ids: Vec<i64>,
) -> Result<CopySetup, RepositoryError> {
    let config_raw: String = row.get("config");
    let config: CopySetupConfig = serde_json::from_str(&config_raw)?;
    Ok(CopySetup {
        id: row.get("id"),
        token: row.get("token"),
        active: row.get::<i64, _>("active") != 0,
        config,
        chat_room_ids,
    })
}
