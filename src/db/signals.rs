//! `Signal` and `SignalReply` persistence (§3).

use sqlx::Row;

use super::DbTransaction;
use crate::errors::RepositoryError;
use crate::extraction::ExtractedSignal;
use crate::models::{GeneratedBy, ReplyAction, Side, Signal, SignalReply};

impl<'c> DbTransaction<'c> {
    pub async fn insert_signal(
        &mut self,
        message_id: i64,
        extracted: &ExtractedSignal,
    ) -> Result<Signal, RepositoryError> {
        let entries_json = serde_json::to_string(&extracted.entries)?;
        let tps_json = serde_json::to_string(&extracted.tps)?;

        let id = sqlx::query(
            "INSERT INTO signals (message_id, symbol, side, entries, tps, sl)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(message_id)
        .bind(&extracted.symbol)
        .bind(extracted.side.as_str())
        .bind(&entries_json)
        .bind(&tps_json)
        .bind(extracted.sl)
        .execute(&mut *self.tx)
        .await?
        .last_insert_rowid();

        Ok(extracted.clone().into_signal(id, message_id))
    }

    /// Overwrites an existing `Signal` row in place, preserving its identity (§4.2
    /// "edited, SIGNAL_LINKED").
    pub async fn update_signal(
        &mut self,
        signal_id: i64,
        extracted: &ExtractedSignal,
    ) -> Result<(), RepositoryError> {
        let entries_json = serde_json::to_string(&extracted.entries)?;
        let tps_json = serde_json::to_string(&extracted.tps)?;

        sqlx::query(
            "UPDATE signals SET symbol = ?, side = ?, entries = ?, tps = ?, sl = ? WHERE id = ?",
        )
        .bind(&extracted.symbol)
        .bind(extracted.side.as_str())
        .bind(&entries_json)
        .bind(&tps_json)
        .bind(extracted.sl)
        .bind(signal_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn get_signal(&mut self, signal_id: i64) -> Result<Option<Signal>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, message_id, symbol, side, entries, tps, sl FROM signals WHERE id = ?",
        )
        .bind(signal_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_signal).transpose()
    }

    pub async fn insert_signal_reply(
        &mut self,
        action: ReplyAction,
        generated_by: GeneratedBy,
        info_message: Option<&str>,
        original_signal_id: i64,
        new_sl: Option<f64>,
    ) -> Result<SignalReply, RepositoryError> {
        let id = sqlx::query(
            "INSERT INTO signal_replies (action, generated_by, info_message, original_signal_id, new_sl)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(action.as_str())
        .bind(generated_by.as_str())
        .bind(info_message)
        .bind(original_signal_id)
        .bind(new_sl)
        .execute(&mut *self.tx)
        .await?
        .last_insert_rowid();

        Ok(SignalReply {
            id,
            action,
            generated_by,
            info_message: info_message.map(str::to_string),
            original_signal_id,
            new_sl,
        })
    }
}

impl<'c> DbTransaction<'c> {
    pub async fn get_signal_reply(
        &mut self,
        signal_reply_id: i64,
    ) -> Result<Option<SignalReply>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, action, generated_by, info_message, original_signal_id, new_sl
             FROM signal_replies WHERE id = ?",
        )
        .bind(signal_reply_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_signal_reply).transpose()
    }
}

fn row_to_signal_reply(row: sqlx::sqlite::SqliteRow) -> Result<SignalReply, RepositoryError> {
    use std::str::FromStr;
    let action_raw: String = row.get("action");
    let generated_by_raw: String = row.get("generated_by");

    Ok(SignalReply {
        id: row.get("id"),
        action: ReplyAction::from_str(&action_raw)
            .map_err(|_| RepositoryError::NotFound(format!("unknown reply action {action_raw}")))?,
        generated_by: GeneratedBy::from_str(&generated_by_raw).map_err(|_| {
            RepositoryError::NotFound(format!("unknown generated_by {generated_by_raw}"))
        })?,
        info_message: row.get("info_message"),
        original_signal_id: row.get("original_signal_id"),
        new_sl: row.get("new_sl"),
    })
}

fn row_to_signal(row: sqlx::sqlite::SqliteRow) -> Result<Signal, RepositoryError> {
    let side_raw: String = row.get("side");
    let side = if side_raw == "BUY" { Side::Buy } else { Side::Sell };
    let entries_raw: String = row.get("entries");
    let tps_raw: String = row.get("tps");

    Ok(Signal {
        id: row.get("id"),
        message_id: row.get("message_id"),
        symbol: row.get("symbol"),
        side,
        entries: serde_json::from_str(&entries_raw)?,
        tps: serde_json::from_str(&tps_raw)?,
        sl: row.get("sl"),
    })
}
