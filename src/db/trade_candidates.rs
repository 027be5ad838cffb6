//! `TradeCandidate` persistence (§3, §4.3): the ephemeral expansion of `(Signal,
//! CopySetup)` into one accepted `(entry, tp)` pair, persisted in state `PENDING_QUEUE`
//! before being converted to a wire scheme and fanned out.

use chrono::{DateTime, Utc};

use super::DbTransaction;
use crate::errors::RepositoryError;
use crate::models::{Side, TradeCandidate, TradeState};

impl<'c> DbTransaction<'c> {
    pub async fn insert_trade_candidate(
        &mut self,
        signal_id: i64,
        copy_setup_id: i64,
        symbol: &str,
        side: Side,
        entry_price: f64,
        tp_price: f64,
        sl_price: f64,
        entries_idx: usize,
        tps_idx: usize,
        signal_post_datetime: DateTime<Utc>,
    ) -> Result<TradeCandidate, RepositoryError> {
        let id = sqlx::query(
            "INSERT INTO trade_candidates
             (signal_id, copy_setup_id, symbol, side, entry_price, tp_price, sl_price,
              entries_idx, tps_idx, state, signal_post_datetime)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'PENDING_QUEUE', ?)",
        )
        .bind(signal_id)
        .bind(copy_setup_id)
        .bind(symbol)
        .bind(side.as_str())
        .bind(entry_price)
        .bind(tp_price)
        .bind(sl_price)
        .bind(entries_idx as i64)
        .bind(tps_idx as i64)
        .bind(signal_post_datetime.to_rfc3339())
        .execute(&mut *self.tx)
        .await?
        .last_insert_rowid();

        Ok(TradeCandidate {
            id,
            signal_id,
            copy_setup_id,
            symbol: symbol.to_string(),
            side,
            entry_price,
            tp_price,
            sl_price,
            entries_idx,
            tps_idx,
            state: TradeState::PendingQueue,
            signal_post_datetime,
        })
    }
}
