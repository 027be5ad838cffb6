//! Distribution engine (§4.3): expands a `Signal` into per-session `TradeCandidate`
//! deliveries, or fans a `SignalReply` out unchanged, across every `CopySetup` attached
//! to the originating chat room.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::db::Database;
use crate::errors::{DistributionError, RepositoryError};
use crate::extraction::{filter_invalid_prices, sort_prices, FilterParams};
use crate::models::{CopySetup, Signal, SignalReply, TradeCandidate};
use crate::store::PendingQueueStore;
use crate::wire::{SignalReplyScheme, TradeScheme};

/// Process-scoped singleton (§5 "Shared-resource policy"), handed down via `AppContext`.
pub struct DistributionEngine {
    db: Arc<Database>,
    queue_store: Arc<dyn PendingQueueStore>,
    session_ttl_secs: u64,
}

impl DistributionEngine {
    pub fn new(db: Arc<Database>, queue_store: Arc<dyn PendingQueueStore>, session_ttl_secs: u64) -> Self {
        Self {
            db,
            queue_store,
            session_ttl_secs,
        }
    }

    /// Runs the signal fan-out algorithm (§4.3 steps 1-4). Called after the lifecycle
    /// processor's repository transaction has committed; errors here are logged and
    /// never roll back the already-persisted Signal. `post_time` is the originating
    /// Message's `post_time`, copied onto every derived `TradeCandidate` (§4.2 "Time
    /// handling").
    pub async fn distribute_signal(&self, signal: &Signal, chat_room_id: i64, post_time: DateTime<Utc>) {
        let copy_setups = match self.load_copy_setups(chat_room_id).await {
            Ok(setups) => setups,
            Err(err) => {
                warn!(error = %err, chat_room_id, "failed to load copy setups for distribution");
                return;
            }
        };

        if copy_setups.is_empty() {
            return;
        }

        for cs in &copy_setups {
            if let Err(err) = self
                .distribute_signal_to_copy_setup(signal, cs, post_time)
                .await
            {
                warn!(
                    error = %err,
                    copy_setup_id = cs.id,
                    signal_id = signal.id,
                    "signal distribution failed for copy setup, continuing with others"
                );
            }
        }
    }

    async fn distribute_signal_to_copy_setup(
        &self,
        signal: &Signal,
        cs: &CopySetup,
        post_time: DateTime<Utc>,
    ) -> Result<(), DistributionError> {
        let candidates = generate_trades(&self.db, signal, cs, post_time).await?;
        if candidates.is_empty() {
            return Ok(());
        }

        let sessions = self.queue_store.sessions_by_copy_setup(cs.id, None).await?;
        if sessions.is_empty() {
            return Ok(());
        }

        let trades: Vec<TradeScheme> = candidates.iter().map(TradeScheme::from).collect();
        for session in &sessions {
            if let Err(err) = self
                .queue_store
                .add_pending_trades(&session.client_instance_id, &trades, self.session_ttl_secs)
                .await
            {
                warn!(
                    error = %err,
                    client_instance_id = %session.client_instance_id,
                    copy_setup_id = cs.id,
                    "failed to enqueue trades for session, continuing with others"
                );
            }
        }
        info!(
            copy_setup_id = cs.id,
            signal_id = signal.id,
            candidate_count = candidates.len(),
            session_count = sessions.len(),
            "distributed signal"
        );
        Ok(())
    }

    /// Reply fan-out (§4.3 "Reply fan-out algorithm"): no expansion, convert once and
    /// enqueue to every session of every attached copy setup.
    pub async fn distribute_reply(&self, reply: &SignalReply, chat_room_id: i64) {
        let copy_setups = match self.load_copy_setups(chat_room_id).await {
            Ok(setups) => setups,
            Err(err) => {
                warn!(error = %err, chat_room_id, "failed to load copy setups for reply distribution");
                return;
            }
        };
        if copy_setups.is_empty() {
            return;
        }

        let scheme = SignalReplyScheme::from(reply);
        for cs in &copy_setups {
            let sessions = match self.queue_store.sessions_by_copy_setup(cs.id, None).await {
                Ok(sessions) => sessions,
                Err(err) => {
                    warn!(error = %err, copy_setup_id = cs.id, "failed to load sessions for reply distribution");
                    continue;
                }
            };
            for session in &sessions {
                if let Err(err) = self
                    .queue_store
                    .add_pending_signal_replies(
                        &session.client_instance_id,
                        std::slice::from_ref(&scheme),
                        self.session_ttl_secs,
                    )
                    .await
                {
                    warn!(
                        error = %err,
                        client_instance_id = %session.client_instance_id,
                        copy_setup_id = cs.id,
                        "failed to enqueue signal reply for session, continuing with others"
                    );
                }
            }
        }
    }

    async fn load_copy_setups(&self, chat_room_id: i64) -> Result<Vec<CopySetup>, RepositoryError> {
        let mut tx = self.db.begin().await?;
        let setups = tx.copy_setups_for_chat_room(chat_room_id).await?;
        tx.commit().await?;
        Ok(setups)
    }
}

/// `generate_trades` (§4.3 step 3a): re-applies price filtering under `cs`'s own caps
/// and emits one `TradeCandidate` per kept `(entry, tp)` pair, in
/// `(entry_index ascending, tp_index ascending)` order. Per-candidate persistence
/// failures are logged and do not abort their peers.
async fn generate_trades(
    db: &Database,
    signal: &Signal,
    cs: &CopySetup,
    post_time: DateTime<Utc>,
) -> Result<Vec<TradeCandidate>, RepositoryError> {
    let mut entries = signal.entries.clone();
    let mut tps = signal.tps.clone();
    sort_prices(signal.side, &mut entries, &mut tps);

    let params = FilterParams {
        max_entries: cs.config.max_entry_prices,
        max_tps: cs.config.max_tp_prices,
        ignore_invalid_prices: cs.config.ignore_invalid_prices,
    };
    let (entries, tps) =
        match filter_invalid_prices(signal.side, signal.sl, &entries, &tps, &params) {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, copy_setup_id = cs.id, "price filtering raised, producing no candidates");
                return Ok(Vec::new());
            }
        };
    if entries.is_empty() || tps.is_empty() {
        return Ok(Vec::new());
    }

    let mut tx = db.begin().await?;
    let mut out = Vec::with_capacity(entries.len() * tps.len());
    for (entries_idx, &entry_price) in entries.iter().enumerate() {
        for (tps_idx, &tp_price) in tps.iter().enumerate() {
            match tx
                .insert_trade_candidate(
                    signal.id,
                    cs.id,
                    &signal.symbol,
                    signal.side,
                    entry_price,
                    tp_price,
                    signal.sl,
                    entries_idx,
                    tps_idx,
                    post_time,
                )
                .await
            {
                Ok(candidate) => out.push(candidate),
                Err(err) => warn!(
                    error = %err,
                    signal_id = signal.id,
                    copy_setup_id = cs.id,
                    entries_idx,
                    tps_idx,
                    "failed to persist a trade candidate, continuing with peers"
                ),
            }
        }
    }
    tx.commit().await?;
    Ok(out)
}
