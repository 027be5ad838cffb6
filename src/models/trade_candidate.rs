use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signal::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeState {
    PendingQueue,
}

/// Ephemeral expansion of `(Signal, CopySetup)` into one accepted `(entry, tp)` pair.
///
/// Created by the distribution engine (§4.3); carries the positional indices
/// (`entries_idx`, `tps_idx`) back to the originating Signal's price lists, used by
/// clients to correlate fills with the signal that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeCandidate {
    pub id: i64,
    pub signal_id: i64,
    pub copy_setup_id: i64,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub tp_price: f64,
    pub sl_price: f64,
    pub entries_idx: usize,
    pub tps_idx: usize,
    pub state: TradeState,
    pub signal_post_datetime: DateTime<Utc>,
}
