//! Wire schemes (§6): the JSON shapes crossing the HTTP boundary and stored verbatim as
//! pending-queue payloads. Shared between the HTTP layer, the distribution engine, and
//! the queue store so all three agree on exactly one representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{SignalReply, TradeCandidate, TradeState};

fn is_false(b: &bool) -> bool {
    !b
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientInitBody {
    pub account_id: i64,
    pub account_name: String,
    pub account_server: String,
    pub account_balance: f64,
    pub account_equity: f64,
    pub account_open_pnl: f64,
    pub poll_interval: i32,
    pub client_version: f64,
    #[serde(default)]
    pub client_instance_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInitResponse {
    pub client_instance_id: String,
    pub refresh_token: String,
    pub expire_sec: u64,
    pub server_caps: serde_json::Value,
    pub lot_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_lot: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakeven_on_tp_layer: Option<i32>,
    #[serde(skip_serializing_if = "is_false")]
    pub close_trades_before_everyday_swap: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub close_trades_before_wednesday_swap: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub close_trades_before_weekend: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub trailingstop_on_tps: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tradeprofit_percent_from_balans_for_breakeven: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_minutes_pending_trade: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_minutes_active_trade: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_at_tp_hit_before_entry: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollBody {
    pub account_id: i64,
    pub client_instance_id: String,
    pub account_balance: f64,
    pub account_equity: f64,
    #[serde(default)]
    pub trades: Vec<TradeScheme>,
    #[serde(default)]
    pub trade_ack_ids: Vec<i64>,
    #[serde(default)]
    pub signal_reply_ack_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    pub refresh_token: String,
    pub trades: Vec<TradeScheme>,
    pub signal_replies: Vec<SignalReplyScheme>,
}

/// One client-visible trade record — either a server-emitted `TradeCandidate` projection
/// (distribution writes these) or client-uploaded feedback state (poll bodies carry
/// these back, persisted for observability only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeScheme {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub signal_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub trade_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sl_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_sl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_datetime: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_datetime: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_post_datetime: Option<DateTime<Utc>>,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_tps_idx: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_entries_idx: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magic: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalReplyScheme {
    pub id: i64,
    pub action: String,
    pub generated_by: String,
    pub original_signal_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info_message: Option<String>,
}

/// Projects a server-computed `TradeCandidate` into the pending-queue wire shape (§4.3
/// step 3c). Fields only a client fills in (ticket, close_price, pnl, ...) stay `None`.
impl From<&TradeCandidate> for TradeScheme {
    fn from(candidate: &TradeCandidate) -> Self {
        let state = match candidate.state {
            TradeState::PendingQueue => "PENDING_QUEUE",
        };
        TradeScheme {
            id: Some(candidate.id),
            signal_id: candidate.signal_id,
            ticket: None,
            symbol: Some(candidate.symbol.clone()),
            trade_type: Some(candidate.side.as_str().to_string()),
            entry_price: Some(candidate.entry_price),
            open_price: None,
            sl_price: Some(candidate.sl_price),
            tp_price: Some(candidate.tp_price),
            modified_sl: None,
            close_price: None,
            current_price: None,
            open_datetime: None,
            close_datetime: None,
            signal_post_datetime: Some(candidate.signal_post_datetime),
            state: state.to_string(),
            signal_tps_idx: Some(candidate.tps_idx as i64),
            signal_entries_idx: Some(candidate.entries_idx as i64),
            close_reason: None,
            expire_reason: None,
            volume: None,
            pnl: None,
            swap: None,
            commission: None,
            fee: None,
            comment: None,
            magic: None,
        }
    }
}

impl From<&SignalReply> for SignalReplyScheme {
    fn from(reply: &SignalReply) -> Self {
        SignalReplyScheme {
            id: reply.id,
            action: reply.action.as_str().to_string(),
            generated_by: reply.generated_by.as_str().to_string(),
            original_signal_id: reply.original_signal_id,
            info_message: reply.info_message.clone(),
        }
    }
}
