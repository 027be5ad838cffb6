//! Domain model for the trade-signal ingestion, extraction, and fan-out service.
//!
//! Entities are plain structs with the invariants they must satisfy documented inline;
//! enforcement lives in the subsystems that construct them (extraction, lifecycle,
//! distribution), not in the structs themselves.

mod chat_room;
mod copy_setup;
mod message;
mod pending_item;
mod session;
mod signal;
mod signal_reply;
mod trade_candidate;

pub use chat_room::{ChatKind, ChatRoom};
pub use copy_setup::{CopySetup, CopySetupConfig, LotMode};
pub use message::{is_acceptable_length, Message, MESSAGE_TEXT_MAX_LEN, MESSAGE_TEXT_MIN_LEN};
pub use pending_item::PendingKind;
pub use session::{Session, DEFAULT_SESSION_TTL_SECS};
pub use signal::{Side, Signal};
pub use signal_reply::{GeneratedBy, ReplyAction, SignalReply};
pub use trade_candidate::{TradeCandidate, TradeState};
