//! The chat-source adapter boundary (§1 Non-goals): "an opaque event producer yielding
//! `{event_kind, chat_external_id, message_external_id, text, post_time,
//! reply_to_external_id?}`". The adapter itself — credentials, wire protocol, reconnect
//! logic for whatever chat backend is configured — is out of scope; this module defines
//! only the trait the lifecycle processor's event loop polls against, so the core can be
//! exercised and tested without a real chat backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three event kinds the chat-source adapter yields (§1, §4.2). "Reply" is not a
/// distinct kind — it's a `new` event whose `reply_to_external_id` resolves to a prior
/// signal-bearing message (Design Notes §9, resolved Open Question).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    New,
    Edited,
    Deleted,
}

/// One normalized chat event, already past the adapter's wire format (§1 "Inputs").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    pub event_kind: EventKind,
    pub chat_external_id: String,
    pub message_external_id: String,
    pub text: String,
    pub post_time: DateTime<Utc>,
    pub reply_to_external_id: Option<String>,
}

/// The chat-source handle: a process-scoped singleton (§5, §9 "Global state") yielding a
/// stream of events. `next_event` suspends until an event is available or the source is
/// closed.
#[async_trait]
pub trait ChatSource: Send + Sync {
    async fn next_event(&mut self) -> Option<ChatEvent>;
}

/// Closed from the start: `next_event` always returns `None`, so the event loop drains
/// immediately. The concrete chat-backend adapter (credentials, wire protocol, reconnect
/// logic) is out of scope for this core (§1) and is wired in at deployment in its place.
pub struct NullChatSource;

#[async_trait]
impl ChatSource for NullChatSource {
    async fn next_event(&mut self) -> Option<ChatEvent> {
        None
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use tokio::sync::mpsc;

    /// An in-memory `ChatSource` fed by a channel, used by lifecycle and bootstrap tests
    /// in place of a real chat backend.
    pub struct ChannelChatSource {
        rx: mpsc::UnboundedReceiver<ChatEvent>,
    }

    impl ChannelChatSource {
        pub fn new() -> (mpsc::UnboundedSender<ChatEvent>, Self) {
            let (tx, rx) = mpsc::unbounded_channel();
            (tx, Self { rx })
        }
    }

    #[async_trait]
    impl ChatSource for ChannelChatSource {
        async fn next_event(&mut self) -> Option<ChatEvent> {
            self.rx.recv().await
        }
    }
}
