//! Message lifecycle processor (§4.2): translates each chat event into at most one new
//! `Signal` or `SignalReply`, maintains referential integrity, and hands off to
//! distribution after the repository transaction commits.

use std::sync::Arc;

use tracing::warn;

use crate::chat_source::{ChatEvent, EventKind};
use crate::config::ExtractionConfig;
use crate::db::Database;
use crate::distribution::DistributionEngine;
use crate::errors::LifecycleError;
use crate::extraction::{
    self, ExtractionContext, ExtractionResult, ExtractorClient, FilterParams, RetryPolicy,
};
use crate::models::{is_acceptable_length, ChatKind, CopySetup, GeneratedBy, ReplyAction};

/// The state of a referenced `Message` immediately before an event is applied (§4.2
/// "State machine per (chat, external_message_id)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    None,
    Bare,
    SignalLinked,
    ReplyLinked,
}

pub struct MessageLifecycleProcessor {
    db: Arc<Database>,
    distribution: Arc<DistributionEngine>,
    extractor: Option<Arc<dyn ExtractorClient>>,
    extraction_config: ExtractionConfig,
    retry_policy: RetryPolicy,
}

impl MessageLifecycleProcessor {
    pub fn new(
        db: Arc<Database>,
        distribution: Arc<DistributionEngine>,
        extractor: Option<Arc<dyn ExtractorClient>>,
        extraction_config: ExtractionConfig,
    ) -> Self {
        let retry_policy = RetryPolicy {
            retries: extraction_config.extractor_retries,
            backoff_base_ms: extraction_config.extractor_backoff_base_ms,
            attempt_cap_secs: extraction_config.extractor_attempt_cap_secs,
        };
        Self {
            db,
            distribution,
            extractor,
            extraction_config,
            retry_policy,
        }
    }

    /// Processes one normalized chat event end to end. Never propagates extraction
    /// failures to the caller (§4.1 "Extraction never raises"); persistence failures are
    /// logged and abort the event with no distribution (§4.2 "Failure semantics").
    pub async fn process_event(&self, event: ChatEvent) {
        match self.process_event_inner(&event).await {
            Ok(Some(Outcome::Signal { chat_room_id, signal, post_time })) => {
                self.distribution
                    .distribute_signal(&signal, chat_room_id, post_time)
                    .await;
            }
            Ok(Some(Outcome::Reply { chat_room_id, reply })) => {
                self.distribution.distribute_reply(&reply, chat_room_id).await;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(
                    chat_external_id = %event.chat_external_id,
                    message_external_id = %event.message_external_id,
                    error = %err,
                    "event processing failed, aborting without distribution"
                );
            }
        }
    }

    async fn process_event_inner(
        &self,
        event: &ChatEvent,
    ) -> Result<Option<Outcome>, LifecycleError> {
        if !is_acceptable_length(&event.text) {
            return Err(LifecycleError::TextLengthOutOfBounds {
                min: crate::models::MESSAGE_TEXT_MIN_LEN,
                max: crate::models::MESSAGE_TEXT_MAX_LEN,
            });
        }

        let mut tx = self.db.begin().await?;

        let chat_room = tx
            .upsert_chat_room(&event.chat_external_id, ChatKind::Unknown, None, None)
            .await?;

        if !tx.chat_has_active_copy_setup(chat_room.id).await? {
            tx.commit().await?;
            return Ok(None);
        }

        let existing = tx
            .get_message_by_external_id(chat_room.id, &event.message_external_id)
            .await?;
        let state = message_state(existing.as_ref());

        let outcome = match (event.event_kind, state) {
            (EventKind::New, MessageState::None) | (EventKind::Edited, MessageState::None) => {
                self.handle_new_message(&mut tx, event, chat_room.id).await?
            }
            (EventKind::Edited, MessageState::SignalLinked) => {
                let message = existing.expect("SignalLinked implies an existing message");
                self.handle_signal_reextraction(&mut tx, event, chat_room.id, message)
                    .await?
            }
            (EventKind::Deleted, MessageState::SignalLinked) => {
                let message = existing.expect("SignalLinked implies an existing message");
                self.handle_deletion(&mut tx, chat_room.id, message).await?
            }
            _ => None,
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// §4.2.S / §4.2.R: a brand-new (or first-seen-edited) message either resolves as a
    /// reply to a signal-bearing message, or is run through signal extraction.
    async fn handle_new_message(
        &self,
        tx: &mut crate::db::DbTransaction<'_>,
        event: &ChatEvent,
        chat_room_id: i64,
    ) -> Result<Option<Outcome>, LifecycleError> {
        let message = tx
            .insert_message(chat_room_id, &event.message_external_id, &event.text, event.post_time)
            .await?;

        if let Some(reply_to_id) = &event.reply_to_external_id {
            let parent = tx
                .get_message_by_external_id(chat_room_id, reply_to_id)
                .await?
                .filter(|m| m.is_signal_linked());
            if let Some(parent) = parent {
                return self
                    .handle_reply(tx, chat_room_id, &message.text, parent, message.id)
                    .await;
            }
        }

        self.handle_signal_extraction(tx, &message.text, chat_room_id, message.id, event.post_time)
            .await
    }

    async fn handle_signal_extraction(
        &self,
        tx: &mut crate::db::DbTransaction<'_>,
        text: &str,
        chat_room_id: i64,
        message_id: i64,
        post_time: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<Outcome>, LifecycleError> {
        let setups = tx.copy_setups_for_chat_room(chat_room_id).await?;
        let allowed_symbols = tx.allowed_symbols_map_for_chat(chat_room_id).await?;
        let symbol_set: std::collections::HashSet<String> =
            allowed_symbols.keys().cloned().collect();
        let filter_params = aggregate_filter_params(&setups);

        let extraction_ctx = ExtractionContext {
            allowed_symbols: &symbol_set,
            synonym_to_canonical: &allowed_symbols,
            filter_params: &filter_params,
            max_exceptions_for_ai_extraction: self.extraction_config.max_exceptions_for_ai_extraction,
        };

        let fallback = self.fallback_pair();
        let result = extraction::extract_signal(text, &extraction_ctx, fallback).await;

        match result {
            ExtractionResult::Signal(extracted) => {
                let signal = tx.insert_signal(message_id, &extracted).await?;
                tx.link_message_to_signal(message_id, signal.id).await?;
                Ok(Some(Outcome::Signal {
                    chat_room_id,
                    signal,
                    post_time,
                }))
            }
            ExtractionResult::Reply(_) | ExtractionResult::NoMatch => Ok(None),
        }
    }

    /// §4.2 "edited, SIGNAL_LINKED": re-extract; on a new Signal, overwrite the existing
    /// row in place, preserving its identity.
    async fn handle_signal_reextraction(
        &self,
        tx: &mut crate::db::DbTransaction<'_>,
        event: &ChatEvent,
        chat_room_id: i64,
        message: crate::models::Message,
    ) -> Result<Option<Outcome>, LifecycleError> {
        tx.update_message_text(message.id, &event.text).await?;
        let signal_id = message.signal_id.expect("SignalLinked implies signal_id is set");

        let setups = tx.copy_setups_for_chat_room(chat_room_id).await?;
        let allowed_symbols = tx.allowed_symbols_map_for_chat(chat_room_id).await?;
        let symbol_set: std::collections::HashSet<String> =
            allowed_symbols.keys().cloned().collect();
        let filter_params = aggregate_filter_params(&setups);

        let extraction_ctx = ExtractionContext {
            allowed_symbols: &symbol_set,
            synonym_to_canonical: &allowed_symbols,
            filter_params: &filter_params,
            max_exceptions_for_ai_extraction: self.extraction_config.max_exceptions_for_ai_extraction,
        };

        let fallback = self.fallback_pair();
        let result = extraction::extract_signal(&event.text, &extraction_ctx, fallback).await;

        match result {
            ExtractionResult::Signal(extracted) => {
                tx.update_signal(signal_id, &extracted).await?;
                let signal = extracted.into_signal(signal_id, message.id);
                Ok(Some(Outcome::Signal {
                    chat_room_id,
                    signal,
                    post_time: event.post_time,
                }))
            }
            ExtractionResult::Reply(_) | ExtractionResult::NoMatch => Ok(None),
        }
    }

    /// §4.2.R: requires the reply resolves to a signal-bearing message. Runs the
    /// deterministic reply-action matcher against the original signal's context.
    async fn handle_reply(
        &self,
        tx: &mut crate::db::DbTransaction<'_>,
        chat_room_id: i64,
        text: &str,
        parent: crate::models::Message,
        message_id: i64,
    ) -> Result<Option<Outcome>, LifecycleError> {
        let original_signal_id = parent.signal_id.expect("filtered to signal-linked messages");

        let result = extraction::extract_reply_action(text);
        let action = match result {
            ExtractionResult::Reply(action) => action,
            _ => return Ok(None),
        };

        // The deterministic reply matcher only ever yields CLOSE/BREAKEVEN (§4.1); MODIFY_SL
        // is model-assisted only and not reached here, so `new_sl` is always absent.
        let reply = tx
            .insert_signal_reply(action, GeneratedBy::Reply, None, original_signal_id, None)
            .await?;
        tx.link_message_to_signal_reply(message_id, reply.id).await?;

        Ok(Some(Outcome::Reply { chat_room_id, reply }))
    }

    /// §4.2 "deleted, SIGNAL_LINKED": synthesize a CLOSE reply generated by the deletion
    /// itself, linked to both the original Signal and the deleted Message.
    async fn handle_deletion(
        &self,
        tx: &mut crate::db::DbTransaction<'_>,
        chat_room_id: i64,
        message: crate::models::Message,
    ) -> Result<Option<Outcome>, LifecycleError> {
        let Some(signal_id) = message.signal_id else {
            return Ok(None);
        };
        let reply = tx
            .insert_signal_reply(ReplyAction::Close, GeneratedBy::Delete, None, signal_id, None)
            .await?;
        tx.link_message_to_signal_reply(message.id, reply.id).await?;
        Ok(Some(Outcome::Reply { chat_room_id, reply }))
    }

    fn fallback_pair(&self) -> Option<(&dyn ExtractorClient, &RetryPolicy)> {
        self.extractor.as_deref().map(|client| (client, &self.retry_policy))
    }
}

/// Resolves the Open Question of how extraction-time price filtering should behave when
/// multiple CopySetups with different caps are attached to the same room: aggregates to
/// the most permissive caps across all of them, so the canonical Signal is not pre-
/// trimmed to one copy setup's caps before distribution re-applies each setup's own.
fn aggregate_filter_params(setups: &[CopySetup]) -> FilterParams {
    let max_entries = setups.iter().map(|s| s.config.max_entry_prices).max().unwrap_or(5);
    let max_tps = setups.iter().map(|s| s.config.max_tp_prices).max().unwrap_or(5);
    let ignore_invalid_prices = setups.iter().any(|s| s.config.ignore_invalid_prices);
    FilterParams {
        max_entries,
        max_tps,
        ignore_invalid_prices,
    }
}

fn message_state(message: Option<&crate::models::Message>) -> MessageState {
    match message {
        None => MessageState::None,
        Some(m) if m.signal_reply_id.is_some() => MessageState::ReplyLinked,
        Some(m) if m.signal_id.is_some() => MessageState::SignalLinked,
        Some(_) => MessageState::Bare,
    }
}

enum Outcome {
    Signal {
        chat_room_id: i64,
        signal: crate::models::Signal,
        post_time: chrono::DateTime<chrono::Utc>,
    },
    Reply {
        chat_room_id: i64,
        reply: crate::models::SignalReply,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_source::EventKind;
    use crate::models::CopySetupConfig;
    use crate::store::test_support::FakeQueueStore;
    use chrono::Utc;

    async fn processor_with_chat(chat_external_id: &str) -> (Arc<Database>, MessageLifecycleProcessor) {
        let db = Arc::new(Database::in_memory().await);
        let mut tx = db.begin().await.unwrap();
        let room = tx
            .upsert_chat_room(chat_external_id, ChatKind::Group, None, None)
            .await
            .unwrap();
        let mut config = CopySetupConfig::default();
        config.symbol_synonyms.insert(
            "EURUSD".to_string(),
            ["EURUSD".to_string()].into_iter().collect(),
        );
        tx.create_copy_setup("token-a", &config, &[room.id]).await.unwrap();
        tx.commit().await.unwrap();

        let queue_store = Arc::new(FakeQueueStore::new());
        let distribution = Arc::new(DistributionEngine::new(db.clone(), queue_store, 3600));
        let processor = MessageLifecycleProcessor::new(db.clone(), distribution, None, ExtractionConfig::default());
        (db, processor)
    }

    fn event(kind: EventKind, message_id: &str, text: &str, reply_to: Option<&str>) -> ChatEvent {
        ChatEvent {
            event_kind: kind,
            chat_external_id: "chat-1".to_string(),
            message_external_id: message_id.to_string(),
            text: text.to_string(),
            post_time: Utc::now(),
            reply_to_external_id: reply_to.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn new_signal_bearing_message_links_a_signal() {
        let (db, processor) = processor_with_chat("chat-1").await;
        processor
            .process_event(event(
                EventKind::New,
                "msg-1",
                "BUY EURUSD @ 1.10 TP 1.11 SL 1.09",
                None,
            ))
            .await;

        let mut tx = db.begin().await.unwrap();
        let message = tx
            .get_message_by_external_id(1, "msg-1")
            .await
            .unwrap()
            .expect("message persisted");
        assert!(message.is_signal_linked());
    }

    #[tokio::test]
    async fn deleting_a_signal_linked_message_synthesizes_a_close_reply() {
        let (db, processor) = processor_with_chat("chat-1").await;
        processor
            .process_event(event(
                EventKind::New,
                "msg-1",
                "BUY EURUSD @ 1.10 TP 1.11 SL 1.09",
                None,
            ))
            .await;
        processor
            .process_event(event(EventKind::Deleted, "msg-1", "deleted", None))
            .await;

        let mut tx = db.begin().await.unwrap();
        let message = tx
            .get_message_by_external_id(1, "msg-1")
            .await
            .unwrap()
            .expect("message persisted");
        assert!(message.signal_reply_id.is_some());
        let reply = tx
            .get_signal_reply(message.signal_reply_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.action, ReplyAction::Close);
        assert_eq!(reply.generated_by, GeneratedBy::Delete);
    }

    #[tokio::test]
    async fn reply_to_a_signal_bearing_message_links_a_reply() {
        let (db, processor) = processor_with_chat("chat-1").await;
        processor
            .process_event(event(
                EventKind::New,
                "msg-1",
                "BUY EURUSD @ 1.10 TP 1.11 SL 1.09",
                None,
            ))
            .await;
        processor
            .process_event(event(EventKind::New, "msg-2", "closing now", Some("msg-1")))
            .await;

        let mut tx = db.begin().await.unwrap();
        let reply_message = tx
            .get_message_by_external_id(1, "msg-2")
            .await
            .unwrap()
            .expect("reply message persisted");
        assert!(reply_message.signal_reply_id.is_some());
    }

    #[tokio::test]
    async fn chat_with_no_copy_setups_ignores_events() {
        let db = Arc::new(Database::in_memory().await);
        let queue_store = Arc::new(FakeQueueStore::new());
        let distribution = Arc::new(DistributionEngine::new(db.clone(), queue_store, 3600));
        let processor = MessageLifecycleProcessor::new(db.clone(), distribution, None, ExtractionConfig::default());

        processor
            .process_event(event(EventKind::New, "msg-1", "BUY EURUSD @ 1.10 TP 1.11 SL 1.09", None))
            .await;

        let mut tx = db.begin().await.unwrap();
        let message = tx.get_message_by_external_id(1, "msg-1").await.unwrap();
        assert!(message.is_none());
    }
}
