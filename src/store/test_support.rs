//! An in-memory `PendingQueueStore` fake, standing in for Redis in lifecycle,
//! distribution, and HTTP handler tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::PendingQueueStore;
use crate::errors::StoreError;
use crate::models::Session;
use crate::wire::{SignalReplyScheme, TradeScheme};

#[derive(Default)]
pub struct FakeQueueStore {
    sessions_by_token: Mutex<HashMap<String, Session>>,
    trades: Mutex<HashMap<String, Vec<TradeScheme>>>,
    replies: Mutex<HashMap<String, Vec<SignalReplyScheme>>>,
}

impl FakeQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingQueueStore for FakeQueueStore {
    async fn add_session(&self, session: &Session, _ttl_secs: u64) -> Result<(), StoreError> {
        self.sessions_by_token
            .lock()
            .unwrap()
            .insert(session.refresh_token.clone(), session.clone());
        Ok(())
    }

    async fn update_session(
        &self,
        old_refresh_token: &str,
        new_session: &Session,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        self.sessions_by_token.lock().unwrap().remove(old_refresh_token);
        self.add_session(new_session, ttl_secs).await
    }

    async fn delete_session(&self, refresh_token: &str) -> Result<bool, StoreError> {
        Ok(self.sessions_by_token.lock().unwrap().remove(refresh_token).is_some())
    }

    async fn get_session(&self, refresh_token: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions_by_token.lock().unwrap().get(refresh_token).cloned())
    }

    async fn get_session_by_client(
        &self,
        client_instance_id: &str,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .sessions_by_token
            .lock()
            .unwrap()
            .values()
            .find(|s| s.client_instance_id == client_instance_id)
            .cloned())
    }

    async fn sessions_by_copy_setup(
        &self,
        copy_setup_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<Session>, StoreError> {
        let mut matches: Vec<Session> = self
            .sessions_by_token
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.copy_setup_id == copy_setup_id)
            .cloned()
            .collect();
        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    async fn add_pending_trades(
        &self,
        client_instance_id: &str,
        trades: &[TradeScheme],
        _ttl_secs: u64,
    ) -> Result<usize, StoreError> {
        self.trades
            .lock()
            .unwrap()
            .entry(client_instance_id.to_string())
            .or_default()
            .extend_from_slice(trades);
        Ok(trades.len())
    }

    async fn add_pending_signal_replies(
        &self,
        client_instance_id: &str,
        replies: &[SignalReplyScheme],
        _ttl_secs: u64,
    ) -> Result<usize, StoreError> {
        self.replies
            .lock()
            .unwrap()
            .entry(client_instance_id.to_string())
            .or_default()
            .extend_from_slice(replies);
        Ok(replies.len())
    }

    async fn pending_trades(
        &self,
        client_instance_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<TradeScheme>, StoreError> {
        let mut items = self
            .trades
            .lock()
            .unwrap()
            .get(client_instance_id)
            .cloned()
            .unwrap_or_default();
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn pending_signal_replies(
        &self,
        client_instance_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SignalReplyScheme>, StoreError> {
        let mut items = self
            .replies
            .lock()
            .unwrap()
            .get(client_instance_id)
            .cloned()
            .unwrap_or_default();
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn delete_pending_trades(
        &self,
        client_instance_id: &str,
        trade_ids: &[i64],
    ) -> Result<u64, StoreError> {
        let mut guard = self.trades.lock().unwrap();
        let Some(items) = guard.get_mut(client_instance_id) else {
            return Ok(0);
        };
        let before = items.len();
        items.retain(|t| t.id.map(|id| !trade_ids.contains(&id)).unwrap_or(true));
        Ok((before - items.len()) as u64)
    }

    async fn delete_pending_signal_replies(
        &self,
        client_instance_id: &str,
        reply_ids: &[i64],
    ) -> Result<u64, StoreError> {
        let mut guard = self.replies.lock().unwrap();
        let Some(items) = guard.get_mut(client_instance_id) else {
            return Ok(0);
        };
        let before = items.len();
        items.retain(|r| !reply_ids.contains(&r.id));
        Ok((before - items.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(token: &str, copy_setup_id: i64) -> Session {
        Session {
            refresh_token: token.to_string(),
            client_instance_id: format!("client-{token}"),
            copy_setup_id,
            client_ip: "127.0.0.1".to_string(),
            poll_interval: 5,
        }
    }

    #[tokio::test]
    async fn sessions_by_copy_setup_filters_correctly() {
        let store = FakeQueueStore::new();
        store.add_session(&session("a", 1), 60).await.unwrap();
        store.add_session(&session("b", 2), 60).await.unwrap();
        let matches = store.sessions_by_copy_setup(1, None).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].refresh_token, "a");
    }

    #[tokio::test]
    async fn pending_trades_round_trip_and_ack_deletes() {
        let store = FakeQueueStore::new();
        let trade = TradeScheme {
            id: Some(1),
            signal_id: 10,
            ticket: None,
            symbol: Some("EURUSD".to_string()),
            trade_type: Some("BUY".to_string()),
            entry_price: Some(1.10),
            open_price: None,
            sl_price: Some(1.09),
            tp_price: Some(1.11),
            modified_sl: None,
            close_price: None,
            current_price: None,
            open_datetime: None,
            close_datetime: None,
            signal_post_datetime: None,
            state: "PENDING_QUEUE".to_string(),
            signal_tps_idx: Some(0),
            signal_entries_idx: Some(0),
            close_reason: None,
            expire_reason: None,
            volume: None,
            pnl: None,
            swap: None,
            commission: None,
            fee: None,
            comment: None,
            magic: None,
        };
        store.add_pending_trades("client-1", &[trade], 60).await.unwrap();
        let fetched = store.pending_trades("client-1", None).await.unwrap();
        assert_eq!(fetched.len(), 1);

        let deleted = store.delete_pending_trades("client-1", &[1]).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.pending_trades("client-1", None).await.unwrap().is_empty());
    }
}
