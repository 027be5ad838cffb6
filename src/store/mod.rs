//! Session & pending-queue store (§4.4): a Redis-backed shared-memory layer for
//! low-latency CRUD across stateless API workers and the distribution engine.
//!
//! Grounded on the reference implementation's `RedisStore` (3-way session indexing,
//! pipelined transactional writes, SCAN+MGET batched reads, retry-with-backoff wrapper).

mod keys;

#[cfg(test)]
pub mod test_support;

pub use keys::KeyBuilder;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{error, warn};

use crate::config::QueueStoreConfig;
use crate::errors::StoreError;
use crate::models::{PendingKind, Session};
use crate::wire::{SignalReplyScheme, TradeScheme};

/// The queue-store query surface consumed by the distribution engine and the HTTP
/// polling handlers, decoupled from the Redis-backed implementation so both can be
/// exercised against an in-memory fake in tests.
#[async_trait]
pub trait PendingQueueStore: Send + Sync {
    async fn add_session(&self, session: &Session, ttl_secs: u64) -> Result<(), StoreError>;
    async fn update_session(
        &self,
        old_refresh_token: &str,
        new_session: &Session,
        ttl_secs: u64,
    ) -> Result<(), StoreError>;
    async fn delete_session(&self, refresh_token: &str) -> Result<bool, StoreError>;
    async fn get_session(&self, refresh_token: &str) -> Result<Option<Session>, StoreError>;
    async fn get_session_by_client(
        &self,
        client_instance_id: &str,
    ) -> Result<Option<Session>, StoreError>;
    async fn sessions_by_copy_setup(
        &self,
        copy_setup_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<Session>, StoreError>;
    async fn add_pending_trades(
        &self,
        client_instance_id: &str,
        trades: &[TradeScheme],
        ttl_secs: u64,
    ) -> Result<usize, StoreError>;
    async fn add_pending_signal_replies(
        &self,
        client_instance_id: &str,
        replies: &[SignalReplyScheme],
        ttl_secs: u64,
    ) -> Result<usize, StoreError>;
    async fn pending_trades(
        &self,
        client_instance_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<TradeScheme>, StoreError>;
    async fn pending_signal_replies(
        &self,
        client_instance_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SignalReplyScheme>, StoreError>;
    async fn delete_pending_trades(
        &self,
        client_instance_id: &str,
        trade_ids: &[i64],
    ) -> Result<u64, StoreError>;
    async fn delete_pending_signal_replies(
        &self,
        client_instance_id: &str,
        reply_ids: &[i64],
    ) -> Result<u64, StoreError>;
}

pub struct QueueStore {
    conn: ConnectionManager,
    keys: KeyBuilder,
    retries: u32,
    backoff_base_ms: u64,
    scan_count: u32,
    mget_batch: usize,
}

impl QueueStore {
    pub async fn connect(config: &QueueStoreConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            conn,
            keys: KeyBuilder::new(&config.namespace),
            retries: config.retries,
            backoff_base_ms: config.backoff_base_ms,
            scan_count: config.scan_count,
            mget_batch: config.mget_batch,
        })
    }

    /// Runs `op`, retrying transient redis errors up to `retries` times with exponential
    /// backoff `base * 2^(attempt-1) + jitter(0..=50ms)` (§4.4).
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.retries && is_transient(&e) => {
                    let backoff = self.backoff_base_ms.saturating_mul(1 << (attempt - 1));
                    let jitter = rand::thread_rng().gen_range(0..=50u64);
                    warn!(attempt, error = %e, "retrying queue store operation");
                    tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(error = %e, "queue store operation failed after retries");
                    return Err(StoreError::Operation(e.to_string()));
                }
            }
        }
    }

    // ---- Session operations ----

    /// Pipelined transactional write: primary record plus the two secondary indexes.
    pub async fn add_session(&self, session: &Session, ttl_secs: u64) -> Result<(), StoreError> {
        let payload = serde_json::to_string(session)?;
        let session_key = self.keys.session(&session.refresh_token);
        let client_key = self.keys.client_session(&session.client_instance_id);
        let copysetup_key = self.keys.copysetup_sessions(session.copy_setup_id);
        let refresh_token = session.refresh_token.clone();

        self.with_retry(|| {
            let mut conn = self.conn.clone();
            let session_key = session_key.clone();
            let client_key = client_key.clone();
            let copysetup_key = copysetup_key.clone();
            let payload = payload.clone();
            let refresh_token = refresh_token.clone();
            async move {
                redis::pipe()
                    .atomic()
                    .set_ex(&session_key, &payload, ttl_secs)
                    .set(&client_key, &refresh_token)
                    .sadd(&copysetup_key, &refresh_token)
                    .query_async(&mut conn)
                    .await
            }
        })
        .await
    }

    /// Rotates the session under one `MULTI`/`EXEC` (§4.4 Atomicity): removes the old
    /// primary record and its copy-setup-set membership, writes the new primary record,
    /// and repoints both secondary indexes, all in a single pipeline. The old refresh
    /// token must stop resolving a session atomically with the new one starting to
    /// (§4.5 `/poll` rotation contract); a swallowed delete error here would otherwise
    /// leave the rotated-out token valid.
    pub async fn update_session(
        &self,
        old_refresh_token: &str,
        new_session: &Session,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(new_session)?;
        let old_session_key = self.keys.session(old_refresh_token);
        let new_session_key = self.keys.session(&new_session.refresh_token);
        let client_key = self.keys.client_session(&new_session.client_instance_id);
        let copysetup_key = self.keys.copysetup_sessions(new_session.copy_setup_id);
        let old_refresh_token = old_refresh_token.to_string();
        let new_refresh_token = new_session.refresh_token.clone();

        self.with_retry(|| {
            let mut conn = self.conn.clone();
            let old_session_key = old_session_key.clone();
            let new_session_key = new_session_key.clone();
            let client_key = client_key.clone();
            let copysetup_key = copysetup_key.clone();
            let payload = payload.clone();
            let old_refresh_token = old_refresh_token.clone();
            let new_refresh_token = new_refresh_token.clone();
            async move {
                redis::pipe()
                    .atomic()
                    .del(&old_session_key)
                    .srem(&copysetup_key, &old_refresh_token)
                    .set_ex(&new_session_key, &payload, ttl_secs)
                    .set(&client_key, &new_refresh_token)
                    .sadd(&copysetup_key, &new_refresh_token)
                    .query_async::<()>(&mut conn)
                    .await
            }
        })
        .await
    }

    pub async fn delete_session(&self, refresh_token: &str) -> Result<bool, StoreError> {
        let Some(session) = self.get_session(refresh_token).await? else {
            return Ok(false);
        };
        let session_key = self.keys.session(refresh_token);
        let client_key = self.keys.client_session(&session.client_instance_id);
        let copysetup_key = self.keys.copysetup_sessions(session.copy_setup_id);
        let refresh_token = refresh_token.to_string();

        self.with_retry(|| {
            let mut conn = self.conn.clone();
            let session_key = session_key.clone();
            let client_key = client_key.clone();
            let copysetup_key = copysetup_key.clone();
            let refresh_token = refresh_token.clone();
            async move {
                redis::pipe()
                    .atomic()
                    .del(&session_key)
                    .del(&client_key)
                    .srem(&copysetup_key, &refresh_token)
                    .query_async::<()>(&mut conn)
                    .await
            }
        })
        .await?;
        Ok(true)
    }

    pub async fn get_session(&self, refresh_token: &str) -> Result<Option<Session>, StoreError> {
        let key = self.keys.session(refresh_token);
        let raw: Option<String> = self
            .with_retry(|| {
                let mut conn = self.conn.clone();
                let key = key.clone();
                async move { conn.get(&key).await }
            })
            .await?;
        Ok(parse_json(raw))
    }

    pub async fn get_session_by_client(
        &self,
        client_instance_id: &str,
    ) -> Result<Option<Session>, StoreError> {
        let key = self.keys.client_session(client_instance_id);
        let refresh_token: Option<String> = self
            .with_retry(|| {
                let mut conn = self.conn.clone();
                let key = key.clone();
                async move { conn.get(&key).await }
            })
            .await?;
        match refresh_token {
            Some(token) => self.get_session(&token).await,
            None => Ok(None),
        }
    }

    /// SMEMBERS + batched MGET (batch size `mget_batch`), per §4.4.
    pub async fn sessions_by_copy_setup(
        &self,
        copy_setup_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<Session>, StoreError> {
        let set_key = self.keys.copysetup_sessions(copy_setup_id);
        let tokens: Vec<String> = self
            .with_retry(|| {
                let mut conn = self.conn.clone();
                let set_key = set_key.clone();
                async move { conn.smembers(&set_key).await }
            })
            .await?;

        let mut sessions = Vec::new();
        for batch in tokens.chunks(self.mget_batch) {
            let session_keys: Vec<String> = batch.iter().map(|t| self.keys.session(t)).collect();
            let values: Vec<Option<String>> = self
                .with_retry(|| {
                    let mut conn = self.conn.clone();
                    let session_keys = session_keys.clone();
                    async move { conn.mget(&session_keys).await }
                })
                .await?;
            for raw in values {
                if let Some(session) = parse_json::<Session>(raw) {
                    sessions.push(session);
                    if let Some(limit) = limit {
                        if sessions.len() >= limit {
                            return Ok(sessions);
                        }
                    }
                }
            }
        }
        Ok(sessions)
    }

    // ---- Pending items ----

    pub async fn add_pending_trades(
        &self,
        client_instance_id: &str,
        trades: &[TradeScheme],
        ttl_secs: u64,
    ) -> Result<usize, StoreError> {
        self.add_pending_items(client_instance_id, PendingKind::Trade, trades, ttl_secs)
            .await
    }

    pub async fn add_pending_signal_replies(
        &self,
        client_instance_id: &str,
        replies: &[SignalReplyScheme],
        ttl_secs: u64,
    ) -> Result<usize, StoreError> {
        self.add_pending_items(client_instance_id, PendingKind::SignalReply, replies, ttl_secs)
            .await
    }

    /// Non-transactional pipelined batch SET-EX: per-item atomicity suffices (§4.4).
    async fn add_pending_items<T: serde::Serialize + HasId>(
        &self,
        client_instance_id: &str,
        kind: PendingKind,
        items: &[T],
        ttl_secs: u64,
    ) -> Result<usize, StoreError> {
        if items.is_empty() {
            return Ok(0);
        }
        let mut entries = Vec::with_capacity(items.len());
        for item in items {
            let Some(id) = item.id() else {
                warn!("skipping pending item with no id");
                continue;
            };
            let key = self.keys.pending_item(client_instance_id, kind, id);
            let payload = serde_json::to_string(item)?;
            entries.push((key, payload));
        }
        let count = entries.len();

        self.with_retry(|| {
            let mut conn = self.conn.clone();
            let entries = entries.clone();
            async move {
                let mut pipe = redis::pipe();
                for (key, payload) in &entries {
                    pipe.set_ex(key, payload, ttl_secs);
                }
                pipe.query_async::<()>(&mut conn).await
            }
        })
        .await?;
        Ok(count)
    }

    /// Cursor-based SCAN (count `scan_count`) + batched MGET. Order is unspecified.
    pub async fn pending_trades(
        &self,
        client_instance_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<TradeScheme>, StoreError> {
        self.scan_pending(client_instance_id, PendingKind::Trade, limit)
            .await
    }

    pub async fn pending_signal_replies(
        &self,
        client_instance_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SignalReplyScheme>, StoreError> {
        self.scan_pending(client_instance_id, PendingKind::SignalReply, limit)
            .await
    }

    async fn scan_pending<T: serde::de::DeserializeOwned>(
        &self,
        client_instance_id: &str,
        kind: PendingKind,
        limit: Option<usize>,
    ) -> Result<Vec<T>, StoreError> {
        let pattern = self.keys.pending_scan_pattern(client_instance_id, kind);
        let mut out = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let scan_count = self.scan_count;
            let (next_cursor, keys): (u64, Vec<String>) = self
                .with_retry(|| {
                    let mut conn = self.conn.clone();
                    let pattern = pattern.clone();
                    async move {
                        redis::cmd("SCAN")
                            .cursor_arg(cursor)
                            .arg("MATCH")
                            .arg(&pattern)
                            .arg("COUNT")
                            .arg(scan_count)
                            .query_async(&mut conn)
                            .await
                    }
                })
                .await?;

            for batch in keys.chunks(self.mget_batch) {
                let values: Vec<Option<String>> = self
                    .with_retry(|| {
                        let mut conn = self.conn.clone();
                        let batch = batch.to_vec();
                        async move { conn.mget(&batch).await }
                    })
                    .await?;
                for raw in values {
                    if let Some(item) = parse_json::<T>(raw) {
                        out.push(item);
                        if let Some(limit) = limit {
                            if out.len() >= limit {
                                return Ok(out);
                            }
                        }
                    }
                }
            }

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(out)
    }

    pub async fn delete_pending_trades(
        &self,
        client_instance_id: &str,
        trade_ids: &[i64],
    ) -> Result<u64, StoreError> {
        self.delete_pending(client_instance_id, PendingKind::Trade, trade_ids)
            .await
    }

    pub async fn delete_pending_signal_replies(
        &self,
        client_instance_id: &str,
        reply_ids: &[i64],
    ) -> Result<u64, StoreError> {
        self.delete_pending(client_instance_id, PendingKind::SignalReply, reply_ids)
            .await
    }

    async fn delete_pending(
        &self,
        client_instance_id: &str,
        kind: PendingKind,
        ids: &[i64],
    ) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let keys: Vec<String> = ids
            .iter()
            .map(|id| self.keys.pending_item(client_instance_id, kind, *id))
            .collect();
        self.with_retry(|| {
            let mut conn = self.conn.clone();
            let keys = keys.clone();
            async move { conn.del(&keys).await }
        })
        .await
    }
}

#[async_trait]
impl PendingQueueStore for QueueStore {
    async fn add_session(&self, session: &Session, ttl_secs: u64) -> Result<(), StoreError> {
        QueueStore::add_session(self, session, ttl_secs).await
    }

    async fn update_session(
        &self,
        old_refresh_token: &str,
        new_session: &Session,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        QueueStore::update_session(self, old_refresh_token, new_session, ttl_secs).await
    }

    async fn delete_session(&self, refresh_token: &str) -> Result<bool, StoreError> {
        QueueStore::delete_session(self, refresh_token).await
    }

    async fn get_session(&self, refresh_token: &str) -> Result<Option<Session>, StoreError> {
        QueueStore::get_session(self, refresh_token).await
    }

    async fn get_session_by_client(
        &self,
        client_instance_id: &str,
    ) -> Result<Option<Session>, StoreError> {
        QueueStore::get_session_by_client(self, client_instance_id).await
    }

    async fn sessions_by_copy_setup(
        &self,
        copy_setup_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<Session>, StoreError> {
        QueueStore::sessions_by_copy_setup(self, copy_setup_id, limit).await
    }

    async fn add_pending_trades(
        &self,
        client_instance_id: &str,
        trades: &[TradeScheme],
        ttl_secs: u64,
    ) -> Result<usize, StoreError> {
        QueueStore::add_pending_trades(self, client_instance_id, trades, ttl_secs).await
    }

    async fn add_pending_signal_replies(
        &self,
        client_instance_id: &str,
        replies: &[SignalReplyScheme],
        ttl_secs: u64,
    ) -> Result<usize, StoreError> {
        QueueStore::add_pending_signal_replies(self, client_instance_id, replies, ttl_secs).await
    }

    async fn pending_trades(
        &self,
        client_instance_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<TradeScheme>, StoreError> {
        QueueStore::pending_trades(self, client_instance_id, limit).await
    }

    async fn pending_signal_replies(
        &self,
        client_instance_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SignalReplyScheme>, StoreError> {
        QueueStore::pending_signal_replies(self, client_instance_id, limit).await
    }

    async fn delete_pending_trades(
        &self,
        client_instance_id: &str,
        trade_ids: &[i64],
    ) -> Result<u64, StoreError> {
        QueueStore::delete_pending_trades(self, client_instance_id, trade_ids).await
    }

    async fn delete_pending_signal_replies(
        &self,
        client_instance_id: &str,
        reply_ids: &[i64],
    ) -> Result<u64, StoreError> {
        QueueStore::delete_pending_signal_replies(self, client_instance_id, reply_ids).await
    }
}

trait HasId {
    fn id(&self) -> Option<i64>;
}

impl HasId for TradeScheme {
    fn id(&self) -> Option<i64> {
        self.id
    }
}

impl HasId for SignalReplyScheme {
    fn id(&self) -> Option<i64> {
        Some(self.id)
    }
}

/// Connection/timeout errors are retried (§4.4); malformed commands and auth failures
/// are not.
fn is_transient(e: &redis::RedisError) -> bool {
    e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "failed to parse stored JSON payload");
            None
        }
    }
}
