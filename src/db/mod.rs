//! The durable relational repository (§1, §5 "Shared-resource policy"): a single
//! `sqlx::SqlitePool`-backed singleton exposing the transactional query surface the
//! lifecycle processor and distribution engine need. Its on-disk format is not this
//! crate's concern (§1 Non-goals); the query surface above is.
//!
//! All writes for one chat event happen through one [`DbTransaction`] (§4.2
//! "Transactionality"); readers that don't need transactional isolation can also go
//! through a transaction since sqlite has no separate pooled-connection read path that
//! matters here.

mod chat_rooms;
mod copy_setups;
mod messages;
mod signals;
mod trade_candidates;

#[cfg(test)]
mod tests;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

use crate::errors::RepositoryError;

/// Process-scoped singleton owning the single connection pool (§5 "Shared-resource
/// policy"). Constructed once in `main` and handed down via `AppContext`.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> Result<Self, RepositoryError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .test_before_acquire(true)
            .max_lifetime(std::time::Duration::from_secs(30 * 60))
            .connect(url)
            .await?;
        let db = Self { pool };
        db.create_tables().await?;
        Ok(db)
    }

    async fn create_tables(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_rooms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_chat_id TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                title TEXT,
                handle TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_room_id INTEGER NOT NULL REFERENCES chat_rooms(id),
                external_message_id TEXT NOT NULL,
                text TEXT NOT NULL,
                post_time TEXT NOT NULL,
                signal_id INTEGER,
                signal_reply_id INTEGER,
                UNIQUE (chat_room_id, external_message_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL UNIQUE REFERENCES messages(id),
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entries TEXT NOT NULL,
                tps TEXT NOT NULL,
                sl REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signal_replies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action TEXT NOT NULL,
                generated_by TEXT NOT NULL,
                info_message TEXT,
                original_signal_id INTEGER NOT NULL REFERENCES signals(id),
                new_sl REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS copy_setups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT NOT NULL UNIQUE,
                active INTEGER NOT NULL DEFAULT 1,
                config TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS copy_setup_chat_rooms (
                copy_setup_id INTEGER NOT NULL REFERENCES copy_setups(id),
                chat_room_id INTEGER NOT NULL REFERENCES chat_rooms(id),
                PRIMARY KEY (copy_setup_id, chat_room_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_copy_setup_chat_rooms_chat
             ON copy_setup_chat_rooms(chat_room_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trade_candidates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                signal_id INTEGER NOT NULL REFERENCES signals(id),
                copy_setup_id INTEGER NOT NULL REFERENCES copy_setups(id),
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price REAL NOT NULL,
                tp_price REAL NOT NULL,
                sl_price REAL NOT NULL,
                entries_idx INTEGER NOT NULL,
                tps_idx INTEGER NOT NULL,
                state TEXT NOT NULL,
                signal_post_datetime TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_trade_candidates_signal
             ON trade_candidates(signal_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Opens one repository transaction. The lifecycle processor holds at most one of
    /// these open across suspension points and never overlaps it with a queue-store call
    /// (§5 "Suspension points").
    pub async fn begin(&self) -> Result<DbTransaction<'_>, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(DbTransaction { tx })
    }

    #[cfg(test)]
    pub async fn in_memory() -> Self {
        Self::connect("sqlite::memory:").await.expect("in-memory db")
    }
}

/// One repository transaction. All entity operations for a single chat event flow
/// through the same instance; `commit`/`rollback` consume it.
pub struct DbTransaction<'c> {
    tx: Transaction<'c, Sqlite>,
}

impl<'c> DbTransaction<'c> {
    pub async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
