//! SQLite-backed persistence for subscriptions and sweep watermarks.
//! One connection behind a mutex: writes to the same key are serialized and a
//! dispatch read always sees whole rows.

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use wallcast_core::error::{Result, WallcastError};
use wallcast_core::traits::{SubscriptionStore, WatermarkStore};
use wallcast_core::types::Subscription;

fn storage_err(e: impl std::fmt::Display) -> WallcastError {
    WallcastError::Storage(e.to_string())
}

/// SQLite store for all relay state.
pub struct SubscriptionDb {
    conn: Mutex<Connection>,
}

impl SubscriptionDb {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| storage_err(format!("DB open: {e}")))?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        tracing::info!("🗄️ Subscription database ready at {}", path.display());
        Ok(db)
    }

    /// Throwaway database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| storage_err(format!("DB open: {e}")))?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| storage_err(format!("DB lock poisoned: {e}")))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            -- One row per (source, chat); re-subscribing replaces the template
            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY,
                source_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL,
                message_template TEXT,
                UNIQUE (source_id, chat_id)
            );

            -- Sweep progress: last processed post per source
            CREATE TABLE IF NOT EXISTS watermarks (
                source_id INTEGER PRIMARY KEY,
                last_post_id INTEGER NOT NULL
            );
         ",
            )
            .map_err(|e| storage_err(format!("Migration: {e}")))?;
        Ok(())
    }

    /// Number of stored subscriptions across all sources.
    pub fn subscription_count(&self) -> Result<usize> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM subscriptions", [], |r| r.get(0))
            .map_err(storage_err)?;
        Ok(count as usize)
    }
}

#[async_trait]
impl SubscriptionStore for SubscriptionDb {
    async fn upsert(&self, source_id: i64, chat_id: i64, template: Option<&str>) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO subscriptions (source_id, chat_id, message_template)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (source_id, chat_id)
                 DO UPDATE SET message_template = excluded.message_template",
                params![source_id, chat_id, template],
            )
            .map_err(|e| storage_err(format!("Upsert subscription: {e}")))?;
        tracing::debug!("💾 Subscription saved: source={source_id} chat={chat_id}");
        Ok(())
    }

    async fn delete(&self, source_id: i64, chat_id: i64) -> Result<()> {
        let removed = self
            .lock()?
            .execute(
                "DELETE FROM subscriptions WHERE source_id = ?1 AND chat_id = ?2",
                params![source_id, chat_id],
            )
            .map_err(|e| storage_err(format!("Delete subscription: {e}")))?;
        tracing::debug!("🗑️ Subscription removed: source={source_id} chat={chat_id} rows={removed}");
        Ok(())
    }

    async fn list_by_source(&self, source_id: i64) -> Result<Vec<Subscription>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT source_id, chat_id, message_template FROM subscriptions WHERE source_id = ?1",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![source_id], |row| {
                Ok(Subscription {
                    source_id: row.get(0)?,
                    chat_id: row.get(1)?,
                    message_template: row.get(2)?,
                })
            })
            .map_err(storage_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage_err)
    }
}

#[async_trait]
impl WatermarkStore for SubscriptionDb {
    async fn load_watermark(&self, source_id: i64) -> Result<Option<i64>> {
        self.lock()?
            .query_row(
                "SELECT last_post_id FROM watermarks WHERE source_id = ?1",
                params![source_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)
    }

    async fn save_watermark(&self, source_id: i64, last_post_id: i64) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO watermarks (source_id, last_post_id) VALUES (?1, ?2)
                 ON CONFLICT (source_id)
                 DO UPDATE SET last_post_id = MAX(last_post_id, excluded.last_post_id)",
                params![source_id, last_post_id],
            )
            .map_err(|e| storage_err(format!("Save watermark: {e}")))?;
        Ok(())
    }
}
