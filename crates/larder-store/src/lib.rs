//! SQLite-backed mirror of published list state.
//!
//! The channel itself is the authoritative store; this mirror only
//! keeps the last successfully published list per channel so operators
//! can inspect it without a chat client. The runtime rewrites a
//! channel's rows wholesale after each publish — lists are small and
//! per-row mutation buys nothing.

use std::path::Path;
use std::sync::Mutex;

use chrono::DateTime;
use rusqlite::{params, Connection};
use thiserror::Error;

use larder_list::ListEntry;

#[derive(Debug, Error)]
/// Failures of the snapshot mirror.
pub enum StoreError {
    #[error("sqlite failure: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store mutex poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Snapshot mirror contract used by the runtime after each publish.
pub trait ListStore: Send + Sync {
    /// Replaces every row of `channel_id` with `entries`.
    fn replace_all(&self, channel_id: &str, entries: &[ListEntry]) -> StoreResult<()>;
    /// Loads the mirrored list for `channel_id`, ordered by position.
    fn load(&self, channel_id: &str) -> StoreResult<Vec<ListEntry>>;
    /// Drops every row of `channel_id`.
    fn clear(&self, channel_id: &str) -> StoreResult<()>;
}

/// SQLite implementation of [`ListStore`], schema created on open.
pub struct SqliteListStore {
    connection: Mutex<Connection>,
}

impl SqliteListStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let connection = Connection::open(path.as_ref())?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS list_items (
                channel_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                item TEXT NOT NULL,
                amount INTEGER NOT NULL,
                added_unix INTEGER NOT NULL,
                PRIMARY KEY (channel_id, position)
            );
            "#,
        )?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }
}

impl ListStore for SqliteListStore {
    fn replace_all(&self, channel_id: &str, entries: &[ListEntry]) -> StoreResult<()> {
        let mut connection = self.connection.lock().map_err(|_| StoreError::Poisoned)?;
        let transaction = connection.transaction()?;
        transaction.execute(
            "DELETE FROM list_items WHERE channel_id = ?1",
            params![channel_id],
        )?;
        for entry in entries {
            transaction.execute(
                "INSERT INTO list_items (channel_id, position, item, amount, added_unix) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    channel_id,
                    entry.position,
                    entry.name,
                    entry.quantity,
                    entry.added.and_utc().timestamp(),
                ],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }

    fn load(&self, channel_id: &str) -> StoreResult<Vec<ListEntry>> {
        let connection = self.connection.lock().map_err(|_| StoreError::Poisoned)?;
        let mut statement = connection.prepare(
            "SELECT position, item, amount, added_unix FROM list_items \
             WHERE channel_id = ?1 ORDER BY position",
        )?;
        let rows = statement.query_map(params![channel_id], |row| {
            let added_unix: i64 = row.get(3)?;
            Ok(ListEntry {
                position: row.get(0)?,
                name: row.get(1)?,
                quantity: row.get(2)?,
                added: DateTime::from_timestamp(added_unix, 0)
                    .map(|added| added.naive_utc())
                    .unwrap_or_default(),
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn clear(&self, channel_id: &str) -> StoreResult<()> {
        let connection = self.connection.lock().map_err(|_| StoreError::Poisoned)?;
        connection.execute(
            "DELETE FROM list_items WHERE channel_id = ?1",
            params![channel_id],
        )?;
        Ok(())
    }
}
