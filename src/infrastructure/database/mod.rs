//! SQLite-backed permission store

use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::application::errors::StorageError;
use crate::domain::entities::{Override, Subject};
use crate::domain::traits::PermissionStore;

/// Permission overrides stored in a SQLite database
pub struct SqlitePermissionStore {
    conn: Mutex<Connection>,
}

impl SqlitePermissionStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        let store = Self { conn: Mutex::new(conn) };
        store.init_tables()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Internal("Lock poisoned".to_string()))
    }

    fn init_tables(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS permission_overrides (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id INTEGER NOT NULL,
                subject_kind TEXT NOT NULL,
                subject_id INTEGER NOT NULL,
                node TEXT NOT NULL,
                channel_id INTEGER,
                allow INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_overrides_guild ON permission_overrides(guild_id)",
            [],
        )?;

        Ok(())
    }

    /// Insert or replace the override for (subject, node, channel) in a guild
    pub fn set_override(&self, guild_id: u64, entry: &Override) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM permission_overrides
             WHERE guild_id = ?1 AND subject_kind = ?2 AND subject_id = ?3 AND node = ?4 AND channel_id IS ?5",
            params![
                guild_id as i64,
                entry.subject.kind(),
                entry.subject.id() as i64,
                entry.node,
                entry.channel.map(|c| c as i64)
            ],
        )?;
        tx.execute(
            "INSERT INTO permission_overrides (guild_id, subject_kind, subject_id, node, channel_id, allow)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                guild_id as i64,
                entry.subject.kind(),
                entry.subject.id() as i64,
                entry.node,
                entry.channel.map(|c| c as i64),
                entry.allow
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn remove_override(
        &self,
        guild_id: u64,
        subject: Subject,
        node: &str,
        channel: Option<u64>,
    ) -> Result<bool, StorageError> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM permission_overrides
             WHERE guild_id = ?1 AND subject_kind = ?2 AND subject_id = ?3 AND node = ?4 AND channel_id IS ?5",
            params![
                guild_id as i64,
                subject.kind(),
                subject.id() as i64,
                node,
                channel.map(|c| c as i64)
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn list_overrides(&self, guild_id: u64) -> Result<Vec<Override>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT subject_kind, subject_id, node, channel_id, allow
             FROM permission_overrides WHERE guild_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map([guild_id as i64], |row| {
            let kind: String = row.get(0)?;
            let subject_id: i64 = row.get(1)?;
            let channel: Option<i64> = row.get(3)?;
            Ok((kind, subject_id as u64, row.get::<_, String>(2)?, channel.map(|c| c as u64), row.get::<_, bool>(4)?))
        })?;

        let mut overrides = Vec::new();
        for row in rows {
            let (kind, subject_id, node, channel, allow) = row?;
            let subject = match kind.as_str() {
                "user" => Subject::User(subject_id),
                "role" => Subject::Role(subject_id),
                other => {
                    tracing::warn!("Skipping override with unknown subject kind '{}'", other);
                    continue;
                }
            };
            overrides.push(Override {
                subject,
                node,
                channel,
                allow,
            });
        }
        Ok(overrides)
    }
}

#[async_trait]
impl PermissionStore for SqlitePermissionStore {
    async fn fetch_overrides(&self, guild_id: u64) -> Result<Vec<Override>, StorageError> {
        self.list_overrides(guild_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_and_remove_deletes() {
        let store = SqlitePermissionStore::in_memory().unwrap();
        let guild = 10;

        store.set_override(guild, &Override::grant(Subject::Role(3), "mod.ban")).unwrap();
        store.set_override(guild, &Override::deny(Subject::Role(3), "mod.ban")).unwrap();
        store
            .set_override(guild, &Override::grant(Subject::Role(3), "mod.ban").in_channel(77))
            .unwrap();
        store.set_override(guild + 1, &Override::grant(Subject::User(4), "*")).unwrap();

        let overrides = store.list_overrides(guild).unwrap();
        assert_eq!(
            overrides,
            vec![
                Override::deny(Subject::Role(3), "mod.ban"),
                Override::grant(Subject::Role(3), "mod.ban").in_channel(77),
            ]
        );

        assert!(store.remove_override(guild, Subject::Role(3), "mod.ban", None).unwrap());
        assert!(!store.remove_override(guild, Subject::Role(3), "mod.ban", None).unwrap());
        assert_eq!(store.list_overrides(guild).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_overrides_through_trait() {
        let store = SqlitePermissionStore::in_memory().unwrap();
        store.set_override(1, &Override::grant(Subject::User(2), "fun.*")).unwrap();

        let overrides = store.fetch_overrides(1).await.unwrap();
        assert_eq!(overrides, vec![Override::grant(Subject::User(2), "fun.*")]);
        assert!(store.fetch_overrides(99).await.unwrap().is_empty());
    }
}
