//! In-memory permission store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::application::errors::StorageError;
use crate::domain::entities::Override;
use crate::domain::traits::PermissionStore;

/// Overrides kept in memory, keyed by guild
#[derive(Default, Clone)]
pub struct MemoryPermissionStore {
    overrides: Arc<RwLock<HashMap<u64, Vec<Override>>>>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override, replacing any with the same subject, node and channel
    pub async fn add(&self, guild_id: u64, entry: Override) {
        let mut overrides = self.overrides.write().await;
        let guild = overrides.entry(guild_id).or_insert_with(Vec::new);
        guild.retain(|o| !(o.subject == entry.subject && o.node == entry.node && o.channel == entry.channel));
        guild.push(entry);
    }

    pub async fn clear(&self, guild_id: u64) {
        self.overrides.write().await.remove(&guild_id);
    }
}

#[async_trait]
impl PermissionStore for MemoryPermissionStore {
    async fn fetch_overrides(&self, guild_id: u64) -> Result<Vec<Override>, StorageError> {
        let overrides = self.overrides.read().await;
        Ok(overrides.get(&guild_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Subject;

    #[tokio::test]
    async fn test_add_replaces_same_key() {
        let store = MemoryPermissionStore::new();
        store.add(1, Override::grant(Subject::Role(5), "mod.ban")).await;
        store.add(1, Override::deny(Subject::Role(5), "mod.ban")).await;
        store.add(1, Override::grant(Subject::Role(5), "mod.ban").in_channel(9)).await;

        let overrides = store.fetch_overrides(1).await.unwrap();
        assert_eq!(overrides.len(), 2);
        assert!(overrides.iter().any(|o| !o.allow && o.channel.is_none()));
        assert!(store.fetch_overrides(2).await.unwrap().is_empty());

        store.clear(1).await;
        assert!(store.fetch_overrides(1).await.unwrap().is_empty());
    }
}
