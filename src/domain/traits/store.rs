use async_trait::async_trait;
use crate::application::errors::StorageError;
use crate::domain::entities::Override;

/// Permission store - abstraction over the per-guild override records
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Every override stored for a guild
    async fn fetch_overrides(&self, guild_id: u64) -> Result<Vec<Override>, StorageError>;
}
