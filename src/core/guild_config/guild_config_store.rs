use super::guild_config_models::GuildConfig;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence port for guild configuration.
///
/// Loads hand back raw JSON so that reconciliation stays in the core and
/// every backend gets the same migration behaviour.
#[async_trait]
pub trait GuildConfigStore: Send + Sync {
    /// The stored document for a guild, or `None` if it was never saved.
    async fn load_raw(&self, guild_id: u64) -> Result<Option<Value>, StoreError>;
    async fn save(&self, guild_id: u64, config: &GuildConfig) -> Result<(), StoreError>;
    /// Returns whether anything was deleted.
    async fn delete(&self, guild_id: u64) -> Result<bool, StoreError>;
    async fn configured_guilds(&self) -> Result<Vec<u64>, StoreError>;
    /// Copy the stored document aside. Returns a location for humans, or
    /// `None` when there was nothing to back up.
    async fn backup(&self, guild_id: u64) -> Result<Option<String>, StoreError>;
}
