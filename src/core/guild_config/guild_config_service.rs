// Guild configuration service.
//
// Owns the in-memory view of every guild's config. Reads are served from a
// DashMap cache so the message hot path never touches disk after the first
// message in a guild. Writes go through `update`, which serializes mutations
// so two admins editing at once can't drop each other's change.

use super::guild_config_models::{GuildConfig, WhitelistKind};
use super::guild_config_store::{GuildConfigStore, StoreError};
use super::schema;
use dashmap::DashMap;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("ID {id} is already in the {kind} whitelist")]
    AlreadyWhitelisted { kind: WhitelistKind, id: u64 },
    #[error("ID {id} is not in the {kind} whitelist")]
    NotWhitelisted { kind: WhitelistKind, id: u64 },
}

pub struct GuildConfigService<S: GuildConfigStore> {
    store: S,
    cache: DashMap<u64, GuildConfig>,
    write_lock: Mutex<()>,
}

impl<S: GuildConfigStore> GuildConfigService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Snapshot of a guild's config.
    ///
    /// Never fails: unknown guilds get defaults and unreadable files are
    /// logged and replaced by defaults, so moderation keeps running.
    pub async fn get_config(&self, guild_id: u64) -> GuildConfig {
        if let Some(config) = self.cache.get(&guild_id) {
            return config.clone();
        }

        let (config, migrated) = self.load(guild_id).await;
        if migrated {
            let _guard = self.write_lock.lock().await;
            return self.settle_migrated(guild_id, config).await;
        }
        self.cache.entry(guild_id).or_insert(config).clone()
    }

    /// Same as `get_config`, for callers already holding `write_lock`.
    async fn get_config_locked(&self, guild_id: u64) -> GuildConfig {
        if let Some(config) = self.cache.get(&guild_id) {
            return config.clone();
        }

        let (config, migrated) = self.load(guild_id).await;
        if migrated {
            return self.settle_migrated(guild_id, config).await;
        }
        self.cache.entry(guild_id).or_insert(config).clone()
    }

    /// Returns the reconciled config and whether it differs from the file.
    async fn load(&self, guild_id: u64) -> (GuildConfig, bool) {
        let raw = match self.store.load_raw(guild_id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::info!(guild_id, "Creating new configuration for guild");
                return (GuildConfig::default(), false);
            }
            Err(e) => {
                tracing::error!(guild_id, "Failed to load guild config: {}", e);
                return (GuildConfig::default(), false);
            }
        };

        match schema::reconcile(raw) {
            Ok(reconciled) => (reconciled.config, reconciled.changed),
            Err(e) => {
                tracing::error!(guild_id, "Guild config is invalid, using defaults: {}", e);
                (GuildConfig::default(), false)
            }
        }
    }

    /// Write back a migrated config. Caller must hold `write_lock`.
    ///
    /// The file was read without the lock, so an `update` may have landed
    /// in the meantime; its cached value wins and nothing is written.
    async fn settle_migrated(&self, guild_id: u64, config: GuildConfig) -> GuildConfig {
        if let Some(current) = self.cache.get(&guild_id) {
            return current.clone();
        }

        tracing::info!(guild_id, "Guild configuration migrated and updated");
        if let Err(e) = self.store.save(guild_id, &config).await {
            tracing::warn!(guild_id, "Failed to persist migrated config: {}", e);
        }
        self.cache.insert(guild_id, config.clone());
        config
    }

    /// Replace a guild's config and persist it.
    #[allow(dead_code)] // Whole-document writes; commands go through `update`
    pub async fn save_config(&self, guild_id: u64, config: GuildConfig) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().await;
        self.persist(guild_id, config).await
    }

    async fn persist(&self, guild_id: u64, config: GuildConfig) -> Result<(), ConfigError> {
        self.store.save(guild_id, &config).await?;
        self.cache.insert(guild_id, config);
        Ok(())
    }

    /// Apply a mutation to a guild's config and persist the result.
    ///
    /// If `apply` fails nothing is written. Returns whatever `apply` returns
    /// alongside the updated config.
    pub async fn update<R, F>(&self, guild_id: u64, apply: F) -> Result<(R, GuildConfig), ConfigError>
    where
        F: FnOnce(&mut GuildConfig) -> Result<R, ConfigError> + Send,
        R: Send,
    {
        let _guard = self.write_lock.lock().await;

        let mut config = self.get_config_locked(guild_id).await;
        let result = apply(&mut config)?;
        self.persist(guild_id, config.clone()).await?;

        Ok((result, config))
    }

    /// Back up the current file, then restore defaults.
    /// Returns the backup location if there was a file to back up.
    pub async fn reset_config(&self, guild_id: u64) -> Result<Option<String>, ConfigError> {
        let _guard = self.write_lock.lock().await;

        let backup = self.store.backup(guild_id).await?;
        self.persist(guild_id, GuildConfig::default()).await?;
        tracing::info!(guild_id, ?backup, "Configuration reset to defaults");

        Ok(backup)
    }

    pub async fn backup_config(&self, guild_id: u64) -> Result<Option<String>, ConfigError> {
        let backup = self.store.backup(guild_id).await?;
        match &backup {
            Some(location) => tracing::info!(guild_id, "Configuration backed up to {}", location),
            None => tracing::warn!(guild_id, "No configuration file found to back up"),
        }
        Ok(backup)
    }

    /// Forget a guild entirely, e.g. after the bot is removed from it.
    pub async fn delete_config(&self, guild_id: u64) -> Result<bool, ConfigError> {
        let _guard = self.write_lock.lock().await;

        self.cache.remove(&guild_id);
        let existed = self.store.delete(guild_id).await?;
        if existed {
            tracing::info!(guild_id, "Deleted configuration for guild");
        }
        Ok(existed)
    }

    pub async fn configured_guilds(&self) -> Result<Vec<u64>, ConfigError> {
        Ok(self.store.configured_guilds().await?)
    }

    pub async fn whitelist_add(
        &self,
        guild_id: u64,
        kind: WhitelistKind,
        id: u64,
    ) -> Result<(), ConfigError> {
        self.update(guild_id, |config| {
            if !config.whitelist.entries_mut(kind).insert(id) {
                return Err(ConfigError::AlreadyWhitelisted { kind, id });
            }
            Ok(())
        })
        .await
        .map(|_| ())
    }

    pub async fn whitelist_remove(
        &self,
        guild_id: u64,
        kind: WhitelistKind,
        id: u64,
    ) -> Result<(), ConfigError> {
        self.update(guild_id, |config| {
            if !config.whitelist.entries_mut(kind).remove(&id) {
                return Err(ConfigError::NotWhitelisted { kind, id });
            }
            Ok(())
        })
        .await
        .map(|_| ())
    }

    /// Clear one list, or all three when `kind` is `None`.
    /// Returns how many entries were removed.
    pub async fn whitelist_clear(
        &self,
        guild_id: u64,
        kind: Option<WhitelistKind>,
    ) -> Result<usize, ConfigError> {
        let kinds: Vec<WhitelistKind> = match kind {
            Some(kind) => vec![kind],
            None => WhitelistKind::ALL.to_vec(),
        };

        self.update(guild_id, move |config| {
            let mut removed = 0;
            for kind in kinds {
                let entries = config.whitelist.entries_mut(kind);
                removed += entries.len();
                entries.clear();
            }
            Ok(removed)
        })
        .await
        .map(|(removed, _)| removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::guild_config::CURRENT_SCHEMA_VERSION;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// In-memory store for testing
    #[derive(Default)]
    struct MockConfigStore {
        docs: DashMap<u64, Value>,
        backups: DashMap<u64, Value>,
        saves: AtomicUsize,
        loads: AtomicUsize,
        /// Delay applied after the very first read, simulating slow disk
        first_load_delay: Option<Duration>,
    }

    #[async_trait]
    impl GuildConfigStore for MockConfigStore {
        async fn load_raw(&self, guild_id: u64) -> Result<Option<Value>, StoreError> {
            let doc = self.docs.get(&guild_id).map(|d| d.clone());
            if self.loads.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(delay) = self.first_load_delay {
                    tokio::time::sleep(delay).await;
                }
            }
            Ok(doc)
        }

        async fn save(&self, guild_id: u64, config: &GuildConfig) -> Result<(), StoreError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.docs.insert(guild_id, serde_json::to_value(config)?);
            Ok(())
        }

        async fn delete(&self, guild_id: u64) -> Result<bool, StoreError> {
            Ok(self.docs.remove(&guild_id).is_some())
        }

        async fn configured_guilds(&self) -> Result<Vec<u64>, StoreError> {
            let mut guilds: Vec<u64> = self.docs.iter().map(|e| *e.key()).collect();
            guilds.sort_unstable();
            Ok(guilds)
        }

        async fn backup(&self, guild_id: u64) -> Result<Option<String>, StoreError> {
            Ok(self.docs.get(&guild_id).map(|doc| {
                self.backups.insert(guild_id, doc.clone());
                format!("memory://{guild_id}")
            }))
        }
    }

    #[tokio::test]
    async fn test_unknown_guild_gets_defaults_without_saving() {
        let service = GuildConfigService::new(MockConfigStore::default());

        let config = service.get_config(1).await;

        assert_eq!(config, GuildConfig::default());
        assert_eq!(service.store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_partial_file_is_reconciled_and_persisted() {
        let store = MockConfigStore::default();
        store
            .docs
            .insert(5, json!({ "enabled": false, "rate_limit": { "enabled": false } }));
        let service = GuildConfigService::new(store);

        let config = service.get_config(5).await;

        assert!(!config.enabled);
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.rate_limit.max_actions_per_minute, 10);
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(service.store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_file_falls_back_to_defaults() {
        let store = MockConfigStore::default();
        store.docs.insert(5, json!({ "enabled": "maybe" }));
        let service = GuildConfigService::new(store);

        assert_eq!(service.get_config(5).await, GuildConfig::default());
    }

    #[tokio::test]
    async fn test_update_persists_and_caches() {
        let service = GuildConfigService::new(MockConfigStore::default());

        let (_, updated) = service
            .update(9, |config| {
                config.duplicate_detection.max_duplicates = 4;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(updated.duplicate_detection.max_duplicates, 4);
        assert_eq!(service.get_config(9).await.duplicate_detection.max_duplicates, 4);
        assert_eq!(service.configured_guilds().await.unwrap(), vec![9]);
    }

    #[tokio::test]
    async fn test_failed_update_writes_nothing() {
        let service = GuildConfigService::new(MockConfigStore::default());

        let result = service
            .whitelist_remove(9, WhitelistKind::Users, 123)
            .await;

        assert!(matches!(result, Err(ConfigError::NotWhitelisted { id: 123, .. })));
        assert_eq!(service.store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_whitelist_add_remove_clear() {
        let service = GuildConfigService::new(MockConfigStore::default());

        service.whitelist_add(1, WhitelistKind::Users, 10).await.unwrap();
        service.whitelist_add(1, WhitelistKind::Roles, 20).await.unwrap();
        service.whitelist_add(1, WhitelistKind::Channels, 30).await.unwrap();

        let duplicate = service.whitelist_add(1, WhitelistKind::Users, 10).await;
        assert!(matches!(duplicate, Err(ConfigError::AlreadyWhitelisted { .. })));

        service.whitelist_remove(1, WhitelistKind::Users, 10).await.unwrap();
        assert!(service.get_config(1).await.whitelist.users.is_empty());

        let removed = service.whitelist_clear(1, None).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(service.get_config(1).await.whitelist, Default::default());
    }

    #[tokio::test]
    async fn test_reset_backs_up_then_restores_defaults() {
        let service = GuildConfigService::new(MockConfigStore::default());
        service
            .update(3, |config| {
                config.enabled = false;
                Ok(())
            })
            .await
            .unwrap();

        let backup = service.reset_config(3).await.unwrap();

        assert_eq!(backup.as_deref(), Some("memory://3"));
        assert_eq!(service.store.backups.get(&3).unwrap()["enabled"], json!(false));
        assert!(service.get_config(3).await.enabled);
    }

    #[tokio::test]
    async fn test_delete_config_forgets_guild() {
        let service = GuildConfigService::new(MockConfigStore::default());
        service.save_config(4, GuildConfig::default()).await.unwrap();

        assert!(service.delete_config(4).await.unwrap());
        assert!(!service.delete_config(4).await.unwrap());
        assert!(service.configured_guilds().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_migrating_read_does_not_clobber_update() {
        let store = MockConfigStore {
            first_load_delay: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        // Partial document, so reading it triggers a migration write
        store.docs.insert(1, json!({ "enabled": true }));
        let service = Arc::new(GuildConfigService::new(store));

        let reader = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.get_config(1).await })
        };
        // Let the reader pick up the old document and park in the slow read
        tokio::time::sleep(Duration::from_millis(10)).await;

        service
            .update(1, |config| {
                config.duplicate_detection.max_duplicates = 7;
                Ok(())
            })
            .await
            .unwrap();

        let seen = reader.await.unwrap();

        assert_eq!(seen.duplicate_detection.max_duplicates, 7);
        assert_eq!(
            service.get_config(1).await.duplicate_detection.max_duplicates,
            7
        );
        let on_disk = service.store.docs.get(&1).unwrap().clone();
        assert_eq!(on_disk["duplicate_detection"]["max_duplicates"], json!(7));
    }
}
