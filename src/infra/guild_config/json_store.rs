// JSON-file guild config store.
//
// Layout under the data directory:
//   configs/<guild_id>.json                      one file per guild
//   backups/<guild_id>.backup.<timestamp>.json   copies made before resets

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::fs;

use crate::core::guild_config::{GuildConfig, GuildConfigStore, StoreError};

pub struct JsonGuildConfigStore {
    config_dir: PathBuf,
    backup_dir: PathBuf,
}

impl JsonGuildConfigStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            config_dir: data_dir.join("configs"),
            backup_dir: data_dir.join("backups"),
        }
    }

    fn config_path(&self, guild_id: u64) -> PathBuf {
        self.config_dir.join(format!("{guild_id}.json"))
    }
}

#[async_trait]
impl GuildConfigStore for JsonGuildConfigStore {
    async fn load_raw(&self, guild_id: u64) -> Result<Option<Value>, StoreError> {
        let path = self.config_path(guild_id);
        if !path.exists() {
            return Ok(None);
        }

        let text = fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn save(&self, guild_id: u64, config: &GuildConfig) -> Result<(), StoreError> {
        fs::create_dir_all(&self.config_dir).await?;

        let text = serde_json::to_string_pretty(config)?;
        fs::write(self.config_path(guild_id), text).await?;
        Ok(())
    }

    async fn delete(&self, guild_id: u64) -> Result<bool, StoreError> {
        let path = self.config_path(guild_id);
        if !path.exists() {
            return Ok(false);
        }

        fs::remove_file(path).await?;
        Ok(true)
    }

    async fn configured_guilds(&self) -> Result<Vec<u64>, StoreError> {
        if !self.config_dir.exists() {
            return Ok(Vec::new());
        }

        let mut guilds = Vec::new();
        let mut entries = fs::read_dir(&self.config_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            // Anything that isn't named after a snowflake isn't ours
            if let Some(guild_id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                guilds.push(guild_id);
            }
        }

        guilds.sort_unstable();
        Ok(guilds)
    }

    async fn backup(&self, guild_id: u64) -> Result<Option<String>, StoreError> {
        let source = self.config_path(guild_id);
        if !source.exists() {
            return Ok(None);
        }

        fs::create_dir_all(&self.backup_dir).await?;
        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
        let target = self
            .backup_dir
            .join(format!("{guild_id}.backup.{timestamp}.json"));

        fs::copy(&source, &target).await?;
        Ok(Some(target.display().to_string()))
    }
}
