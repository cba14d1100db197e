// Process-wide settings read from the environment (and `.env`, if present).
//
// Per-guild behaviour lives in `configs/<guild_id>.json`; this only covers
// what has to be known before the bot connects.

use crate::core::moderation::RateLimitScope;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30 * 60;
const DEFAULT_SWEEP_WINDOW_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub discord_token: String,
    pub data_dir: PathBuf,
    /// How often the duplicate cache is swept
    pub sweep_interval: Duration,
    /// Sightings older than this are dropped by the sweep, unless the
    /// guild that recorded them uses a longer window
    pub sweep_window: chrono::Duration,
    pub rate_limit_scope: RateLimitScope,
    /// Register commands in this guild only, for instant updates while developing
    pub dev_guild_id: Option<u64>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let discord_token = lookup("DISCORD_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .context(
                "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
            )?;

        let data_dir = lookup("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let sweep_interval_secs = match lookup("CACHE_SWEEP_INTERVAL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .with_context(|| format!("CACHE_SWEEP_INTERVAL_SECS must be a positive integer, got {raw:?}"))?,
            None => DEFAULT_SWEEP_INTERVAL_SECS,
        };

        let sweep_window_ms = match lookup("CACHE_SWEEP_WINDOW_MS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|ms| *ms > 0)
                .with_context(|| format!("CACHE_SWEEP_WINDOW_MS must be a positive integer, got {raw:?}"))?,
            None => DEFAULT_SWEEP_WINDOW_MS,
        };

        let rate_limit_scope = match lookup("RATE_LIMIT_SCOPE") {
            Some(raw) => raw
                .parse::<RateLimitScope>()
                .map_err(anyhow::Error::msg)
                .context("Invalid RATE_LIMIT_SCOPE")?,
            None => RateLimitScope::default(),
        };

        let dev_guild_id = match lookup("DEV_GUILD_ID") {
            Some(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("DEV_GUILD_ID must be a guild ID, got {raw:?}"))?,
            ),
            _ => None,
        };

        Ok(Self {
            discord_token,
            data_dir,
            sweep_interval: Duration::from_secs(sweep_interval_secs),
            sweep_window: chrono::Duration::milliseconds(sweep_window_ms),
            rate_limit_scope,
            dev_guild_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DISCORD_TOKEN", "abc")]).unwrap();

        assert_eq!(config.discord_token, "abc");
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.sweep_interval, Duration::from_secs(1800));
        assert_eq!(config.sweep_window, chrono::Duration::minutes(5));
        assert_eq!(config.rate_limit_scope, RateLimitScope::Global);
        assert_eq!(config.dev_guild_id, None);
    }

    #[test]
    fn test_token_is_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DISCORD_TOKEN", "abc"),
            ("DATA_DIR", "/var/lib/removedupe"),
            ("CACHE_SWEEP_INTERVAL_SECS", "60"),
            ("CACHE_SWEEP_WINDOW_MS", "120000"),
            ("RATE_LIMIT_SCOPE", "guild"),
            ("DEV_GUILD_ID", "1234"),
        ])
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/removedupe"));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.sweep_window, chrono::Duration::minutes(2));
        assert_eq!(config.rate_limit_scope, RateLimitScope::PerGuild);
        assert_eq!(config.dev_guild_id, Some(1234));
    }

    #[test]
    fn test_bad_numbers_are_rejected() {
        assert!(load(&[("DISCORD_TOKEN", "a"), ("CACHE_SWEEP_INTERVAL_SECS", "0")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "a"), ("CACHE_SWEEP_WINDOW_MS", "soon")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "a"), ("RATE_LIMIT_SCOPE", "cluster")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "a"), ("DEV_GUILD_ID", "x")]).is_err());
    }
}
