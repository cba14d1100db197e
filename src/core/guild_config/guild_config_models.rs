// Per-guild configuration model.
//
// This is what admins edit through slash commands and what gets written to
// `configs/<guild_id>.json`. The detector only ever sees an immutable
// snapshot of it.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Bumped whenever the on-disk layout changes. See `schema.rs`.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Shortest duplicate window a guild may configure (1 minute).
pub const MIN_TIME_WINDOW_MS: u64 = 60_000;

/// Fallback when a stored action cap is below 1.
pub const DEFAULT_MAX_ACTIONS_PER_MINUTE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildConfig {
    pub schema_version: u32,
    /// Master switch for the whole bot in this guild
    pub enabled: bool,
    pub duplicate_detection: DuplicateDetectionConfig,
    pub whitelist: Whitelist,
    pub logging: LoggingConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateDetectionConfig {
    pub enabled: bool,
    pub time_window_ms: u64,
    /// Occurrences tolerated inside the window; the next one is removed
    pub max_duplicates: u32,
    pub check_bots: bool,
    pub case_sensitive: bool,
    pub min_message_length: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Whitelist {
    pub users: BTreeSet<u64>,
    pub roles: BTreeSet<u64>,
    pub channels: BTreeSet<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub log_channel: Option<u64>,
    /// Post a short-lived notice in the channel after each deletion
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_actions_per_minute: u32,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            enabled: true,
            duplicate_detection: DuplicateDetectionConfig::default(),
            whitelist: Whitelist::default(),
            logging: LoggingConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for DuplicateDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time_window_ms: 300_000, // 5 minutes
            max_duplicates: 2,
            check_bots: true,
            case_sensitive: false,
            min_message_length: 3,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_channel: None,
            verbose: false,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_actions_per_minute: DEFAULT_MAX_ACTIONS_PER_MINUTE,
        }
    }
}

impl GuildConfig {
    /// Whether duplicate detection should run at all for this guild.
    pub fn detection_active(&self) -> bool {
        self.enabled && self.duplicate_detection.enabled
    }

    /// Window clamped to the one-minute floor.
    pub fn effective_time_window(&self) -> Duration {
        let ms = self.duplicate_detection.time_window_ms.max(MIN_TIME_WINDOW_MS);
        Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
    }

    pub fn effective_max_duplicates(&self) -> usize {
        self.duplicate_detection.max_duplicates.max(1) as usize
    }

    pub fn effective_max_actions(&self) -> u32 {
        self.rate_limit.max_actions_per_minute.max(1)
    }
}

/// Which whitelist an ID belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitelistKind {
    Users,
    Roles,
    Channels,
}

impl WhitelistKind {
    pub const ALL: [WhitelistKind; 3] = [
        WhitelistKind::Users,
        WhitelistKind::Roles,
        WhitelistKind::Channels,
    ];

    /// Discord mention syntax for an ID of this kind.
    pub fn mention(&self, id: u64) -> String {
        match self {
            WhitelistKind::Users => format!("<@{id}>"),
            WhitelistKind::Roles => format!("<@&{id}>"),
            WhitelistKind::Channels => format!("<#{id}>"),
        }
    }
}

impl fmt::Display for WhitelistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhitelistKind::Users => write!(f, "users"),
            WhitelistKind::Roles => write!(f, "roles"),
            WhitelistKind::Channels => write!(f, "channels"),
        }
    }
}

impl Whitelist {
    pub fn entries(&self, kind: WhitelistKind) -> &BTreeSet<u64> {
        match kind {
            WhitelistKind::Users => &self.users,
            WhitelistKind::Roles => &self.roles,
            WhitelistKind::Channels => &self.channels,
        }
    }

    pub fn entries_mut(&mut self, kind: WhitelistKind) -> &mut BTreeSet<u64> {
        match kind {
            WhitelistKind::Users => &mut self.users,
            WhitelistKind::Roles => &mut self.roles,
            WhitelistKind::Channels => &mut self.channels,
        }
    }

    /// Any single match exempts the message.
    pub fn exempts(&self, user_id: u64, channel_id: u64, role_ids: &[u64]) -> bool {
        self.users.contains(&user_id)
            || self.channels.contains(&channel_id)
            || role_ids.iter().any(|role| self.roles.contains(role))
    }
}
