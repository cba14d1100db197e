// Moderation domain models - data structures for duplicate detection.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts serenity messages into `InboundMessage` and
// turns a positive verdict into a deletion.

use chrono::{DateTime, Utc};
use std::fmt;

/// A message as seen by the detector.
///
/// `guild_id` is optional because DMs carry no guild. The detector fails
/// open on those rather than guessing a scope.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: u64,
    pub author_id: u64,
    pub author_is_bot: bool,
    pub content: String,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub author_role_ids: Vec<u64>,
}

/// Groups "same text, same channel, same guild".
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FingerprintKey {
    pub guild_id: u64,
    pub channel_id: u64,
    pub content: String,
}

impl FingerprintKey {
    /// Build a key, case-folding the content unless `case_sensitive` is set.
    pub fn new(guild_id: u64, channel_id: u64, content: &str, case_sensitive: bool) -> Self {
        let content = if case_sensitive {
            content.to_string()
        } else {
            content.to_lowercase()
        };

        Self {
            guild_id,
            channel_id,
            content,
        }
    }
}

/// One occurrence of a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SightingRecord {
    pub message_id: u64,
    pub author_id: u64,
    pub timestamp: DateTime<Utc>,
}

/// Why a message was let through without touching the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Bot or duplicate detection is switched off for the guild
    Disabled,
    /// Content is shorter than the configured minimum
    TooShort,
    /// Author is a bot and bot checking is off
    BotAuthor,
    /// Author, channel or one of the author's roles is whitelisted
    Whitelisted,
    /// Message has no guild, so there is no scope to track it in
    MissingScope,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "Disabled"),
            SkipReason::TooShort => write!(f, "Too Short"),
            SkipReason::BotAuthor => write!(f, "Bot Author"),
            SkipReason::Whitelisted => write!(f, "Whitelisted"),
            SkipReason::MissingScope => write!(f, "Missing Scope"),
        }
    }
}

/// Outcome of checking a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateCheck {
    /// Message was not eligible for detection
    Skipped(SkipReason),
    /// Action budget is exhausted; detection stands down
    Throttled,
    /// Message was recorded and is within the tolerated count
    Tolerated { occurrences: usize },
    /// Message exceeded the duplicate threshold and should be removed
    Duplicate { occurrences: usize },
}

impl DuplicateCheck {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DuplicateCheck::Duplicate { .. })
    }
}

/// Snapshot of the duplicate cache, surfaced in `/status` and `/cache stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_keys: usize,
    pub total_sightings: usize,
}

/// Result of a full cache sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub keys_before: usize,
    pub keys_removed: usize,
    pub sightings_removed: usize,
}

impl SweepReport {
    pub fn keys_remaining(&self) -> usize {
        self.keys_before - self.keys_removed
    }
}
