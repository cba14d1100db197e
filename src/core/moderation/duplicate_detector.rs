// Duplicate detection service - core business logic.
//
// This service handles:
// - Eligibility (feature switches, minimum length, bot authors)
// - Whitelist exemptions (users, roles, channels)
// - Action throttling through the per-minute rate limiter
// - The duplicate verdict itself, via the sliding-window cache
//
// NO Discord dependencies here - just pure domain logic. The caller deletes
// the message after `evaluate` returns; nothing here does I/O.

use super::duplicate_cache::DuplicateCache;
use super::moderation_models::{
    CacheStats, DuplicateCheck, FingerprintKey, InboundMessage, SightingRecord, SkipReason,
    SweepReport,
};
use super::rate_limiter::{ActionRateLimiter, RateLimitScope};
use crate::core::guild_config::GuildConfig;
use chrono::{DateTime, Duration, Utc};

/// How much of the content ends up in log lines.
const LOG_PREVIEW_CHARS: usize = 50;

/// Shorten `content` to `max_chars` characters, appending "..." if cut.
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Owns the process-wide duplicate cache and action limiter.
///
/// One instance is created at startup and shared behind an `Arc`; every
/// guild goes through the same cache and (in global scope) the same budget.
pub struct DuplicateDetector {
    cache: DuplicateCache,
    limiter: ActionRateLimiter,
    /// Window assumed by the periodic sweep
    sweep_window: Duration,
}

impl DuplicateDetector {
    pub fn new(limit_scope: RateLimitScope, sweep_window: Duration) -> Self {
        Self {
            cache: DuplicateCache::new(),
            limiter: ActionRateLimiter::new(limit_scope),
            sweep_window,
        }
    }

    /// `true` means "treat as duplicate, the caller should remove it".
    pub fn evaluate(
        &self,
        message: &InboundMessage,
        config: &GuildConfig,
        now: DateTime<Utc>,
    ) -> bool {
        let verdict = self.check_message(message, config, now);
        match &verdict {
            DuplicateCheck::Skipped(reason) => {
                tracing::trace!(message_id = message.id, %reason, "Message skipped");
            }
            DuplicateCheck::Tolerated { occurrences } => {
                tracing::trace!(
                    message_id = message.id,
                    occurrences,
                    "Message within duplicate allowance"
                );
            }
            DuplicateCheck::Throttled | DuplicateCheck::Duplicate { .. } => {}
        }
        verdict.is_duplicate()
    }

    /// Check a message and report why it was or wasn't flagged.
    pub fn check_message(
        &self,
        message: &InboundMessage,
        config: &GuildConfig,
        now: DateTime<Utc>,
    ) -> DuplicateCheck {
        if !config.detection_active() {
            return DuplicateCheck::Skipped(SkipReason::Disabled);
        }

        // Length is counted in characters; empty content passes when the
        // minimum is 0.
        let min_length = config.duplicate_detection.min_message_length as usize;
        if message.content.chars().count() < min_length {
            return DuplicateCheck::Skipped(SkipReason::TooShort);
        }

        if message.author_is_bot && !config.duplicate_detection.check_bots {
            return DuplicateCheck::Skipped(SkipReason::BotAuthor);
        }

        if config.whitelist.exempts(
            message.author_id,
            message.channel_id,
            &message.author_role_ids,
        ) {
            return DuplicateCheck::Skipped(SkipReason::Whitelisted);
        }

        let Some(guild_id) = message.guild_id else {
            tracing::debug!(
                message_id = message.id,
                "Message has no guild, skipping duplicate check"
            );
            return DuplicateCheck::Skipped(SkipReason::MissingScope);
        };

        let max_actions = config.effective_max_actions();
        if config.rate_limit.enabled && self.limiter.is_limited(guild_id, max_actions, now) {
            tracing::warn!(guild_id, "Rate limit reached, skipping duplicate check");
            return DuplicateCheck::Throttled;
        }

        let key = FingerprintKey::new(
            guild_id,
            message.channel_id,
            &message.content,
            config.duplicate_detection.case_sensitive,
        );
        let sighting = SightingRecord {
            message_id: message.id,
            author_id: message.author_id,
            timestamp: now,
        };

        let window = config.effective_time_window();
        let occurrences = self.cache.prune_and_record(key, sighting, window);

        if occurrences <= config.effective_max_duplicates() {
            return DuplicateCheck::Tolerated { occurrences };
        }

        if config.rate_limit.enabled {
            // Another verdict may have taken the last slot since the check above.
            if !self.limiter.try_record_action(guild_id, max_actions, now) {
                tracing::warn!(guild_id, "Rate limit reached, skipping duplicate check");
                return DuplicateCheck::Throttled;
            }
        } else {
            self.limiter.record_action(guild_id, now);
        }

        tracing::info!(
            guild_id,
            channel_id = message.channel_id,
            author_id = message.author_id,
            occurrences,
            "Duplicate detected: \"{}\"",
            truncate_content(&message.content, LOG_PREVIEW_CHARS)
        );

        DuplicateCheck::Duplicate { occurrences }
    }

    /// Periodic maintenance: reclaim fingerprints nobody has touched lately.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        self.cache.sweep_all(now, self.sweep_window)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn tracked_fingerprints(&self) -> usize {
        self.cache.size()
    }

    /// Actions counted against `guild_id`'s budget in the current minute.
    pub fn actions_this_minute(&self, guild_id: u64, now: DateTime<Utc>) -> u32 {
        self.limiter.current_count(guild_id, now)
    }

    pub fn rate_limit_scope(&self) -> RateLimitScope {
        self.limiter.scope()
    }

    /// Drop every sighting and action count.
    pub fn clear(&self) {
        self.cache.clear();
        self.limiter.clear();
        tracing::info!("Message cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const GUILD: u64 = 100;
    const CHANNEL: u64 = 200;

    fn t0() -> DateTime<Utc> {
        // Start of a minute, so second offsets stay in one rate bucket
        Utc.timestamp_opt(28_000_000 * 60, 0).unwrap()
    }

    fn new_detector() -> DuplicateDetector {
        DuplicateDetector::new(RateLimitScope::Global, Duration::minutes(5))
    }

    fn base_config() -> GuildConfig {
        let mut config = GuildConfig::default();
        config.rate_limit.enabled = false;
        config
    }

    fn message(id: u64, content: &str) -> InboundMessage {
        InboundMessage {
            id,
            author_id: 1,
            author_is_bot: false,
            content: content.to_string(),
            channel_id: CHANNEL,
            guild_id: Some(GUILD),
            author_role_ids: Vec::new(),
        }
    }

    #[test]
    fn test_threshold_boundary() {
        let detector = new_detector();
        let config = base_config(); // max_duplicates = 2

        let verdicts: Vec<bool> = (0..4)
            .map(|i| detector.evaluate(&message(i, "hello there"), &config, t0()))
            .collect();

        assert_eq!(verdicts, vec![false, false, true, true]);
    }

    #[test]
    fn test_end_to_end_scenario() {
        let detector = new_detector();
        let mut config = base_config();
        config.duplicate_detection.time_window_ms = 300_000;
        config.duplicate_detection.min_message_length = 3;

        let texts = ["spam", "SPAM", "spam", "spam"];
        let verdicts: Vec<bool> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let mut msg = message(i as u64, text);
                msg.author_id = i as u64 % 2; // same and different authors
                detector.evaluate(&msg, &config, t0() + Duration::milliseconds(i as i64 * 250))
            })
            .collect();

        assert_eq!(verdicts, vec![false, false, true, true]);
    }

    #[test]
    fn test_window_expiry_resets_count() {
        let detector = new_detector();
        let config = base_config();
        let window = Duration::milliseconds(config.duplicate_detection.time_window_ms as i64);

        assert!(!detector.evaluate(&message(1, "again"), &config, t0()));
        assert!(!detector.evaluate(&message(2, "again"), &config, t0()));

        let later = t0() + window + Duration::seconds(1);
        assert_eq!(
            detector.check_message(&message(3, "again"), &config, later),
            DuplicateCheck::Tolerated { occurrences: 1 }
        );
    }

    #[test]
    fn test_case_sensitivity() {
        let detector = new_detector();
        let mut config = base_config();
        config.duplicate_detection.max_duplicates = 1;

        assert!(!detector.evaluate(&message(1, "Hello"), &config, t0()));
        assert!(detector.evaluate(&message(2, "hello"), &config, t0()));

        let detector = new_detector();
        config.duplicate_detection.case_sensitive = true;
        assert!(!detector.evaluate(&message(1, "Hello"), &config, t0()));
        assert!(!detector.evaluate(&message(2, "hello"), &config, t0()));
    }

    #[test]
    fn test_whitelisted_user_role_and_channel_never_flagged() {
        let detector = new_detector();
        let mut config = base_config();
        config.duplicate_detection.max_duplicates = 1;
        config.whitelist.users.insert(1);

        for i in 0..5 {
            assert!(!detector.evaluate(&message(i, "allowed"), &config, t0()));
        }

        let mut config = base_config();
        config.duplicate_detection.max_duplicates = 1;
        config.whitelist.roles.insert(77);
        for i in 0..5 {
            let mut msg = message(i, "role holder");
            msg.author_role_ids = vec![5, 77];
            assert_eq!(
                detector.check_message(&msg, &config, t0()),
                DuplicateCheck::Skipped(SkipReason::Whitelisted)
            );
        }

        config.whitelist.channels.insert(CHANNEL);
        for i in 0..5 {
            assert!(!detector.evaluate(&message(i, "channel"), &config, t0()));
        }

        // Whitelisted messages leave no trace in the cache
        assert_eq!(detector.tracked_fingerprints(), 0);
    }

    #[test]
    fn test_channel_and_guild_isolation() {
        let detector = new_detector();
        let mut config = base_config();
        config.duplicate_detection.max_duplicates = 1;

        assert!(!detector.evaluate(&message(1, "isolated"), &config, t0()));

        let mut other_channel = message(2, "isolated");
        other_channel.channel_id = CHANNEL + 1;
        assert!(!detector.evaluate(&other_channel, &config, t0()));

        let mut other_guild = message(3, "isolated");
        other_guild.guild_id = Some(GUILD + 1);
        assert!(!detector.evaluate(&other_guild, &config, t0()));

        assert_eq!(detector.tracked_fingerprints(), 3);
    }

    #[test]
    fn test_rate_limiter_cutoff_and_rollover() {
        let detector = new_detector();
        let mut config = GuildConfig::default();
        config.duplicate_detection.max_duplicates = 1;
        config.rate_limit.enabled = true;
        config.rate_limit.max_actions_per_minute = 2;

        // First sighting tolerated, next two flagged and counted
        assert!(!detector.evaluate(&message(1, "flood"), &config, t0()));
        assert!(detector.evaluate(&message(2, "flood"), &config, t0()));
        assert!(detector.evaluate(&message(3, "flood"), &config, t0()));

        // Budget exhausted for this minute: fail open
        assert_eq!(
            detector.check_message(&message(4, "flood"), &config, t0() + Duration::seconds(30)),
            DuplicateCheck::Throttled
        );
        assert_eq!(detector.actions_this_minute(GUILD, t0()), 2);

        // New minute, new budget
        let next_minute = t0() + Duration::seconds(60);
        assert!(detector.evaluate(&message(5, "flood"), &config, next_minute));
    }

    #[test]
    fn test_minimum_length_exclusion() {
        let detector = new_detector();
        let mut config = base_config();
        config.duplicate_detection.max_duplicates = 1;
        config.duplicate_detection.min_message_length = 5;

        for i in 0..4 {
            assert_eq!(
                detector.check_message(&message(i, "hey"), &config, t0()),
                DuplicateCheck::Skipped(SkipReason::TooShort)
            );
        }
    }

    #[test]
    fn test_empty_content_is_eligible_with_zero_minimum() {
        let detector = new_detector();
        let mut config = base_config();
        config.duplicate_detection.max_duplicates = 1;
        config.duplicate_detection.min_message_length = 0;

        assert!(!detector.evaluate(&message(1, ""), &config, t0()));
        assert!(detector.evaluate(&message(2, ""), &config, t0()));
    }

    #[test]
    fn test_minimum_length_counts_characters() {
        let detector = new_detector();
        let config = base_config(); // min_message_length = 3

        // Two characters, eight bytes
        let check = detector.check_message(&message(1, "😀😀"), &config, t0());
        assert_eq!(check, DuplicateCheck::Skipped(SkipReason::TooShort));

        let check = detector.check_message(&message(2, "😀😀😀"), &config, t0());
        assert_eq!(check, DuplicateCheck::Tolerated { occurrences: 1 });
    }

    #[test]
    fn test_bot_messages_respect_check_bots() {
        let detector = new_detector();
        let mut config = base_config();
        config.duplicate_detection.max_duplicates = 1;
        config.duplicate_detection.check_bots = false;

        let mut bot = message(1, "beep boop");
        bot.author_is_bot = true;
        assert_eq!(
            detector.check_message(&bot, &config, t0()),
            DuplicateCheck::Skipped(SkipReason::BotAuthor)
        );

        config.duplicate_detection.check_bots = true;
        assert!(!detector.evaluate(&bot, &config, t0()));
        assert!(detector.evaluate(&bot, &config, t0()));
    }

    #[test]
    fn test_disabled_switches() {
        let detector = new_detector();
        let mut config = base_config();
        config.enabled = false;
        assert_eq!(
            detector.check_message(&message(1, "whatever"), &config, t0()),
            DuplicateCheck::Skipped(SkipReason::Disabled)
        );

        config.enabled = true;
        config.duplicate_detection.enabled = false;
        assert_eq!(
            detector.check_message(&message(1, "whatever"), &config, t0()),
            DuplicateCheck::Skipped(SkipReason::Disabled)
        );
    }

    #[test]
    fn test_missing_guild_fails_open() {
        let detector = new_detector();
        let mut msg = message(1, "direct message");
        msg.guild_id = None;

        assert_eq!(
            detector.check_message(&msg, &base_config(), t0()),
            DuplicateCheck::Skipped(SkipReason::MissingScope)
        );
    }

    #[test]
    fn test_out_of_range_config_is_clamped() {
        let detector = new_detector();
        let mut config = base_config();
        config.duplicate_detection.max_duplicates = 0;
        config.duplicate_detection.time_window_ms = 0;

        // Treated as max_duplicates = 1 with a one-minute window
        assert!(!detector.evaluate(&message(1, "clamped"), &config, t0()));
        assert!(detector.evaluate(&message(2, "clamped"), &config, t0() + Duration::seconds(59)));
    }

    #[test]
    fn test_concurrent_identical_messages() {
        use std::sync::Arc;
        use std::thread;

        let detector = Arc::new(new_detector());
        let config = Arc::new(base_config()); // max_duplicates = 2, no rate limit

        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let detector = Arc::clone(&detector);
                let config = Arc::clone(&config);
                thread::spawn(move || {
                    (0..50u64)
                        .filter(|i| detector.evaluate(&message(t * 1000 + i, "race"), &config, t0()))
                        .count()
                })
            })
            .collect();

        let flagged: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(flagged, 200 - 2);
    }

    #[test]
    fn test_sweep_and_clear() {
        let detector = new_detector();
        let config = base_config();
        detector.evaluate(&message(1, "old news"), &config, t0());

        let report = detector.sweep(t0() + Duration::minutes(10));
        assert_eq!(report.keys_removed, 1);

        detector.evaluate(&message(2, "fresh"), &config, t0());
        detector.clear();
        assert_eq!(detector.cache_stats(), CacheStats::default());
    }

    #[test]
    fn test_truncate_content() {
        assert_eq!(truncate_content("short", 10), "short");
        assert_eq!(truncate_content("abcdef", 3), "abc...");
        assert_eq!(truncate_content("héllo wörld", 4), "héll...");
    }

    #[test]
    fn test_concurrent_duplicates_respect_action_cap() {
        use std::sync::Arc;
        use std::thread;

        let detector = Arc::new(new_detector());
        let mut config = base_config();
        config.rate_limit.enabled = true;
        config.rate_limit.max_actions_per_minute = 5;
        let config = Arc::new(config);

        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let detector = Arc::clone(&detector);
                let config = Arc::clone(&config);
                thread::spawn(move || {
                    (0..50u64)
                        .filter(|i| detector.evaluate(&message(t * 1000 + i, "flood"), &config, t0()))
                        .count()
                })
            })
            .collect();

        let flagged: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(flagged, 5);
        assert_eq!(detector.actions_this_minute(GUILD, t0()), 5);
    }
}
