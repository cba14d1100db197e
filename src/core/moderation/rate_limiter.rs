// Per-minute action limiter.
//
// A fixed-window counter keyed by minute index (floor(epoch_ms / 60000)).
// It under-throttles slightly across a minute boundary: up to twice the cap
// can land within sixty seconds that straddle two buckets. That is accepted
// in exchange for O(1) work and a handful of live buckets.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

const MILLIS_PER_MINUTE: i64 = 60_000;
/// Buckets further than this many minutes behind the current one are evicted.
const RETAINED_MINUTES: i64 = 5;

/// Which dimension the action budget is shared across.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitScope {
    /// One budget for the whole process, regardless of guild
    #[default]
    Global,
    /// Each guild gets its own budget
    PerGuild,
}

impl FromStr for RateLimitScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(RateLimitScope::Global),
            "guild" | "per_guild" | "per-guild" => Ok(RateLimitScope::PerGuild),
            other => Err(format!("unknown rate limit scope '{other}'")),
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitScope::Global => write!(f, "global"),
            RateLimitScope::PerGuild => write!(f, "per-guild"),
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
struct BucketKey {
    /// `None` when the limiter is global
    guild_id: Option<u64>,
    minute: i64,
}

pub struct ActionRateLimiter {
    scope: RateLimitScope,
    buckets: Mutex<HashMap<BucketKey, u32>>,
}

impl ActionRateLimiter {
    pub fn new(scope: RateLimitScope) -> Self {
        Self {
            scope,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn scope(&self) -> RateLimitScope {
        self.scope
    }

    fn minute_index(now: DateTime<Utc>) -> i64 {
        now.timestamp_millis().div_euclid(MILLIS_PER_MINUTE)
    }

    fn bucket_key(&self, guild_id: u64, now: DateTime<Utc>) -> BucketKey {
        let guild_id = match self.scope {
            RateLimitScope::Global => None,
            RateLimitScope::PerGuild => Some(guild_id),
        };

        BucketKey {
            guild_id,
            minute: Self::minute_index(now),
        }
    }

    /// True when the current minute already holds `max_actions` actions.
    /// Does not count anything.
    pub fn is_limited(&self, guild_id: u64, max_actions: u32, now: DateTime<Utc>) -> bool {
        let key = self.bucket_key(guild_id, now);
        let buckets = self.buckets.lock();
        buckets.get(&key).copied().unwrap_or(0) >= max_actions.max(1)
    }

    /// Count one action in the current minute, then evict stale buckets.
    pub fn record_action(&self, guild_id: u64, now: DateTime<Utc>) {
        let key = self.bucket_key(guild_id, now);
        let mut buckets = self.buckets.lock();
        Self::increment(&mut buckets, key);
    }

    /// Count one action only if the current minute is under `max_actions`.
    ///
    /// Check and increment happen under one lock, so concurrent callers
    /// cannot push the bucket past the cap.
    pub fn try_record_action(&self, guild_id: u64, max_actions: u32, now: DateTime<Utc>) -> bool {
        let key = self.bucket_key(guild_id, now);
        let mut buckets = self.buckets.lock();

        if buckets.get(&key).copied().unwrap_or(0) >= max_actions.max(1) {
            return false;
        }

        Self::increment(&mut buckets, key);
        true
    }

    /// Actions counted in the current minute.
    pub fn current_count(&self, guild_id: u64, now: DateTime<Utc>) -> u32 {
        let key = self.bucket_key(guild_id, now);
        self.buckets.lock().get(&key).copied().unwrap_or(0)
    }

    /// Number of live buckets.
    #[cfg(test)]
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    pub fn clear(&self) {
        self.buckets.lock().clear();
    }

    fn increment(buckets: &mut HashMap<BucketKey, u32>, key: BucketKey) {
        let count = buckets.entry(key).or_insert(0);
        *count = count.saturating_add(1);

        let oldest_kept = key.minute - RETAINED_MINUTES;
        buckets.retain(|k, _| k.minute >= oldest_kept);
    }
}

impl Default for ActionRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitScope::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// A timestamp at the start of minute `minute` plus `secs` seconds.
    fn at(minute: i64, secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(28_000_000 * 60 + minute * 60 + secs, 0)
            .unwrap()
    }

    #[test]
    fn test_limits_after_cap_reached() {
        let limiter = ActionRateLimiter::new(RateLimitScope::Global);

        for _ in 0..3 {
            assert!(!limiter.is_limited(1, 3, at(0, 10)));
            limiter.record_action(1, at(0, 10));
        }

        assert!(limiter.is_limited(1, 3, at(0, 59)));
    }

    #[test]
    fn test_resets_on_minute_rollover() {
        let limiter = ActionRateLimiter::new(RateLimitScope::Global);
        limiter.record_action(1, at(0, 0));
        limiter.record_action(1, at(0, 30));

        assert!(limiter.is_limited(1, 2, at(0, 59)));
        assert!(!limiter.is_limited(1, 2, at(1, 0)));
    }

    #[test]
    fn test_is_limited_does_not_count() {
        let limiter = ActionRateLimiter::default();
        for _ in 0..10 {
            limiter.is_limited(1, 1, at(0, 0));
        }
        assert_eq!(limiter.current_count(1, at(0, 0)), 0);
    }

    #[test]
    fn test_zero_cap_is_clamped_to_one() {
        let limiter = ActionRateLimiter::default();
        assert!(!limiter.is_limited(1, 0, at(0, 0)));
        assert!(limiter.try_record_action(1, 0, at(0, 0)));
        assert!(limiter.is_limited(1, 0, at(0, 1)));
    }

    #[test]
    fn test_try_record_refuses_past_cap() {
        let limiter = ActionRateLimiter::default();
        assert!(limiter.try_record_action(1, 2, at(0, 0)));
        assert!(limiter.try_record_action(1, 2, at(0, 1)));
        assert!(!limiter.try_record_action(1, 2, at(0, 2)));
        assert_eq!(limiter.current_count(1, at(0, 3)), 2);
    }

    #[test]
    fn test_evicts_buckets_older_than_five_minutes() {
        let limiter = ActionRateLimiter::default();
        for minute in 0..10 {
            limiter.record_action(1, at(minute, 0));
        }

        // Minutes 4..=9 survive
        assert_eq!(limiter.bucket_count(), 6);
    }

    #[test]
    fn test_global_scope_shares_budget_across_guilds() {
        let limiter = ActionRateLimiter::new(RateLimitScope::Global);
        limiter.record_action(1, at(0, 0));
        limiter.record_action(2, at(0, 0));

        assert!(limiter.is_limited(3, 2, at(0, 1)));
    }

    #[test]
    fn test_per_guild_scope_isolates_budgets() {
        let limiter = ActionRateLimiter::new(RateLimitScope::PerGuild);
        limiter.record_action(1, at(0, 0));
        limiter.record_action(1, at(0, 0));

        assert!(limiter.is_limited(1, 2, at(0, 1)));
        assert!(!limiter.is_limited(2, 2, at(0, 1)));
    }

    #[test]
    fn test_parse_scope() {
        assert_eq!("global".parse::<RateLimitScope>(), Ok(RateLimitScope::Global));
        assert_eq!("Guild".parse::<RateLimitScope>(), Ok(RateLimitScope::PerGuild));
        assert!("galaxy".parse::<RateLimitScope>().is_err());
    }

    #[test]
    fn test_concurrent_try_record_never_exceeds_cap() {
        use std::sync::Arc;
        use std::thread;

        let limiter = Arc::new(ActionRateLimiter::default());
        let cap = 7;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || {
                    (0..10)
                        .filter(|_| limiter.try_record_action(1, cap, at(0, 0)))
                        .count()
                })
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, cap as usize);
        assert_eq!(limiter.current_count(1, at(0, 0)), cap);
    }
}
