// Sliding-window duplicate cache.
//
// Maps a fingerprint (guild, channel, normalized content) to the sightings
// seen inside the time window. Pruning is lazy: every access trims the key
// it touches. The periodic sweep reclaims keys that stopped receiving
// traffic, since nothing else would ever prune them.
//
// DashMap shards the map, and every mutation of a key happens while its
// shard guard is held, so prune -> insert -> count is atomic per key.

use super::moderation_models::{CacheStats, FingerprintKey, SightingRecord, SweepReport};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Sightings for one fingerprint plus the window it was last pruned with.
#[derive(Debug, Clone)]
struct CacheEntry {
    sightings: Vec<SightingRecord>,
    /// Guild windows differ, so the sweep must not trim a key harder than
    /// its own guild would.
    window: Duration,
}

impl CacheEntry {
    fn new(window: Duration) -> Self {
        Self {
            sightings: Vec::new(),
            window,
        }
    }

    /// Drop sightings older than `window` relative to `now`.
    /// Returns how many were dropped.
    fn retain_within(&mut self, now: DateTime<Utc>, window: Duration) -> usize {
        let before = self.sightings.len();
        self.sightings
            .retain(|s| now.signed_duration_since(s.timestamp) <= window);
        before - self.sightings.len()
    }
}

/// Process-wide duplicate cache shared by every guild.
pub struct DuplicateCache {
    entries: DashMap<FingerprintKey, CacheEntry>,
}

impl DuplicateCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Remove sightings for `key` older than `window`, dropping the key when
    /// nothing is left. Returns the count after pruning.
    ///
    /// Single-step API; the detector uses `prune_and_record`, which does
    /// this and `record` as one atomic step.
    #[allow(dead_code)]
    pub fn prune(&self, key: &FingerprintKey, now: DateTime<Utc>, window: Duration) -> usize {
        let remaining = match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.window = window;
                entry.retain_within(now, window);
                entry.sightings.len()
            }
            None => return 0,
        };

        if remaining == 0 {
            // remove_if re-checks under the shard lock, so a sighting recorded
            // in between keeps the key alive.
            self.entries.remove_if(key, |_, entry| entry.sightings.is_empty());
        }

        remaining
    }

    /// Append a sighting, creating the key if needed. No re-sorting.
    /// Single-step API, see `prune`.
    #[allow(dead_code)]
    pub fn record(&self, key: FingerprintKey, sighting: SightingRecord) {
        self.entries
            .entry(key)
            .or_insert_with(|| CacheEntry::new(Duration::zero()))
            .sightings
            .push(sighting);
    }

    /// Prune, append and count as a single step under the key's shard lock.
    ///
    /// Pruning is done relative to the sighting's own timestamp. Returns the
    /// number of sightings in the window including the new one.
    pub fn prune_and_record(
        &self,
        key: FingerprintKey,
        sighting: SightingRecord,
        window: Duration,
    ) -> usize {
        let mut entry = self
            .entries
            .entry(key)
            .or_insert_with(|| CacheEntry::new(window));

        entry.window = window;
        entry.retain_within(sighting.timestamp, window);
        entry.sightings.push(sighting);
        entry.sightings.len()
    }

    /// Apply the pruning rule to every key.
    ///
    /// Each key is trimmed with the wider of `window` and the window its
    /// guild last used. Safe to run alongside `prune_and_record`: `retain`
    /// takes each shard's write lock in turn.
    pub fn sweep_all(&self, now: DateTime<Utc>, window: Duration) -> SweepReport {
        let keys_before = self.entries.len();
        let mut keys_removed = 0;
        let mut sightings_removed = 0;

        self.entries.retain(|_, entry| {
            let effective = window.max(entry.window);
            sightings_removed += entry.retain_within(now, effective);

            if entry.sightings.is_empty() {
                keys_removed += 1;
                false
            } else {
                true
            }
        });

        SweepReport {
            keys_before: keys_before.max(keys_removed),
            keys_removed,
            sightings_removed,
        }
    }

    /// Number of distinct fingerprints currently tracked.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let total_sightings = self
            .entries
            .iter()
            .map(|entry| entry.value().sightings.len())
            .sum();

        CacheStats {
            total_keys: self.entries.len(),
            total_sightings,
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for DuplicateCache {
    fn default() -> Self {
        Self::new()
    }
}
