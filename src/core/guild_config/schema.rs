// Versioned reconciliation of stored guild configs.
//
// Files on disk may come from an older layout or simply miss keys added
// since they were written. Everything is fixed up here, on the raw JSON,
// before it becomes a `GuildConfig`. The detector never sees a partial
// config.
//
// Steps, in order:
//   1. run layout migrations for files older than CURRENT_SCHEMA_VERSION
//   2. back-fill any missing key from the default structure
//   3. clamp values that are out of range
//   4. stamp the current schema version

use super::guild_config_models::{
    GuildConfig, CURRENT_SCHEMA_VERSION, DEFAULT_MAX_ACTIONS_PER_MINUTE, MIN_TIME_WINDOW_MS,
};
use serde_json::{Map, Value};

/// Unversioned files used camelCase keys and string IDs.
const LEGACY_KEY_RENAMES: &[(&str, &str)] = &[
    ("duplicateDetection", "duplicate_detection"),
    ("timeWindow", "time_window_ms"),
    ("maxDuplicates", "max_duplicates"),
    ("checkBots", "check_bots"),
    ("caseSensitive", "case_sensitive"),
    ("minMessageLength", "min_message_length"),
    ("logChannel", "log_channel"),
    ("rateLimit", "rate_limit"),
    ("maxActionsPerMinute", "max_actions_per_minute"),
];

/// A config after reconciliation, plus whether it differs from what was stored.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub config: GuildConfig,
    pub changed: bool,
}

/// Bring a stored JSON document up to the current schema.
pub fn reconcile(stored: Value) -> Result<Reconciled, serde_json::Error> {
    let mut changed = false;

    let mut doc = match stored {
        Value::Object(map) => map,
        _ => {
            changed = true;
            Map::new()
        }
    };

    let stored_version = doc
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    if stored_version < 1 {
        changed |= migrate_v0_to_v1(&mut doc);
    }

    let defaults = serde_json::to_value(GuildConfig::default())?;
    let mut doc = Value::Object(doc);
    changed |= merge_missing(&mut doc, &defaults);

    let mut config: GuildConfig = serde_json::from_value(doc)?;
    changed |= clamp_ranges(&mut config);

    if config.schema_version != CURRENT_SCHEMA_VERSION {
        config.schema_version = CURRENT_SCHEMA_VERSION;
        changed = true;
    }

    Ok(Reconciled { config, changed })
}

/// Copy every key present in `source` but absent from `target`, recursing
/// into nested objects. Arrays and scalars are never merged.
fn merge_missing(target: &mut Value, source: &Value) -> bool {
    let (Value::Object(target), Value::Object(source)) = (target, source) else {
        return false;
    };

    let mut changed = false;
    for (key, default) in source {
        match target.get_mut(key) {
            None => {
                target.insert(key.clone(), default.clone());
                changed = true;
            }
            Some(existing) if default.is_object() => {
                if existing.is_object() {
                    changed |= merge_missing(existing, default);
                } else {
                    *existing = default.clone();
                    changed = true;
                }
            }
            Some(_) => {}
        }
    }
    changed
}

fn clamp_ranges(config: &mut GuildConfig) -> bool {
    let mut changed = false;

    if config.duplicate_detection.time_window_ms < MIN_TIME_WINDOW_MS {
        config.duplicate_detection.time_window_ms = MIN_TIME_WINDOW_MS;
        changed = true;
    }

    if config.duplicate_detection.max_duplicates < 1 {
        config.duplicate_detection.max_duplicates = 1;
        changed = true;
    }

    if config.rate_limit.max_actions_per_minute < 1 {
        config.rate_limit.max_actions_per_minute = DEFAULT_MAX_ACTIONS_PER_MINUTE;
        changed = true;
    }

    changed
}

/// Rename camelCase keys and turn string snowflakes into numbers.
fn migrate_v0_to_v1(doc: &mut Map<String, Value>) -> bool {
    let mut changed = rename_legacy_keys(doc);

    if let Some(Value::Object(whitelist)) = doc.get_mut("whitelist") {
        for list in whitelist.values_mut() {
            if let Value::Array(ids) = list {
                let parsed: Vec<Value> = ids.iter().filter_map(snowflake).map(Value::from).collect();
                if parsed != *ids {
                    *ids = parsed;
                    changed = true;
                }
            }
        }
    }

    if let Some(Value::Object(logging)) = doc.get_mut("logging") {
        if let Some(channel) = logging.get_mut("log_channel") {
            if channel.is_string() {
                *channel = snowflake(channel).map(Value::from).unwrap_or(Value::Null);
                changed = true;
            }
        }
    }

    changed
}

fn rename_legacy_keys(doc: &mut Map<String, Value>) -> bool {
    let mut changed = false;

    for (old, new) in LEGACY_KEY_RENAMES {
        if let Some(value) = doc.remove(*old) {
            doc.entry(new.to_string()).or_insert(value);
            changed = true;
        }
    }

    for value in doc.values_mut() {
        if let Value::Object(nested) = value {
            changed |= rename_legacy_keys(nested);
        }
    }

    changed
}

fn snowflake(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
