// Core moderation module - duplicate detection and action throttling.
// Following the same pattern as the guild_config module.

pub mod duplicate_cache;
pub mod duplicate_detector;
pub mod moderation_models;
pub mod rate_limiter;

pub use duplicate_detector::{truncate_content, DuplicateDetector};
pub use moderation_models::*;
pub use rate_limiter::RateLimitScope;
