// Per-guild configuration: model, schema reconciliation, storage port and
// the service the Discord layer talks to.

pub mod guild_config_models;
pub mod guild_config_service;
pub mod guild_config_store;
pub mod schema;

pub use guild_config_models::*;
pub use guild_config_service::{ConfigError, GuildConfigService};
pub use guild_config_store::{GuildConfigStore, StoreError};
