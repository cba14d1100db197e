// Discord layer - commands and event handlers.
//
// Everything in here translates between serenity types and the primitive
// types the core works with. No moderation decisions are made here.

use crate::core::guild_config::GuildConfigService;
use crate::core::moderation::DuplicateDetector;
use crate::infra::guild_config::JsonGuildConfigStore;
use std::sync::Arc;
use std::time::Instant;

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "moderation/duplicate_handler.rs"]
pub mod moderation;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Shared state handed to every command and event.
pub struct Data {
    pub detector: Arc<DuplicateDetector>,
    pub guild_configs: Arc<GuildConfigService<JsonGuildConfigStore>>,
    pub started_at: Instant,
}
