// Discord commands module.
// Each feature gets its own command file.

use crate::discord::{Data, Error};

pub mod cache;

// Bot presence management
pub mod presence;

pub mod settings;

pub mod status;

pub mod toggle;

pub mod whitelist;

/// Every slash command the bot registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        status::status(),
        toggle::toggle(),
        settings::settings(),
        whitelist::whitelist(),
        cache::cache(),
    ]
}
