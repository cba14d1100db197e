// This is the entry point of the duplicate-message filter bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (duplicate cache, action limiter, guild config)
// - `infra/` = Implementations of core traits (JSON config files)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands, event handlers and the cache sweep

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with a pile of mod.rs files that all look the same.
mod app_config;
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::app_config::AppConfig;
use crate::core::guild_config::GuildConfigService;
use crate::core::moderation::DuplicateDetector;
use crate::discord::commands::{self, presence};
use crate::discord::moderation::handle_message;
use crate::discord::{Data, Error};
use crate::infra::guild_config::JsonGuildConfigStore;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            // A failure here only affects this one message
            if let Err(e) = handle_message(ctx, new_message, data).await {
                tracing::error!(
                    message_id = new_message.id.get(),
                    "Error checking message for duplicates: {}",
                    e
                );
            }
        }
        serenity::FullEvent::GuildDelete { incomplete, .. } => {
            // `unavailable` means an outage, not a removal
            if !incomplete.unavailable {
                let guild_id = incomplete.id.get();
                tracing::info!(guild_id, "Removed from guild");
                if let Err(e) = data.guild_configs.delete_config(guild_id).await {
                    tracing::error!(guild_id, "Failed to delete guild configuration: {}", e);
                }
            }
        }
        _ => {}
    }

    Ok(())
}

const DEFAULT_LOG_FILTER: &str = "removedupe_bot=info";

/// RUST_LOG wins as-is; without it (or if it doesn't parse) our own crate logs at info.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Spawn the periodic cache sweep. Runs for the life of the process.
fn spawn_cache_sweep(detector: Arc<DuplicateDetector>, interval: std::time::Duration) {
    tokio::spawn(async move {
        use tokio::time::sleep;

        loop {
            sleep(interval).await;

            let report = detector.sweep(chrono::Utc::now());
            if report.keys_removed > 0 {
                tracing::info!(
                    removed = report.keys_removed,
                    sightings = report.sightings_removed,
                    remaining = report.keys_remaining(),
                    "Cleaned up expired message cache entries"
                );
            } else {
                tracing::debug!(
                    remaining = report.keys_remaining(),
                    "Cache sweep found nothing to remove"
                );
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .compact()
        .init();

    let config = AppConfig::from_env()?;

    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.data_dir.display()
        )
    })?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let config_store = JsonGuildConfigStore::new(&config.data_dir);
    let guild_configs = Arc::new(GuildConfigService::new(config_store));
    let detector = Arc::new(DuplicateDetector::new(
        config.rate_limit_scope,
        config.sweep_window,
    ));

    tracing::info!(
        data_dir = %config.data_dir.display(),
        rate_limit_scope = %config.rate_limit_scope,
        sweep_interval_secs = config.sweep_interval.as_secs(),
        "Services initialised"
    );

    let data = Data {
        detector: Arc::clone(&detector),
        guild_configs: Arc::clone(&guild_configs),
        started_at: Instant::now(),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS;

    let dev_guild_id = config.dev_guild_id;
    let sweep_interval = config.sweep_interval;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| {
                Box::pin(async move {
                    if let poise::FrameworkError::Command { error, ctx, .. } = &error {
                        tracing::error!(
                            command = %ctx.command().qualified_name,
                            "Command failed: {}",
                            error
                        );
                        let _ = ctx
                            .send(
                                poise::CreateReply::default()
                                    .content("❌ Something went wrong while running that command.")
                                    .ephemeral(true),
                            )
                            .await;
                    } else if let Err(e) = poise::builtins::on_error(error).await {
                        tracing::error!("Error while handling error: {}", e);
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!(user = %ready.user.name, "Bot is starting up...");

                match dev_guild_id {
                    // Guild registration shows up immediately; global can take an hour
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            serenity::GuildId::new(guild_id),
                        )
                        .await?;
                        tracing::info!(guild_id, "Commands registered in development guild");
                    }
                    None => {
                        poise::builtins::register_globally(ctx, &framework.options().commands)
                            .await?;
                        tracing::info!("Commands registered globally");
                    }
                }

                presence::on_ready(ctx);

                match data.guild_configs.configured_guilds().await {
                    Ok(guilds) => tracing::info!(
                        connected = ready.guilds.len(),
                        configured = guilds.len(),
                        "Bot is ready"
                    ),
                    Err(e) => tracing::warn!("Failed to list configured guilds: {}", e),
                }

                spawn_cache_sweep(Arc::clone(&data.detector), sweep_interval);

                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    client.start().await.context("Error running bot")?;
    Ok(())
}
