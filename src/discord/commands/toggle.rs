// /toggle - flip one of the guild's on/off switches.

use crate::core::guild_config::GuildConfig;
use crate::discord::{Context, Error};

/// Toggle bot features on or off.
#[poise::command(
    slash_command,
    subcommands("bot", "duplicates", "logging", "ratelimit"),
    required_permissions = "MANAGE_MESSAGES",
    guild_only
)]
pub async fn toggle(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Flip a boolean in the guild config, persist it, and report the new state.
async fn flip(
    ctx: Context<'_>,
    label: &str,
    switch: fn(&mut GuildConfig) -> &mut bool,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    let (enabled, _) = ctx
        .data()
        .guild_configs
        .update(guild_id, move |config| {
            let flag = switch(config);
            *flag = !*flag;
            Ok(*flag)
        })
        .await?;

    tracing::info!(
        guild_id,
        user_id = ctx.author().id.get(),
        enabled,
        "{} toggled",
        label
    );

    let (emoji, state) = if enabled {
        ("✅", "enabled")
    } else {
        ("❌", "disabled")
    };
    ctx.send(
        poise::CreateReply::default()
            .content(format!("{emoji} {label} has been **{state}**."))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Turn the whole bot on or off for this server.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn bot(ctx: Context<'_>) -> Result<(), Error> {
    flip(ctx, "Bot", |config| &mut config.enabled).await
}

/// Turn duplicate detection on or off.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn duplicates(ctx: Context<'_>) -> Result<(), Error> {
    flip(ctx, "Duplicate detection", |config| {
        &mut config.duplicate_detection.enabled
    })
    .await
}

/// Turn deletion logging on or off.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn logging(ctx: Context<'_>) -> Result<(), Error> {
    flip(ctx, "Logging", |config| &mut config.logging.enabled).await
}

/// Turn the per-minute deletion cap on or off.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn ratelimit(ctx: Context<'_>) -> Result<(), Error> {
    flip(ctx, "Rate limiting", |config| &mut config.rate_limit.enabled).await
}
