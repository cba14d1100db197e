// /settings - tune how duplicates are detected and where deletions are logged.
//
// Discord enforces the numeric ranges on the option itself, so values that
// reach the handlers are already inside the allowed bounds.

use crate::core::guild_config::GuildConfig;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Configure duplicate detection for this server.
#[poise::command(
    slash_command,
    subcommands(
        "timewindow",
        "maxduplicates",
        "checkbots",
        "casesensitive",
        "minlength",
        "logchannel",
        "verbose",
        "ratelimit",
        "backup",
        "reset"
    ),
    required_permissions = "MANAGE_MESSAGES",
    guild_only
)]
pub async fn settings(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

async fn reply(ctx: Context<'_>, content: String) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

/// Persist a single setting change and log who made it.
async fn apply(
    ctx: Context<'_>,
    setting: &str,
    change: impl FnOnce(&mut GuildConfig) + Send,
) -> Result<GuildConfig, Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    let (_, config) = ctx
        .data()
        .guild_configs
        .update(guild_id, |config| {
            change(config);
            Ok(())
        })
        .await?;

    tracing::info!(
        guild_id,
        user_id = ctx.author().id.get(),
        setting,
        "Setting changed"
    );
    Ok(config)
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

/// How long a message is remembered when looking for duplicates.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn timewindow(
    ctx: Context<'_>,
    #[description = "Window in seconds (60-3600)"]
    #[min = 60]
    #[max = 3600]
    seconds: u64,
) -> Result<(), Error> {
    apply(ctx, "time_window", move |config| {
        config.duplicate_detection.time_window_ms = seconds * 1000;
    })
    .await?;

    reply(ctx, format!("⏱️ Time window set to **{seconds} seconds**.")).await
}

/// How many copies of a message are allowed before the next one is removed.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn maxduplicates(
    ctx: Context<'_>,
    #[description = "Allowed copies (1-10)"]
    #[min = 1]
    #[max = 10]
    count: u32,
) -> Result<(), Error> {
    apply(ctx, "max_duplicates", move |config| {
        config.duplicate_detection.max_duplicates = count;
    })
    .await?;

    reply(ctx, format!("🔢 Max duplicates set to **{count}**.")).await
}

/// Whether messages from other bots are checked.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn checkbots(
    ctx: Context<'_>,
    #[description = "Check bot messages"] enabled: bool,
) -> Result<(), Error> {
    apply(ctx, "check_bots", move |config| {
        config.duplicate_detection.check_bots = enabled;
    })
    .await?;

    reply(ctx, format!("🤖 Bot message checking **{}**.", yes_no(enabled))).await
}

/// Whether "Hello" and "hello" count as different messages.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn casesensitive(
    ctx: Context<'_>,
    #[description = "Compare with case"] enabled: bool,
) -> Result<(), Error> {
    apply(ctx, "case_sensitive", move |config| {
        config.duplicate_detection.case_sensitive = enabled;
    })
    .await?;

    reply(ctx, format!("🔠 Case sensitivity **{}**.", yes_no(enabled))).await
}

/// Messages shorter than this are never checked.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn minlength(
    ctx: Context<'_>,
    #[description = "Minimum length in characters (1-100)"]
    #[min = 1]
    #[max = 100]
    length: u32,
) -> Result<(), Error> {
    apply(ctx, "min_message_length", move |config| {
        config.duplicate_detection.min_message_length = length;
    })
    .await?;

    reply(ctx, format!("📏 Minimum message length set to **{length}**.")).await
}

/// Where deletions are logged. Leave empty to stop posting log embeds.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn logchannel(
    ctx: Context<'_>,
    #[description = "Channel for deletion logs"]
    #[channel_types("Text")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let channel_id = channel.as_ref().map(|c| c.id.get());

    apply(ctx, "log_channel", move |config| {
        config.logging.log_channel = channel_id;
    })
    .await?;

    let content = match channel_id {
        Some(id) => format!("📝 Deletions will be logged in <#{id}>."),
        None => "📝 Log channel cleared.".to_string(),
    };
    reply(ctx, content).await
}

/// Post a short-lived notice in the channel whenever a duplicate is removed.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn verbose(
    ctx: Context<'_>,
    #[description = "Announce deletions in the channel"] enabled: bool,
) -> Result<(), Error> {
    apply(ctx, "verbose", move |config| {
        config.logging.verbose = enabled;
    })
    .await?;

    reply(ctx, format!("📢 In-channel notices **{}**.", yes_no(enabled))).await
}

/// Most duplicate deletions performed per minute.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn ratelimit(
    ctx: Context<'_>,
    #[description = "Deletions per minute (1-60)"]
    #[min = 1]
    #[max = 60]
    actions: u32,
) -> Result<(), Error> {
    apply(ctx, "max_actions_per_minute", move |config| {
        config.rate_limit.max_actions_per_minute = actions;
    })
    .await?;

    reply(ctx, format!("🚦 Rate limit set to **{actions} deletions/minute**.")).await
}

/// Save a copy of the current configuration.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn backup(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    let content = match ctx.data().guild_configs.backup_config(guild_id).await? {
        Some(_) => "💾 Configuration backed up.".to_string(),
        None => "ℹ️ This server has no saved configuration yet.".to_string(),
    };
    reply(ctx, content).await
}

/// Restore every setting to its default. A backup is taken first.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn reset(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    let backup = ctx.data().guild_configs.reset_config(guild_id).await?;
    tracing::info!(
        guild_id,
        user_id = ctx.author().id.get(),
        "Configuration reset"
    );

    let content = if backup.is_some() {
        "♻️ Settings reset to defaults. The previous configuration was backed up."
    } else {
        "♻️ Settings reset to defaults."
    };
    reply(ctx, content.to_string()).await
}
