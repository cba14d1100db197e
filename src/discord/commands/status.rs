// /status - read-only overview of the guild's duplicate filter.

use crate::core::guild_config::GuildConfig;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;
use std::time::Duration;

fn on_off(flag: bool) -> &'static str {
    if flag {
        "✅ Enabled"
    } else {
        "❌ Disabled"
    }
}

/// Render an uptime like `2d 3h 14m 5s`, dropping leading zero units.
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

fn detection_summary(config: &GuildConfig) -> String {
    let detection = &config.duplicate_detection;
    format!(
        "Time window: {}s\nMax duplicates: {}\nMin length: {} chars\nCheck bots: {}\nCase sensitive: {}",
        config.effective_time_window().num_seconds(),
        detection.max_duplicates,
        detection.min_message_length,
        if detection.check_bots { "Yes" } else { "No" },
        if detection.case_sensitive { "Yes" } else { "No" },
    )
}

/// Show the duplicate filter's status and settings for this server.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let data = ctx.data();

    let config = data.guild_configs.get_config(guild_id).await;
    let stats = data.detector.cache_stats();
    let actions = data
        .detector
        .actions_this_minute(guild_id, chrono::Utc::now());
    let guild_count = ctx.serenity_context().cache.guild_count();

    let log_channel = match config.logging.log_channel {
        Some(channel) => format!("<#{channel}>"),
        None => "Not set".to_string(),
    };

    let embed = serenity::CreateEmbed::new()
        .title("🤖 RemoveDupe Bot Status")
        .color(if config.detection_active() { 0x00ff00 } else { 0xff0000 })
        .field("Bot", on_off(config.enabled), true)
        .field(
            "Duplicate Detection",
            on_off(config.duplicate_detection.enabled),
            true,
        )
        .field("Logging", on_off(config.logging.enabled), true)
        .field("Detection Settings", detection_summary(&config), false)
        .field(
            "Rate Limit",
            format!(
                "{}\n{} actions/minute ({} this minute, {} scope)",
                on_off(config.rate_limit.enabled),
                config.rate_limit.max_actions_per_minute,
                actions,
                data.detector.rate_limit_scope(),
            ),
            false,
        )
        .field("Log Channel", log_channel, true)
        .field(
            "Whitelist",
            format!(
                "{} users, {} roles, {} channels",
                config.whitelist.users.len(),
                config.whitelist.roles.len(),
                config.whitelist.channels.len()
            ),
            true,
        )
        .field(
            "Statistics",
            format!(
                "Servers: {}\nCached fingerprints: {}\nUptime: {}",
                guild_count,
                stats.total_keys,
                format_uptime(data.started_at.elapsed())
            ),
            false,
        )
        .timestamp(serenity::Timestamp::now());

    ctx.send(
        poise::CreateReply::default()
            .embed(embed)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}
