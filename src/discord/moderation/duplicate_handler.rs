// Discord-specific duplicate handling - turns a detector verdict into
// Discord actions (delete, log embed, optional channel notice).

use crate::core::guild_config::GuildConfig;
use crate::core::moderation::{truncate_content, InboundMessage};
use crate::discord::{Data, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::time::Duration;

// Discord JSON error codes we react to
const UNKNOWN_CHANNEL: isize = 10003;
const UNKNOWN_MESSAGE: isize = 10008;
const MISSING_PERMISSIONS: isize = 50013;

const LOG_EMBED_COLOR: u32 = 0xff9900;
const EMBED_FIELD_LIMIT: usize = 1024;
const NOTICE_LIFETIME: Duration = Duration::from_secs(5);

/// Check a message for duplicates and delete it if it is one.
///
/// Returns `true` if the message was a duplicate and was handled.
pub async fn handle_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<bool, Error> {
    // Never police ourselves
    let bot_id = ctx.cache.current_user().id;
    if msg.author.id == bot_id {
        return Ok(false);
    }

    // DMs have no config to apply
    let Some(guild_id) = msg.guild_id else {
        return Ok(false);
    };
    let guild_id = guild_id.get();

    let config = data.guild_configs.get_config(guild_id).await;
    let inbound = to_inbound(msg);

    if !data.detector.evaluate(&inbound, &config, Utc::now()) {
        return Ok(false);
    }

    handle_duplicate(ctx, msg, guild_id, &config, data).await;
    Ok(true)
}

fn to_inbound(msg: &serenity::Message) -> InboundMessage {
    let author_role_ids = msg
        .member
        .as_ref()
        .map(|member| member.roles.iter().map(|role| role.get()).collect())
        .unwrap_or_default();

    InboundMessage {
        id: msg.id.get(),
        author_id: msg.author.id.get(),
        author_is_bot: msg.author.bot,
        content: msg.content.clone(),
        channel_id: msg.channel_id.get(),
        guild_id: msg.guild_id.map(|g| g.get()),
        author_role_ids,
    }
}

/// Pull the Discord JSON error code out of a failed HTTP call, if there is one.
fn discord_error_code(error: &::serenity::Error) -> Option<isize> {
    match error {
        ::serenity::Error::Http(::serenity::http::HttpError::UnsuccessfulRequest(response)) => {
            Some(response.error.code)
        }
        _ => None,
    }
}

/// Delete the duplicate, then log it. Failures are logged, never propagated,
/// so one bad message can't take the event loop down with it.
async fn handle_duplicate(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    guild_id: u64,
    config: &GuildConfig,
    data: &Data,
) {
    if let Err(e) = msg.delete(&ctx.http).await {
        match discord_error_code(&e) {
            Some(UNKNOWN_MESSAGE) => {
                tracing::warn!(message_id = msg.id.get(), "Message was already deleted");
            }
            Some(MISSING_PERMISSIONS) => {
                tracing::error!(
                    guild_id,
                    channel_id = msg.channel_id.get(),
                    "Missing permissions to delete message"
                );
            }
            _ => tracing::error!("Error handling duplicate message: {}", e),
        }
        return;
    }

    tracing::info!(
        guild_id,
        channel_id = msg.channel_id.get(),
        "Deleted duplicate message from {} ({}): \"{}\"",
        msg.author.tag(),
        msg.author.id,
        truncate_content(&msg.content, 100)
    );

    if config.logging.enabled {
        if let Some(log_channel) = config.logging.log_channel {
            send_log_embed(ctx, msg, guild_id, log_channel, data).await;
        }
    }

    if config.logging.verbose {
        send_channel_notice(ctx, msg).await;
    }
}

/// The content field of the log embed.
fn log_content(content: &str) -> String {
    if content.is_empty() {
        "*No text content*".to_string()
    } else {
        // Leave room for the ellipsis inside Discord's field limit
        truncate_content(content, EMBED_FIELD_LIMIT - 3)
    }
}

fn log_embed(msg: &serenity::Message) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("🗑️ Duplicate Message Deleted")
        .color(LOG_EMBED_COLOR)
        .field(
            "User",
            format!("<@{}> ({})", msg.author.id, msg.author.tag()),
            true,
        )
        .field("Channel", format!("<#{}>", msg.channel_id), true)
        .field("Content", log_content(&msg.content), false)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "User ID: {} | Message ID: {}",
            msg.author.id, msg.id
        )))
        .timestamp(serenity::Timestamp::now())
}

async fn send_log_embed(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    guild_id: u64,
    log_channel: u64,
    data: &Data,
) {
    let result = serenity::ChannelId::new(log_channel)
        .send_message(&ctx.http, serenity::CreateMessage::new().embed(log_embed(msg)))
        .await;

    let Err(e) = result else {
        return;
    };

    match discord_error_code(&e) {
        Some(UNKNOWN_CHANNEL) => {
            tracing::warn!(
                guild_id,
                log_channel,
                "Log channel no longer exists, clearing it"
            );
            let cleared = data
                .guild_configs
                .update(guild_id, |config| {
                    // Only clear if nobody pointed it somewhere else meanwhile
                    if config.logging.log_channel == Some(log_channel) {
                        config.logging.log_channel = None;
                    }
                    Ok(())
                })
                .await;
            if let Err(e) = cleared {
                tracing::error!(guild_id, "Failed to clear stale log channel: {}", e);
            }
        }
        Some(MISSING_PERMISSIONS) => {
            tracing::error!(guild_id, log_channel, "Missing permissions in log channel");
        }
        _ => tracing::error!(guild_id, "Error sending deletion log: {}", e),
    }
}

/// Tell the channel what happened, then tidy the notice away.
async fn send_channel_notice(ctx: &serenity::Context, msg: &serenity::Message) {
    let notice = format!(
        "🗑️ Duplicate message from <@{}> was automatically deleted.",
        msg.author.id
    );

    let sent = match msg.channel_id.say(&ctx.http, notice).await {
        Ok(sent) => sent,
        Err(e) => {
            tracing::warn!("Failed to send duplicate notice: {}", e);
            return;
        }
    };

    let http = ctx.http.clone();
    tokio::spawn(async move {
        tokio::time::sleep(NOTICE_LIFETIME).await;
        if let Err(e) = sent.delete(&http).await {
            tracing::debug!("Failed to delete duplicate notice: {}", e);
        }
    });
}
