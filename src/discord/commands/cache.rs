// /cache - inspect or drop the in-memory duplicate cache.

use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Inspect the duplicate cache.
#[poise::command(
    slash_command,
    subcommands("stats", "clear"),
    required_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn cache(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show how much the duplicate cache is currently tracking.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn stats(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let detector = &ctx.data().detector;
    let stats = detector.cache_stats();

    let embed = serenity::CreateEmbed::new()
        .title("🗄️ Duplicate Cache")
        .color(0x5865f2)
        .field("Tracked fingerprints", stats.total_keys.to_string(), true)
        .field("Recorded sightings", stats.total_sightings.to_string(), true)
        .field(
            "Deletions this minute",
            detector
                .actions_this_minute(guild_id, chrono::Utc::now())
                .to_string(),
            true,
        )
        .field(
            "Rate limit scope",
            detector.rate_limit_scope().to_string(),
            true,
        );

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Forget every remembered message. Counting starts over for all servers.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn clear(ctx: Context<'_>) -> Result<(), Error> {
    let detector = &ctx.data().detector;
    let dropped = detector.tracked_fingerprints();
    detector.clear();

    tracing::info!(
        user_id = ctx.author().id.get(),
        dropped,
        "Duplicate cache cleared by command"
    );

    ctx.send(
        poise::CreateReply::default()
            .content(format!("🧹 Cleared {dropped} cached fingerprints."))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}
