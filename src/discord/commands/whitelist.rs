// /whitelist - users, roles and channels that are never checked for duplicates.

use crate::core::guild_config::{ConfigError, WhitelistKind};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum EntryKind {
    #[name = "User"]
    User,
    #[name = "Role"]
    Role,
    #[name = "Channel"]
    Channel,
}

impl From<EntryKind> for WhitelistKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::User => WhitelistKind::Users,
            EntryKind::Role => WhitelistKind::Roles,
            EntryKind::Channel => WhitelistKind::Channels,
        }
    }
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum ClearTarget {
    #[name = "Users"]
    Users,
    #[name = "Roles"]
    Roles,
    #[name = "Channels"]
    Channels,
    #[name = "All"]
    All,
}

impl ClearTarget {
    fn kind(self) -> Option<WhitelistKind> {
        match self {
            ClearTarget::Users => Some(WhitelistKind::Users),
            ClearTarget::Roles => Some(WhitelistKind::Roles),
            ClearTarget::Channels => Some(WhitelistKind::Channels),
            ClearTarget::All => None,
        }
    }
}

/// Accepts a raw snowflake or a mention such as `<@123>`, `<@&123>` or `<#123>`.
pub fn parse_id(input: &str) -> Option<u64> {
    let trimmed = input
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim_start_matches(['@', '#', '&', '!']);
    trimmed.parse::<u64>().ok().filter(|id| *id != 0)
}

/// Manage the duplicate filter's whitelist.
#[poise::command(
    slash_command,
    subcommands("add", "remove", "list", "clear"),
    required_permissions = "MANAGE_MESSAGES",
    guild_only
)]
pub async fn whitelist(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

async fn reply(ctx: Context<'_>, content: String) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

/// Exempt a user, role or channel from duplicate checks.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn add(
    ctx: Context<'_>,
    #[description = "What kind of ID this is"] kind: EntryKind,
    #[description = "ID or mention"] id: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let Some(id) = parse_id(&id) else {
        return reply(ctx, format!("❌ `{id}` is not a valid ID.")).await;
    };
    let kind = WhitelistKind::from(kind);

    match ctx.data().guild_configs.whitelist_add(guild_id, kind, id).await {
        Ok(()) => {
            tracing::info!(
                guild_id,
                user_id = ctx.author().id.get(),
                %kind,
                id,
                "Whitelist entry added"
            );
            reply(ctx, format!("✅ Added {} to the {kind} whitelist.", kind.mention(id))).await
        }
        Err(ConfigError::AlreadyWhitelisted { .. }) => {
            reply(ctx, format!("ℹ️ {} is already whitelisted.", kind.mention(id))).await
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove a whitelist entry.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "What kind of ID this is"] kind: EntryKind,
    #[description = "ID or mention"] id: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let Some(id) = parse_id(&id) else {
        return reply(ctx, format!("❌ `{id}` is not a valid ID.")).await;
    };
    let kind = WhitelistKind::from(kind);

    match ctx
        .data()
        .guild_configs
        .whitelist_remove(guild_id, kind, id)
        .await
    {
        Ok(()) => {
            tracing::info!(
                guild_id,
                user_id = ctx.author().id.get(),
                %kind,
                id,
                "Whitelist entry removed"
            );
            reply(
                ctx,
                format!("✅ Removed {} from the {kind} whitelist.", kind.mention(id)),
            )
            .await
        }
        Err(ConfigError::NotWhitelisted { .. }) => {
            reply(ctx, format!("ℹ️ {} is not whitelisted.", kind.mention(id))).await
        }
        Err(e) => Err(e.into()),
    }
}

fn render_entries(kind: WhitelistKind, ids: impl Iterator<Item = u64>) -> String {
    let mentions: Vec<String> = ids.map(|id| kind.mention(id)).collect();
    if mentions.is_empty() {
        "None".to_string()
    } else {
        mentions.join(", ")
    }
}

/// Show everything that is currently whitelisted.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();
    let config = ctx.data().guild_configs.get_config(guild_id).await;

    let mut embed = serenity::CreateEmbed::new()
        .title("📋 Whitelist")
        .color(0x5865f2);
    for (title, kind) in [
        ("Users", WhitelistKind::Users),
        ("Roles", WhitelistKind::Roles),
        ("Channels", WhitelistKind::Channels),
    ] {
        let entries = config.whitelist.entries(kind).iter().copied();
        embed = embed.field(title, render_entries(kind, entries), false);
    }

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Empty one of the whitelists, or all of them.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn clear(
    ctx: Context<'_>,
    #[description = "Which list to clear"] target: ClearTarget,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?.get();

    let removed = ctx
        .data()
        .guild_configs
        .whitelist_clear(guild_id, target.kind())
        .await?;

    tracing::info!(
        guild_id,
        user_id = ctx.author().id.get(),
        ?target,
        removed,
        "Whitelist cleared"
    );

    let scope = match target.kind() {
        Some(kind) => format!("{kind} whitelist"),
        None => "whitelists".to_string(),
    };
    reply(ctx, format!("🧹 Cleared the {scope} ({removed} entries removed).")).await
}
