// Bot presence.
//
// The status line is the only hint members get that messages in the server
// are being watched, so it is set once on ready and left alone.

use poise::serenity_prelude as serenity;

const WATCHING_TEXT: &str = "for duplicate messages";

/// Called once the bot is ready.
pub fn on_ready(ctx: &serenity::Context) {
    let activity = serenity::ActivityData::watching(WATCHING_TEXT);
    ctx.set_presence(Some(activity), serenity::OnlineStatus::Online);
}
