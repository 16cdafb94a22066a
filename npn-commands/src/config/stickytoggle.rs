use npn_core::sticky as sticky_engine;
use npn_core::{Context, EngineError, Error};
use poise::serenity_prelude as serenity;

use crate::CommandMeta;
use crate::support::{guild_only_message, rejection_message, reply_private, require_permission};

pub const META: CommandMeta = CommandMeta {
    name: "stickytoggle",
    desc: "Pause or resume this channel's sticky message.",
    category: "config",
    usage: "!stickytoggle <true|false>",
};

#[poise::command(prefix_command, slash_command, category = "Config")]
pub async fn stickytoggle(
    ctx: Context<'_>,
    #[description = "Whether the sticky should keep reposting"] enabled: bool,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    if !require_permission(ctx, guild_id, serenity::Permissions::ADMINISTRATOR).await? {
        return Ok(());
    }

    match sticky_engine::set_enabled(&ctx.data().db, ctx.channel_id().get(), enabled).await {
        Ok(()) if enabled => reply_private(ctx, "📌 Sticky message resumed.").await,
        Ok(()) => reply_private(ctx, "Sticky message paused.").await,
        Err(EngineError::ConfigNotFound) => {
            reply_private(ctx, "This channel has no sticky message.").await
        }
        Err(err) => reply_private(ctx, rejection_message(err)?).await,
    }
}
