use npn_core::sticky as sticky_engine;
use npn_core::{Context, Error};
use poise::serenity_prelude as serenity;

use crate::CommandMeta;
use crate::support::{
    guild_only_message, queue_actions, rejection_message, reply_private, require_permission,
    usage_message,
};

pub const META: CommandMeta = CommandMeta {
    name: "sticky",
    desc: "Keep a message pinned to the bottom of this channel.",
    category: "config",
    usage: "!sticky <message>",
};

#[poise::command(prefix_command, slash_command, category = "Config")]
pub async fn sticky(
    ctx: Context<'_>,
    #[description = "Message to keep at the bottom"]
    #[rest]
    message: Option<String>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    if !require_permission(ctx, guild_id, serenity::Permissions::ADMINISTRATOR).await? {
        return Ok(());
    }

    let Some(message) = message.filter(|text| !text.trim().is_empty()) else {
        ctx.say(usage_message(META.usage)).await?;
        return Ok(());
    };

    match sticky_engine::set(
        &ctx.data().db,
        guild_id.get(),
        ctx.channel_id().get(),
        &message,
    )
    .await
    {
        Ok(actions) => {
            queue_actions(ctx, actions).await?;
            reply_private(ctx, "📌 Sticky message set.").await
        }
        Err(err) => reply_private(ctx, rejection_message(err)?).await,
    }
}
