use npn_core::time::now_unix_secs;
use npn_core::{Context, Error};

use super::deliver;
use crate::CommandMeta;
use crate::support::{guild_only_message, rejection_message, reply_private};

pub const META: CommandMeta = CommandMeta {
    name: "ticket",
    desc: "Open a private support ticket.",
    category: "tickets",
    usage: "!ticket",
};

#[poise::command(prefix_command, slash_command, category = "Tickets")]
pub async fn ticket(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    let result = ctx
        .data()
        .dispatcher
        .open_ticket(
            guild_id.get(),
            ctx.channel_id().get(),
            ctx.author().id.get(),
            now_unix_secs(),
        )
        .await;

    match result {
        Ok(actions) => deliver(ctx, actions, "🎫 Your ticket is being created.").await,
        Err(err) => reply_private(ctx, rejection_message(err)?).await,
    }
}
