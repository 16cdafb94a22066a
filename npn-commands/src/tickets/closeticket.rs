use npn_core::time::now_unix_secs;
use npn_core::{Context, EngineError, Error};
use npn_utils::permissions::member_is_admin;

use super::deliver;
use crate::CommandMeta;
use crate::support::{guild_only_message, rejection_message, reply_private};

pub const META: CommandMeta = CommandMeta {
    name: "closeticket",
    desc: "Close the ticket this channel belongs to.",
    category: "tickets",
    usage: "!closeticket",
};

#[poise::command(prefix_command, slash_command, category = "Tickets")]
pub async fn closeticket(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    let role_ids = match ctx.author_member().await {
        Some(member) => member.roles.clone(),
        None => Vec::new(),
    };
    let is_admin =
        member_is_admin(ctx.serenity_context(), guild_id, ctx.author().id, &role_ids).await?;
    let role_ids = role_ids.iter().map(|role| role.get()).collect::<Vec<_>>();

    let result = ctx
        .data()
        .dispatcher
        .close_ticket_in_channel(
            ctx.channel_id().get(),
            ctx.author().id.get(),
            is_admin,
            &role_ids,
            now_unix_secs(),
        )
        .await;

    match result {
        Ok(actions) => deliver(ctx, actions, "🔒 Closing ticket.").await,
        Err(EngineError::TicketNotFound) => {
            reply_private(ctx, "This channel is not a ticket.").await
        }
        Err(err) => reply_private(ctx, rejection_message(err)?).await,
    }
}
