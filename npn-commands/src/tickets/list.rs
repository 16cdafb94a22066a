use npn_core::tickets::list_open;
use npn_core::{Context, Error};
use npn_database::model::tickets::Ticket;
use npn_utils::embed::notice_embed;
use npn_utils::formatting::{relative_time, ticket_label};
use poise::CreateReply;
use poise::serenity_prelude as serenity;

use crate::CommandMeta;
use crate::support::{guild_only_message, rejection_message, require_permission};

pub const META: CommandMeta = CommandMeta {
    name: "tickets",
    desc: "List open tickets.",
    category: "tickets",
    usage: "!tickets",
};

#[poise::command(prefix_command, slash_command, category = "Tickets")]
pub async fn tickets(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    if !require_permission(ctx, guild_id, serenity::Permissions::MANAGE_CHANNELS).await? {
        return Ok(());
    }

    let open = match list_open(&ctx.data().db, guild_id.get()).await {
        Ok(open) => open,
        Err(err) => {
            ctx.say(rejection_message(err)?).await?;
            return Ok(());
        }
    };

    if open.is_empty() {
        ctx.say("There are no open tickets.").await?;
        return Ok(());
    }

    let body = open.iter().map(ticket_line).collect::<Vec<_>>().join("\n");
    ctx.send(CreateReply::default().embed(notice_embed("🎫 Open tickets", body)))
        .await?;
    Ok(())
}

fn ticket_line(ticket: &Ticket) -> String {
    let channel = ticket
        .channel_id
        .map_or_else(|| "pending channel".to_owned(), |id| format!("<#{id}>"));
    format!(
        "{} · {channel} · <@{}> · opened {}",
        ticket_label(ticket.number),
        ticket.creator_id,
        relative_time(ticket.created_at)
    )
}
