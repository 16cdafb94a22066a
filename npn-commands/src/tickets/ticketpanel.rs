use npn_core::actions::ButtonSpec;
use npn_core::events::TICKET_OPEN_BUTTON;
use npn_core::{Context, Error};
use npn_utils::actions::create_button;
use npn_utils::embed::ticket_panel_embed;
use poise::serenity_prelude as serenity;

use crate::CommandMeta;
use crate::support::{guild_only_message, reply_private, require_permission};

pub const META: CommandMeta = CommandMeta {
    name: "ticketpanel",
    desc: "Post a panel with a button for opening tickets.",
    category: "tickets",
    usage: "!ticketpanel",
};

#[poise::command(prefix_command, slash_command, category = "Tickets")]
pub async fn ticketpanel(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    if !require_permission(ctx, guild_id, serenity::Permissions::ADMINISTRATOR).await? {
        return Ok(());
    }

    let open = ButtonSpec {
        custom_id: TICKET_OPEN_BUTTON.to_owned(),
        label: "🎫 Open Ticket".to_owned(),
    };
    let panel = serenity::CreateMessage::new()
        .embed(ticket_panel_embed())
        .components(vec![serenity::CreateActionRow::Buttons(vec![create_button(
            &open,
        )])]);

    ctx.channel_id().send_message(ctx.http(), panel).await?;
    reply_private(ctx, "Ticket panel posted.").await
}
