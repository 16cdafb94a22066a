use npn_core::{Context, Error};
use npn_database::model::campaigns::CampaignKind;
use poise::serenity_prelude as serenity;

use super::resolve_campaign;
use crate::CommandMeta;
use crate::support::{
    guild_only_message, queue_actions, rejection_message, reply_private, require_permission,
};

pub const META: CommandMeta = CommandMeta {
    name: "greroll",
    desc: "Draw new winners for an ended giveaway.",
    category: "campaigns",
    usage: "!greroll <message_id|link>",
};

#[poise::command(prefix_command, slash_command, category = "Campaigns")]
pub async fn greroll(
    ctx: Context<'_>,
    #[description = "Giveaway message id or link"] message_id: String,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    if !require_permission(ctx, guild_id, serenity::Permissions::ADMINISTRATOR).await? {
        return Ok(());
    }

    let Some(campaign) =
        resolve_campaign(ctx, guild_id, &message_id, CampaignKind::Giveaway).await?
    else {
        return Ok(());
    };

    match ctx.data().dispatcher.reroll(campaign.id).await {
        Ok(actions) => {
            queue_actions(ctx, actions).await?;
            reply_private(ctx, "🎲 Rerolled.").await
        }
        Err(err) => reply_private(ctx, rejection_message(err)?).await,
    }
}
