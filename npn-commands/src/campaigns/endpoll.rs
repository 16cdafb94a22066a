use npn_core::{Context, Error};
use npn_database::model::campaigns::CampaignKind;
use poise::serenity_prelude as serenity;

use super::end_manually;
use crate::CommandMeta;
use crate::support::{guild_only_message, require_permission};

pub const META: CommandMeta = CommandMeta {
    name: "endpoll",
    desc: "Close a poll and post its results.",
    category: "campaigns",
    usage: "!endpoll <message_id|link>",
};

#[poise::command(prefix_command, slash_command, category = "Campaigns")]
pub async fn endpoll(
    ctx: Context<'_>,
    #[description = "Poll message id or link"] message_id: String,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    if !require_permission(ctx, guild_id, serenity::Permissions::ADMINISTRATOR).await? {
        return Ok(());
    }

    end_manually(ctx, guild_id, &message_id, CampaignKind::Poll).await
}
