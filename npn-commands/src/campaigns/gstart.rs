use npn_core::time::now_unix_secs;
use npn_core::{Context, Error};
use npn_database::model::campaigns::CampaignPayload;
use npn_utils::embed::giveaway_embed;
use npn_utils::parse::parse_campaign_duration;
use poise::serenity_prelude as serenity;

use super::announce_and_start;
use crate::CommandMeta;
use crate::support::{guild_only_message, require_permission, usage_message};

pub const META: CommandMeta = CommandMeta {
    name: "gstart",
    desc: "Start a giveaway in this channel.",
    category: "campaigns",
    usage: "!gstart <duration> <winners> <prize>",
};

#[poise::command(prefix_command, slash_command, category = "Campaigns")]
pub async fn gstart(
    ctx: Context<'_>,
    #[description = "Duration, e.g. 30m, 2h, 1d"] duration: String,
    #[description = "Number of winners"] winners: u32,
    #[description = "What is being given away"]
    #[rest]
    prize: String,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    if !require_permission(ctx, guild_id, serenity::Permissions::ADMINISTRATOR).await? {
        return Ok(());
    }

    let Some(duration_seconds) = parse_campaign_duration(&duration) else {
        ctx.say(format!(
            "Invalid duration `{duration}`. Use a number with s, m, h, d or w, up to 30 days.\n{}",
            usage_message(META.usage)
        ))
        .await?;
        return Ok(());
    };

    let prize = prize.trim();
    if prize.is_empty() || winners == 0 {
        ctx.say(usage_message(META.usage)).await?;
        return Ok(());
    }

    let ends_at = now_unix_secs() + duration_seconds;
    let embed = giveaway_embed(prize, winners, Some(ends_at), ctx.author().id.get());
    let payload = CampaignPayload::Giveaway {
        prize: prize.to_owned(),
        winners_count: winners,
    };

    announce_and_start(ctx, guild_id, embed, Some(duration_seconds), payload).await
}
