use npn_core::campaigns::list_active;
use npn_core::{Context, Error};
use npn_database::model::campaigns::{Campaign, CampaignPayload};
use npn_utils::embed::notice_embed;
use npn_utils::formatting::relative_time;
use poise::CreateReply;

use crate::CommandMeta;
use crate::support::{guild_only_message, message_link, rejection_message};

pub const META: CommandMeta = CommandMeta {
    name: "campaigns",
    desc: "List running giveaways and polls.",
    category: "campaigns",
    usage: "!campaigns",
};

#[poise::command(prefix_command, slash_command, category = "Campaigns")]
pub async fn campaigns(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    let active = match list_active(&ctx.data().db, guild_id.get()).await {
        Ok(active) => active,
        Err(err) => {
            ctx.say(rejection_message(err)?).await?;
            return Ok(());
        }
    };

    if active.is_empty() {
        ctx.say("No giveaways or polls are running.").await?;
        return Ok(());
    }

    let body = active.iter().map(campaign_line).collect::<Vec<_>>().join("\n");
    ctx.send(CreateReply::default().embed(notice_embed("Running campaigns", body)))
        .await?;
    Ok(())
}

fn campaign_line(campaign: &Campaign) -> String {
    let label = match &campaign.payload {
        CampaignPayload::Giveaway { prize, .. } => format!("🎉 **{prize}**"),
        CampaignPayload::Poll { question, .. } => format!("📊 **{question}**"),
    };
    let ends = campaign
        .ends_at
        .map_or_else(|| "no end time".to_owned(), relative_time);

    format!(
        "{label} · ends {ends} · [jump]({})",
        message_link(campaign.guild_id, campaign.channel_id, campaign.id)
    )
}
