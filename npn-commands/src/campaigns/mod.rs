pub mod endpoll;
pub mod gend;
pub mod greroll;
pub mod gstart;
pub mod list;
pub mod poll;

use npn_core::campaigns::{self as engine, StartCampaign};
use npn_core::time::now_unix_secs;
use npn_core::{Context, Error};
use npn_database::model::campaigns::{Campaign, CampaignKind, CampaignPayload, EndReason};
use npn_utils::parse::parse_message_id;
use poise::serenity_prelude as serenity;
use tracing::{info, warn};

use crate::support::{message_link, queue_actions, rejection_message, reply_private};

/// Look up the campaign a command refers to, replying when it does not fit.
pub(crate) async fn resolve_campaign(
    ctx: Context<'_>,
    guild_id: serenity::GuildId,
    raw_message: &str,
    kind: CampaignKind,
) -> Result<Option<Campaign>, Error> {
    let Some(message_id) = parse_message_id(raw_message) else {
        reply_private(ctx, "Provide a message id or message link.").await?;
        return Ok(None);
    };

    let campaign = match engine::get(&ctx.data().db, message_id).await {
        Ok(campaign) => campaign,
        Err(err) => {
            reply_private(ctx, rejection_message(err)?).await?;
            return Ok(None);
        }
    };

    if campaign.guild_id != guild_id.get() || campaign.kind() != kind {
        reply_private(ctx, format!("No {kind} found for that message.")).await?;
        return Ok(None);
    }

    Ok(Some(campaign))
}

/// Post the announcement, register it, and queue its entry reactions.
pub(crate) async fn announce_and_start(
    ctx: Context<'_>,
    guild_id: serenity::GuildId,
    embed: serenity::CreateEmbed,
    duration_seconds: Option<u64>,
    payload: CampaignPayload,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;

    let kind = payload.kind();
    let announcement = ctx
        .channel_id()
        .send_message(ctx.http(), serenity::CreateMessage::new().embed(embed))
        .await?;

    let request = StartCampaign {
        guild_id: guild_id.get(),
        channel_id: announcement.channel_id.get(),
        message_id: announcement.id.get(),
        creator_id: ctx.author().id.get(),
        duration_seconds,
        payload,
    };

    match ctx
        .data()
        .dispatcher
        .start_campaign(request, now_unix_secs())
        .await
    {
        Ok((campaign, actions)) => {
            info!(
                guild_id = campaign.guild_id,
                campaign_id = campaign.id,
                %kind,
                "campaign started"
            );
            queue_actions(ctx, actions).await?;
            reply_private(
                ctx,
                format!(
                    "✅ Started: {}",
                    message_link(campaign.guild_id, campaign.channel_id, campaign.id)
                ),
            )
            .await
        }
        Err(err) => {
            if let Err(source) = announcement.delete(ctx.http()).await {
                warn!(?source, "failed to remove announcement for rejected campaign");
            }
            reply_private(ctx, rejection_message(err)?).await
        }
    }
}

/// Manually end a campaign and queue its announcement.
pub(crate) async fn end_manually(
    ctx: Context<'_>,
    guild_id: serenity::GuildId,
    raw_message: &str,
    kind: CampaignKind,
) -> Result<(), Error> {
    let Some(campaign) = resolve_campaign(ctx, guild_id, raw_message, kind).await? else {
        return Ok(());
    };

    match ctx
        .data()
        .dispatcher
        .end_campaign(campaign.id, EndReason::Manual, now_unix_secs())
        .await
    {
        Ok(actions) => {
            queue_actions(ctx, actions).await?;
            reply_private(ctx, format!("✅ Ended the {kind}.")).await
        }
        Err(err) => reply_private(ctx, rejection_message(err)?).await,
    }
}
