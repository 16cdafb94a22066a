use poise::serenity_prelude as serenity;

use npn_core::{Data, InboundEvent};

use super::forward;

/// A deleted ticket channel closes its ticket.
pub async fn handle_channel_deleted(data: &Data, channel: &serenity::GuildChannel) {
    let event = InboundEvent::ChannelDeleted {
        guild_id: channel.guild_id.get(),
        channel_id: channel.id.get(),
    };
    forward(data, event).await;
}
