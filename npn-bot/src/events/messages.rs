use poise::serenity_prelude as serenity;
use tracing::warn;

use npn_core::events::MessageSent;
use npn_core::{Data, InboundEvent};
use npn_utils::permissions::member_is_admin;

use super::forward;

pub async fn handle_message(ctx: &serenity::Context, data: &Data, message: &serenity::Message) {
    let Some(guild_id) = message.guild_id else {
        return;
    };

    let author_is_bot = message.author.bot || message.webhook_id.is_some();
    let author_is_admin = if author_is_bot {
        false
    } else {
        let roles = message
            .member
            .as_ref()
            .map(|member| member.roles.clone())
            .unwrap_or_default();
        match member_is_admin(ctx, guild_id, message.author.id, &roles).await {
            Ok(is_admin) => is_admin,
            Err(source) => {
                warn!(?source, guild_id = guild_id.get(), "failed to resolve author permissions");
                false
            }
        }
    };

    let event = InboundEvent::MessageSent(MessageSent {
        guild_id: guild_id.get(),
        channel_id: message.channel_id.get(),
        user_id: message.author.id.get(),
        message_id: message.id.get(),
        content: message.content.clone(),
        timestamp: message.timestamp.unix_timestamp().max(0) as u64,
        author_is_bot,
        author_is_admin,
    });
    forward(data, event).await;
}
