use poise::serenity_prelude as serenity;

use npn_core::{Data, InboundEvent};

use super::forward;

pub async fn handle_member_joined(data: &Data, member: &serenity::Member) {
    let event = InboundEvent::MemberJoined {
        guild_id: member.guild_id.get(),
        user_id: member.user.id.get(),
    };
    forward(data, event).await;
}

pub async fn handle_member_left(data: &Data, guild_id: serenity::GuildId, user: &serenity::User) {
    let event = InboundEvent::MemberLeft {
        guild_id: guild_id.get(),
        user_id: user.id.get(),
    };
    forward(data, event).await;
}
