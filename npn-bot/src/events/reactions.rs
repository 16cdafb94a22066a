use poise::serenity_prelude as serenity;

use npn_core::events::ReactionChanged;
use npn_core::{Data, InboundEvent};

use super::forward;

/// Only unicode emoji take part in campaigns.
pub fn reaction_emoji(emoji: &serenity::ReactionType) -> Option<&str> {
    match emoji {
        serenity::ReactionType::Unicode(value) => Some(value.as_str()),
        _ => None,
    }
}

pub async fn handle_reaction(
    ctx: &serenity::Context,
    data: &Data,
    reaction: &serenity::Reaction,
    added: bool,
) {
    let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
        return;
    };
    let Some(emoji) = reaction_emoji(&reaction.emoji) else {
        return;
    };

    let user_is_bot = user_id == ctx.cache.current_user().id
        || reaction
            .member
            .as_ref()
            .map(|member| member.user.bot)
            .or_else(|| ctx.cache.user(user_id).map(|user| user.bot))
            .unwrap_or(false);

    let event = InboundEvent::ReactionChanged(ReactionChanged {
        guild_id: guild_id.get(),
        channel_id: reaction.channel_id.get(),
        message_id: reaction.message_id.get(),
        user_id: user_id.get(),
        emoji: emoji.to_owned(),
        added,
        user_is_bot,
    });
    forward(data, event).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_emoji_are_ignored() {
        let unicode = serenity::ReactionType::Unicode("🎉".to_owned());
        assert_eq!(reaction_emoji(&unicode), Some("🎉"));

        let custom = serenity::ReactionType::Custom {
            animated: false,
            id: serenity::EmojiId::new(1),
            name: Some("party".to_owned()),
        };
        assert_eq!(reaction_emoji(&custom), None);
    }
}
