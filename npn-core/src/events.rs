//! Normalized platform events consumed by the dispatcher.

use npn_database::model::campaigns::EndReason;

pub const TICKET_OPEN_BUTTON: &str = "npn:ticket:open";
pub const TICKET_CLOSE_BUTTON: &str = "npn:ticket:close";

pub const GIVEAWAY_EMOJI: &str = "🎉";
pub const POLL_EMOJIS: [&str; 10] = [
    "1️⃣", "2️⃣", "3️⃣", "4️⃣", "5️⃣", "6️⃣", "7️⃣", "8️⃣", "9️⃣", "🔟",
];

/// Option index for a poll reaction emoji.
pub fn poll_option_index(emoji: &str) -> Option<u32> {
    POLL_EMOJIS
        .iter()
        .position(|candidate| *candidate == emoji)
        .map(|index| index as u32)
}

#[derive(Clone, Debug)]
pub struct MessageSent {
    pub guild_id: u64,
    pub channel_id: u64,
    pub user_id: u64,
    pub message_id: u64,
    pub content: String,
    pub timestamp: u64,
    pub author_is_bot: bool,
    pub author_is_admin: bool,
}

#[derive(Clone, Debug)]
pub struct ReactionChanged {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub user_id: u64,
    pub emoji: String,
    pub added: bool,
    pub user_is_bot: bool,
}

#[derive(Clone, Debug)]
pub struct ButtonClicked {
    pub guild_id: u64,
    pub channel_id: u64,
    pub user_id: u64,
    pub custom_id: String,
    pub user_is_admin: bool,
    pub user_role_ids: Vec<u64>,
}

#[derive(Clone, Debug)]
pub enum InboundEvent {
    MessageSent(MessageSent),
    ReactionChanged(ReactionChanged),
    ButtonClicked(ButtonClicked),
    MemberJoined { guild_id: u64, user_id: u64 },
    MemberLeft { guild_id: u64, user_id: u64 },
    ChannelDeleted { guild_id: u64, channel_id: u64 },
    /// Produced by the sweep for expired campaigns and by moderators ending
    /// one early.
    EndRequested { campaign_id: u64, reason: EndReason },
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageSent(_) => "message_sent",
            Self::ReactionChanged(_) => "reaction_changed",
            Self::ButtonClicked(_) => "button_clicked",
            Self::MemberJoined { .. } => "member_joined",
            Self::MemberLeft { .. } => "member_left",
            Self::ChannelDeleted { .. } => "channel_deleted",
            Self::EndRequested { .. } => "end_requested",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_emojis_map_to_indices() {
        assert_eq!(poll_option_index("1️⃣"), Some(0));
        assert_eq!(poll_option_index("🔟"), Some(9));
        assert_eq!(poll_option_index(GIVEAWAY_EMOJI), None);
    }
}
