//! Instructions for the platform collaborator, and the receipts it feeds back.

use tokio::sync::mpsc;

use crate::campaigns::Outcome;

/// Who may see a ticket channel. `administrators` covers every role holding
/// the platform's administrator permission.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessSet {
    pub members: Vec<u64>,
    pub roles: Vec<u64>,
    pub administrators: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageOrigin {
    Plain,
    /// A sticky repost; its id must be reported back so the next repost can
    /// remove it.
    Sticky,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonSpec {
    pub custom_id: String,
    pub label: String,
}

#[derive(Clone, Debug)]
pub enum OutboundAction {
    SendMessage {
        channel_id: u64,
        content: String,
        /// Member pinged ahead of the content.
        mention: Option<u64>,
        origin: MessageOrigin,
        buttons: Vec<ButtonSpec>,
        delete_after: Option<u64>,
    },
    EditMessage {
        channel_id: u64,
        message_id: u64,
        content: String,
    },
    DeleteMessage {
        channel_id: u64,
        message_id: u64,
    },
    CreateChannel {
        guild_id: u64,
        name: String,
        category_id: Option<u64>,
        access: AccessSet,
        ticket_id: Option<u64>,
    },
    DeleteChannel {
        channel_id: u64,
        delay_seconds: u64,
        reason: String,
    },
    SetChannelPermissions {
        channel_id: u64,
        access: AccessSet,
    },
    AssignRole {
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    },
    RemoveRole {
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    },
    AddReaction {
        channel_id: u64,
        message_id: u64,
        emoji: String,
    },
    RemoveReaction {
        channel_id: u64,
        message_id: u64,
        user_id: u64,
        emoji: String,
    },
    TimeoutMember {
        guild_id: u64,
        user_id: u64,
        seconds: u64,
        reason: String,
    },
    KickMember {
        guild_id: u64,
        user_id: u64,
        reason: String,
    },
    /// Publish a campaign result and mark the announcement message as ended.
    AnnounceOutcome {
        channel_id: u64,
        announcement_id: u64,
        outcome: Outcome,
    },
    /// Short user-facing notice. Rendered as an ephemeral reply when the
    /// triggering event was an interaction, as a channel message otherwise.
    Notice {
        channel_id: u64,
        user_id: u64,
        content: String,
    },
}

impl OutboundAction {
    pub fn message(channel_id: u64, content: impl Into<String>) -> Self {
        Self::SendMessage {
            channel_id,
            content: content.into(),
            mention: None,
            origin: MessageOrigin::Plain,
            buttons: Vec::new(),
            delete_after: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "send_message",
            Self::EditMessage { .. } => "edit_message",
            Self::DeleteMessage { .. } => "delete_message",
            Self::CreateChannel { .. } => "create_channel",
            Self::DeleteChannel { .. } => "delete_channel",
            Self::SetChannelPermissions { .. } => "set_channel_permissions",
            Self::AssignRole { .. } => "assign_role",
            Self::RemoveRole { .. } => "remove_role",
            Self::AddReaction { .. } => "add_reaction",
            Self::RemoveReaction { .. } => "remove_reaction",
            Self::TimeoutMember { .. } => "timeout_member",
            Self::KickMember { .. } => "kick_member",
            Self::AnnounceOutcome { .. } => "announce_outcome",
            Self::Notice { .. } => "notice",
        }
    }
}

/// Ids the collaborator learned while executing actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionReceipt {
    MessagePosted {
        channel_id: u64,
        message_id: u64,
        origin: MessageOrigin,
    },
    ChannelCreated {
        guild_id: u64,
        channel_id: u64,
        ticket_id: Option<u64>,
    },
    /// A `CreateChannel` for a ticket was rejected by the platform.
    ChannelCreateFailed { guild_id: u64, ticket_id: u64 },
    /// A `DeleteChannel` went through, or the channel was already gone.
    ChannelRemoved { channel_id: u64 },
}

/// Batches of actions waiting for the collaborator.
pub type ActionQueue = mpsc::Sender<Vec<OutboundAction>>;
pub type ActionQueueReceiver = mpsc::Receiver<Vec<OutboundAction>>;

pub const ACTION_QUEUE_CAPACITY: usize = 256;

pub fn action_queue() -> (ActionQueue, ActionQueueReceiver) {
    mpsc::channel(ACTION_QUEUE_CAPACITY)
}
