use std::sync::Arc;
use std::time::Duration;

use npn_core::actions::{ActionReceipt, ButtonSpec, OutboundAction};
use npn_core::events::TICKET_CLOSE_BUTTON;
use npn_core::time::now_unix_secs;
use npn_core::Dispatcher;
use poise::serenity_prelude as serenity;
use tracing::{debug, error, warn};

use crate::embed::{ended_announcement, outcome_message};
use crate::permissions::access_overwrites;
use crate::retry::{FailureKind, RetryPolicy, classify};

/// Seconds before a notice sent outside an interaction is removed.
const NOTICE_TTL_SECONDS: u64 = 15;

/// Split notices out of a batch so an interaction handler can answer them
/// ephemerally.
pub fn take_notices(actions: Vec<OutboundAction>) -> (Vec<String>, Vec<OutboundAction>) {
    let mut notices = Vec::new();
    let mut rest = Vec::new();
    for action in actions {
        match action {
            OutboundAction::Notice { content, .. } => notices.push(content),
            other => rest.push(other),
        }
    }
    (notices, rest)
}

pub fn create_button(spec: &ButtonSpec) -> serenity::CreateButton {
    let style = if spec.custom_id == TICKET_CLOSE_BUTTON {
        serenity::ButtonStyle::Danger
    } else {
        serenity::ButtonStyle::Primary
    };
    serenity::CreateButton::new(spec.custom_id.clone())
        .label(spec.label.clone())
        .style(style)
}

fn unicode(emoji: String) -> serenity::ReactionType {
    serenity::ReactionType::Unicode(emoji)
}

/// Receipt owed to the dispatcher when an action finally fails.
fn failure_receipt(action: &OutboundAction) -> Option<ActionReceipt> {
    match action {
        OutboundAction::CreateChannel {
            guild_id,
            ticket_id: Some(ticket_id),
            ..
        } => Some(ActionReceipt::ChannelCreateFailed {
            guild_id: *guild_id,
            ticket_id: *ticket_id,
        }),
        _ => None,
    }
}

/// Executes outbound actions against the Discord HTTP API.
#[derive(Clone)]
pub struct ActionExecutor {
    http: Arc<serenity::Http>,
    bot_user_id: Option<serenity::UserId>,
    retry: RetryPolicy,
}

impl ActionExecutor {
    pub fn new(http: Arc<serenity::Http>, bot_user_id: Option<serenity::UserId>) -> Self {
        Self {
            http,
            bot_user_id,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run every action, retrying transient failures, and collect the
    /// receipts the dispatcher needs. Missing targets count as success.
    pub async fn execute(&self, actions: Vec<OutboundAction>) -> Vec<ActionReceipt> {
        let mut receipts = Vec::new();

        for action in actions {
            let name = action.name();
            let result = self
                .retry
                .run(name, || self.execute_one(action.clone()))
                .await;

            match result {
                Ok(Some(receipt)) => receipts.push(receipt),
                Ok(None) => {}
                Err(source) => {
                    match classify(&source) {
                        FailureKind::Gone => debug!(action = name, "action target already gone"),
                        FailureKind::Forbidden => {
                            warn!(action = name, "missing permissions to execute action");
                        }
                        FailureKind::Transient | FailureKind::Permanent => {
                            error!(action = name, ?source, "failed to execute action");
                        }
                    }
                    receipts.extend(failure_receipt(&action));
                }
            }
        }

        receipts
    }

    /// Execute actions and feed their receipts back until nothing is left.
    pub async fn run(&self, dispatcher: &Dispatcher, actions: Vec<OutboundAction>) {
        let mut pending = actions;

        while !pending.is_empty() {
            let receipts = self.execute(pending).await;
            pending = Vec::new();

            for receipt in receipts {
                match dispatcher.acknowledge(receipt).await {
                    Ok(follow_up) => pending.extend(follow_up),
                    Err(err) => error!(error = %err, ?receipt, "failed to acknowledge receipt"),
                }
            }
        }
    }

    fn delete_later(
        &self,
        channel_id: serenity::ChannelId,
        message_id: serenity::MessageId,
        secs: u64,
    ) {
        let http = Arc::clone(&self.http);
        let retry = self.retry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            let deleted = retry
                .run("delete_expired_message", || {
                    channel_id.delete_message(&http, message_id)
                })
                .await;
            if let Err(source) = deleted {
                if classify(&source) != FailureKind::Gone {
                    debug!(?source, "failed to delete expired message");
                }
            }
        });
    }

    async fn execute_one(
        &self,
        action: OutboundAction,
    ) -> Result<Option<ActionReceipt>, serenity::Error> {
        let http = &self.http;

        match action {
            OutboundAction::SendMessage {
                channel_id,
                content,
                mention,
                origin,
                buttons,
                delete_after,
            } => {
                let channel = serenity::ChannelId::new(channel_id);
                let mut message = serenity::CreateMessage::new();

                let content = match mention {
                    Some(user_id) => {
                        message = message.allowed_mentions(
                            serenity::CreateAllowedMentions::new()
                                .users(vec![serenity::UserId::new(user_id)]),
                        );
                        format!("<@{user_id}> {content}")
                    }
                    None => content,
                };

                if !buttons.is_empty() {
                    message = message.components(vec![serenity::CreateActionRow::Buttons(
                        buttons.iter().map(create_button).collect(),
                    )]);
                }

                let sent = channel.send_message(http, message.content(content)).await?;
                if let Some(secs) = delete_after {
                    self.delete_later(channel, sent.id, secs);
                }

                Ok(Some(ActionReceipt::MessagePosted {
                    channel_id,
                    message_id: sent.id.get(),
                    origin,
                }))
            }
            OutboundAction::EditMessage {
                channel_id,
                message_id,
                content,
            } => {
                serenity::ChannelId::new(channel_id)
                    .edit_message(
                        http,
                        serenity::MessageId::new(message_id),
                        serenity::EditMessage::new().content(content),
                    )
                    .await?;
                Ok(None)
            }
            OutboundAction::DeleteMessage {
                channel_id,
                message_id,
            } => {
                serenity::ChannelId::new(channel_id)
                    .delete_message(http, serenity::MessageId::new(message_id))
                    .await?;
                Ok(None)
            }
            OutboundAction::CreateChannel {
                guild_id,
                name,
                category_id,
                access,
                ticket_id,
            } => {
                let guild = serenity::GuildId::new(guild_id);
                let mut builder = serenity::CreateChannel::new(name)
                    .kind(serenity::ChannelType::Text)
                    .permissions(access_overwrites(guild, &access, self.bot_user_id));
                if let Some(category_id) = category_id {
                    builder = builder.category(serenity::ChannelId::new(category_id));
                }

                let channel = guild.create_channel(http, builder).await?;
                Ok(Some(ActionReceipt::ChannelCreated {
                    guild_id,
                    channel_id: channel.id.get(),
                    ticket_id,
                }))
            }
            OutboundAction::DeleteChannel {
                channel_id,
                delay_seconds,
                reason,
            } => {
                let channel = serenity::ChannelId::new(channel_id);
                if delay_seconds == 0 {
                    match channel.delete(http).await {
                        Ok(_) => debug!(channel_id, reason = %reason, "channel deleted"),
                        Err(source) if classify(&source) == FailureKind::Gone => {}
                        Err(source) => return Err(source),
                    }
                    return Ok(Some(ActionReceipt::ChannelRemoved { channel_id }));
                }

                // The gateway delete event settles the ticket; the sweep
                // reissues the deletion if this task never finishes.
                let http = Arc::clone(http);
                let retry = self.retry.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(delay_seconds)).await;
                    match retry.run("delete_channel", || channel.delete(&http)).await {
                        Ok(_) => debug!(channel_id, reason = %reason, "channel deleted"),
                        Err(source) if classify(&source) == FailureKind::Gone => {}
                        Err(source) => error!(?source, channel_id, "failed to delete channel"),
                    }
                });
                Ok(None)
            }
            OutboundAction::SetChannelPermissions { channel_id, access } => {
                let channel = serenity::ChannelId::new(channel_id);
                let guild = channel.to_channel(http).await?.guild().map(|c| c.guild_id);
                let Some(guild) = guild else {
                    warn!(channel_id, "cannot set permissions outside a guild channel");
                    return Ok(None);
                };
                for overwrite in access_overwrites(guild, &access, self.bot_user_id) {
                    channel.create_permission(http, overwrite).await?;
                }
                Ok(None)
            }
            OutboundAction::AssignRole {
                guild_id,
                user_id,
                role_id,
            } => {
                http.add_member_role(
                    serenity::GuildId::new(guild_id),
                    serenity::UserId::new(user_id),
                    serenity::RoleId::new(role_id),
                    None,
                )
                .await?;
                Ok(None)
            }
            OutboundAction::RemoveRole {
                guild_id,
                user_id,
                role_id,
            } => {
                http.remove_member_role(
                    serenity::GuildId::new(guild_id),
                    serenity::UserId::new(user_id),
                    serenity::RoleId::new(role_id),
                    None,
                )
                .await?;
                Ok(None)
            }
            OutboundAction::AddReaction {
                channel_id,
                message_id,
                emoji,
            } => {
                serenity::ChannelId::new(channel_id)
                    .create_reaction(http, serenity::MessageId::new(message_id), unicode(emoji))
                    .await?;
                Ok(None)
            }
            OutboundAction::RemoveReaction {
                channel_id,
                message_id,
                user_id,
                emoji,
            } => {
                serenity::ChannelId::new(channel_id)
                    .delete_reaction(
                        http,
                        serenity::MessageId::new(message_id),
                        Some(serenity::UserId::new(user_id)),
                        unicode(emoji),
                    )
                    .await?;
                Ok(None)
            }
            OutboundAction::TimeoutMember {
                guild_id,
                user_id,
                seconds,
                reason,
            } => {
                let until_unix = now_unix_secs().saturating_add(seconds) as i64;
                let Ok(until) = serenity::Timestamp::from_unix_timestamp(until_unix) else {
                    warn!(user_id, seconds, "timeout end is out of range");
                    return Ok(None);
                };

                let edit = serenity::EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason(&reason);
                serenity::GuildId::new(guild_id)
                    .edit_member(http, serenity::UserId::new(user_id), edit)
                    .await?;
                Ok(None)
            }
            OutboundAction::KickMember {
                guild_id,
                user_id,
                reason,
            } => {
                serenity::GuildId::new(guild_id)
                    .kick_with_reason(http, serenity::UserId::new(user_id), &reason)
                    .await?;
                Ok(None)
            }
            OutboundAction::AnnounceOutcome {
                channel_id,
                announcement_id,
                outcome,
            } => {
                let channel = serenity::ChannelId::new(channel_id);
                let (content, embed) = outcome_message(&outcome);
                channel
                    .send_message(
                        http,
                        serenity::CreateMessage::new()
                            .content(content)
                            .embed(embed),
                    )
                    .await?;

                // The result is already public; a failed edit must not resend it.
                let edited = self
                    .retry
                    .run("edit_announcement", || {
                        channel.edit_message(
                            http,
                            serenity::MessageId::new(announcement_id),
                            serenity::EditMessage::new().embed(ended_announcement(&outcome)),
                        )
                    })
                    .await;
                match edited {
                    Ok(_) => {}
                    Err(source) if classify(&source) == FailureKind::Gone => {
                        debug!(announcement_id, "announcement already deleted");
                    }
                    Err(source) => {
                        error!(?source, announcement_id, "failed to mark announcement ended");
                    }
                }
                Ok(None)
            }
            OutboundAction::Notice {
                channel_id,
                user_id,
                content,
            } => {
                let channel = serenity::ChannelId::new(channel_id);
                let sent = channel
                    .send_message(
                        http,
                        serenity::CreateMessage::new()
                            .content(format!("<@{user_id}> {content}"))
                            .allowed_mentions(
                                serenity::CreateAllowedMentions::new()
                                    .users(vec![serenity::UserId::new(user_id)]),
                            ),
                    )
                    .await?;
                self.delete_later(channel, sent.id, NOTICE_TTL_SECONDS);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_ticket_channel_owes_a_receipt() {
        let create = |ticket_id| OutboundAction::CreateChannel {
            guild_id: 1,
            name: "ticket-0001".into(),
            category_id: None,
            access: Default::default(),
            ticket_id,
        };

        assert!(matches!(
            failure_receipt(&create(Some(7))),
            Some(ActionReceipt::ChannelCreateFailed { guild_id: 1, ticket_id: 7 })
        ));
        assert!(failure_receipt(&create(None)).is_none());
        assert!(failure_receipt(&OutboundAction::message(1, "hello")).is_none());
    }

    #[test]
    fn notices_are_split_out() {
        let actions = vec![
            OutboundAction::Notice {
                channel_id: 1,
                user_id: 2,
                content: "Already open".into(),
            },
            OutboundAction::message(1, "hello"),
        ];

        let (notices, rest) = take_notices(actions);
        assert_eq!(notices, vec!["Already open".to_owned()]);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].name(), "send_message");
    }
}
