//! Routes inbound events to the engine components and turns their results
//! into outbound actions.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use npn_database::Database;
use npn_database::impls::guild_config::get_guild_config;
use npn_database::model::campaigns::{Campaign, CampaignPayload, EndReason, EntryChange};
use npn_database::model::guild_config::SpamAction;
use npn_database::model::tickets::Ticket;
use tracing::{debug, info, warn};

use crate::actions::{ActionReceipt, ButtonSpec, MessageOrigin, OutboundAction};
use crate::antispam::{
    MUTE_DURATION_SECONDS, RateWindowTracker, SpamReason, Verdict, content_hash,
};
use crate::campaigns::{self, StartCampaign};
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::events::{
    ButtonClicked, GIVEAWAY_EMOJI, InboundEvent, MessageSent, POLL_EMOJIS, ReactionChanged,
    TICKET_CLOSE_BUTTON, TICKET_OPEN_BUTTON, poll_option_index,
};
use crate::sticky;
use crate::tickets::{self, Intake};
use crate::time::now_unix_secs;

/// Seconds a ticket channel lingers after closing.
pub const TICKET_DELETE_DELAY_SECONDS: u64 = 10;
/// Seconds before anti-spam notices are cleaned up.
pub const SPAM_NOTICE_TTL_SECONDS: u64 = 10;

type IntakeKey = (u64, u64);

/// Marks a member's ticket intake as running until dropped.
struct IntakeGuard<'a> {
    in_flight: &'a Mutex<HashSet<IntakeKey>>,
    key: IntakeKey,
}

impl<'a> IntakeGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<IntakeKey>>, key: IntakeKey) -> Option<Self> {
        let mut set = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        set.insert(key).then_some(Self { in_flight, key })
    }
}

impl Drop for IntakeGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[derive(Clone, Debug)]
pub struct Dispatcher {
    db: Database,
    tracker: Arc<RateWindowTracker>,
    intake_in_flight: Arc<Mutex<HashSet<IntakeKey>>>,
}

impl Dispatcher {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            tracker: Arc::new(RateWindowTracker::new()),
            intake_in_flight: Arc::default(),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn tracker(&self) -> &RateWindowTracker {
        &self.tracker
    }

    pub async fn dispatch(&self, event: InboundEvent) -> EngineResult<Vec<OutboundAction>> {
        self.dispatch_at(event, now_unix_secs()).await
    }

    pub async fn dispatch_at(
        &self,
        event: InboundEvent,
        now: u64,
    ) -> EngineResult<Vec<OutboundAction>> {
        match event {
            InboundEvent::MessageSent(message) => self.on_message(message).await,
            InboundEvent::ReactionChanged(reaction) => self.on_reaction(reaction, now).await,
            InboundEvent::ButtonClicked(click) => self.on_button(click, now).await,
            InboundEvent::MemberJoined { guild_id, user_id } => {
                debug!(guild_id, user_id, "member joined");
                Ok(Vec::new())
            }
            InboundEvent::MemberLeft { guild_id, user_id } => {
                self.tracker.forget(&self.db, guild_id, user_id).await?;
                Ok(Vec::new())
            }
            InboundEvent::ChannelDeleted {
                guild_id,
                channel_id,
            } => self.on_channel_deleted(guild_id, channel_id, now).await,
            InboundEvent::EndRequested {
                campaign_id,
                reason,
            } => self.end_campaign(campaign_id, reason, now).await,
        }
    }

    /// Feed back ids learned while executing actions.
    pub async fn acknowledge(&self, receipt: ActionReceipt) -> EngineResult<Vec<OutboundAction>> {
        match receipt {
            ActionReceipt::MessagePosted {
                channel_id,
                message_id,
                origin: MessageOrigin::Sticky,
            } => sticky::record_posted(&self.db, channel_id, message_id).await,
            ActionReceipt::MessagePosted { .. } => Ok(Vec::new()),
            ActionReceipt::ChannelCreated {
                channel_id,
                ticket_id: Some(ticket_id),
                ..
            } => {
                tickets::attach_channel(&self.db, ticket_id, channel_id).await?;
                let ticket = tickets::get(&self.db, ticket_id).await?;
                Ok(vec![ticket_greeting(&ticket, channel_id)])
            }
            ActionReceipt::ChannelCreated { .. } => Ok(Vec::new()),
            ActionReceipt::ChannelCreateFailed {
                guild_id,
                ticket_id,
            } => {
                warn!(guild_id, ticket_id, "ticket channel was not created, closing ticket");
                match tickets::close(&self.db, ticket_id, now_unix_secs()).await {
                    Ok(_) => Ok(Vec::new()),
                    Err(err) if err.kind() == ErrorKind::AlreadyTerminal => Ok(Vec::new()),
                    Err(err) => Err(err),
                }
            }
            ActionReceipt::ChannelRemoved { channel_id } => {
                tickets::channel_removed(&self.db, channel_id).await?;
                Ok(Vec::new())
            }
        }
    }

    async fn on_message(&self, message: MessageSent) -> EngineResult<Vec<OutboundAction>> {
        if message.author_is_bot {
            return Ok(Vec::new());
        }

        let mut actions = Vec::new();

        if !message.author_is_admin {
            let config = get_guild_config(&self.db, message.guild_id).await?;
            let verdict = self
                .tracker
                .record_message(
                    &self.db,
                    &config.antispam,
                    message.guild_id,
                    message.user_id,
                    &content_hash(&message.content),
                    message.timestamp,
                )
                .await?;

            if let Verdict::Spam { action, reason } = verdict {
                info!(
                    guild_id = message.guild_id,
                    user_id = message.user_id,
                    action = %action,
                    ?reason,
                    "anti-spam triggered"
                );
                actions.extend(spam_actions(&message, action, reason));
            }
        }

        actions.extend(sticky::on_message(&self.db, message.channel_id).await?);
        Ok(actions)
    }

    async fn on_reaction(
        &self,
        reaction: ReactionChanged,
        now: u64,
    ) -> EngineResult<Vec<OutboundAction>> {
        if reaction.user_is_bot {
            return Ok(Vec::new());
        }

        if reaction.emoji == GIVEAWAY_EMOJI {
            let result = if reaction.added {
                campaigns::record_entry(
                    &self.db,
                    reaction.message_id,
                    reaction.user_id,
                    None,
                    now,
                )
                .await
            } else {
                campaigns::withdraw_entry(&self.db, reaction.message_id, reaction.user_id).await
            };
            ignore_rejected(result, &reaction)?;
            return Ok(Vec::new());
        }

        let Some(index) = poll_option_index(&reaction.emoji) else {
            return Ok(Vec::new());
        };
        if !reaction.added {
            return Ok(Vec::new());
        }

        let result = campaigns::record_entry(
            &self.db,
            reaction.message_id,
            reaction.user_id,
            Some(index),
            now,
        )
        .await;

        match ignore_rejected(result, &reaction)? {
            Some(EntryChange::Replaced {
                previous: Some(previous),
            }) if previous != index => Ok(POLL_EMOJIS
                .get(previous as usize)
                .map(|emoji| OutboundAction::RemoveReaction {
                    channel_id: reaction.channel_id,
                    message_id: reaction.message_id,
                    user_id: reaction.user_id,
                    emoji: (*emoji).to_owned(),
                })
                .into_iter()
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn on_button(&self, click: ButtonClicked, now: u64) -> EngineResult<Vec<OutboundAction>> {
        let result = match click.custom_id.as_str() {
            TICKET_OPEN_BUTTON => {
                self.open_ticket(click.guild_id, click.channel_id, click.user_id, now)
                    .await
            }
            TICKET_CLOSE_BUTTON => {
                self.close_ticket_in_channel(
                    click.channel_id,
                    click.user_id,
                    click.user_is_admin,
                    &click.user_role_ids,
                    now,
                )
                .await
            }
            other => {
                debug!(custom_id = other, "ignoring unknown button");
                return Ok(Vec::new());
            }
        };

        match result {
            Err(err) if err.is_recoverable() => Ok(vec![OutboundAction::Notice {
                channel_id: click.channel_id,
                user_id: click.user_id,
                content: rejection_notice(&err),
            }]),
            other => other,
        }
    }

    async fn on_channel_deleted(
        &self,
        guild_id: u64,
        channel_id: u64,
        now: u64,
    ) -> EngineResult<Vec<OutboundAction>> {
        let Some(ticket) = tickets::find_by_channel(&self.db, channel_id).await? else {
            return Ok(Vec::new());
        };

        match tickets::close(&self.db, ticket.id, now).await {
            Ok(_) => info!(guild_id, ticket_id = ticket.id, "ticket channel deleted, ticket closed"),
            Err(err) if err.kind() == ErrorKind::AlreadyTerminal => {}
            Err(err) => return Err(err),
        }
        tickets::channel_removed(&self.db, channel_id).await?;
        Ok(Vec::new())
    }

    /// Open a ticket for `user_id` unless they already have one.
    pub async fn open_ticket(
        &self,
        guild_id: u64,
        channel_id: u64,
        user_id: u64,
        now: u64,
    ) -> EngineResult<Vec<OutboundAction>> {
        let Some(_guard) = IntakeGuard::acquire(&self.intake_in_flight, (guild_id, user_id)) else {
            return Ok(vec![OutboundAction::Notice {
                channel_id,
                user_id,
                content: "Your ticket is already being created.".into(),
            }]);
        };

        match tickets::intake(&self.db, guild_id, user_id, now).await? {
            Intake::Existing(ticket) => Ok(vec![OutboundAction::Notice {
                channel_id,
                user_id,
                content: match ticket.channel_id {
                    Some(ticket_channel) => {
                        format!("You already have an open ticket: <#{ticket_channel}>")
                    }
                    None => format!(
                        "You already have an open ticket (#{}).",
                        tickets::channel_name(ticket.number)
                    ),
                },
            }]),
            Intake::Opened {
                ticket,
                access,
                category_id,
            } => Ok(vec![
                OutboundAction::CreateChannel {
                    guild_id,
                    name: tickets::channel_name(ticket.number),
                    category_id,
                    access,
                    ticket_id: Some(ticket.id),
                },
                OutboundAction::Notice {
                    channel_id,
                    user_id,
                    content: format!("Creating ticket #{:04}...", ticket.number),
                },
            ]),
        }
    }

    /// Close the ticket backing `channel_id` if `user_id` is its creator,
    /// an administrator, or holds a support role.
    pub async fn close_ticket_in_channel(
        &self,
        channel_id: u64,
        user_id: u64,
        user_is_admin: bool,
        user_role_ids: &[u64],
        now: u64,
    ) -> EngineResult<Vec<OutboundAction>> {
        let ticket = tickets::find_by_channel(&self.db, channel_id)
            .await?
            .ok_or(EngineError::TicketNotFound)?;

        let allowed = user_is_admin
            || ticket.creator_id == user_id
            || get_guild_config(&self.db, ticket.guild_id)
                .await?
                .tickets
                .support_role_ids
                .iter()
                .any(|role| user_role_ids.contains(role));

        if !allowed {
            return Ok(vec![OutboundAction::Notice {
                channel_id,
                user_id,
                content: "Only the ticket creator or staff can close this ticket.".into(),
            }]);
        }

        self.close_ticket(ticket.id, user_id, now).await
    }

    pub async fn close_ticket(
        &self,
        ticket_id: u64,
        closed_by: u64,
        now: u64,
    ) -> EngineResult<Vec<OutboundAction>> {
        let ticket = tickets::close(&self.db, ticket_id, now).await?;

        let Some(channel_id) = ticket.channel_id else {
            return Ok(Vec::new());
        };

        Ok(vec![
            OutboundAction::message(
                channel_id,
                format!(
                    "🔒 Ticket #{:04} closed by <@{closed_by}>. This channel will be deleted in {TICKET_DELETE_DELAY_SECONDS} seconds.",
                    ticket.number
                ),
            ),
            OutboundAction::DeleteChannel {
                channel_id,
                delay_seconds: TICKET_DELETE_DELAY_SECONDS,
                reason: format!("Ticket #{:04} closed", ticket.number),
            },
        ])
    }

    /// Register a campaign whose announcement message was just posted and
    /// return the reactions participants use.
    pub async fn start_campaign(
        &self,
        request: StartCampaign,
        now: u64,
    ) -> EngineResult<(Campaign, Vec<OutboundAction>)> {
        let campaign = campaigns::start(&self.db, request, now).await?;
        let actions = entry_reactions(&campaign);
        Ok((campaign, actions))
    }

    /// The single end path for expired and manually ended campaigns.
    pub async fn end_campaign(
        &self,
        campaign_id: u64,
        reason: EndReason,
        now: u64,
    ) -> EngineResult<Vec<OutboundAction>> {
        let (campaign, outcome) = campaigns::end(&self.db, campaign_id, reason, now).await?;
        Ok(vec![OutboundAction::AnnounceOutcome {
            channel_id: campaign.channel_id,
            announcement_id: campaign.id,
            outcome,
        }])
    }

    pub async fn reroll(&self, campaign_id: u64) -> EngineResult<Vec<OutboundAction>> {
        let (campaign, outcome) = campaigns::reroll(&self.db, campaign_id).await?;
        Ok(vec![OutboundAction::AnnounceOutcome {
            channel_id: campaign.channel_id,
            announcement_id: campaign.id,
            outcome,
        }])
    }
}

fn entry_reactions(campaign: &Campaign) -> Vec<OutboundAction> {
    let emojis: Vec<&str> = match &campaign.payload {
        CampaignPayload::Giveaway { .. } => vec![GIVEAWAY_EMOJI],
        CampaignPayload::Poll { options, .. } => {
            POLL_EMOJIS.iter().take(options.len()).copied().collect()
        }
    };

    emojis
        .into_iter()
        .map(|emoji| OutboundAction::AddReaction {
            channel_id: campaign.channel_id,
            message_id: campaign.id,
            emoji: emoji.to_owned(),
        })
        .collect()
}

fn ticket_greeting(ticket: &Ticket, channel_id: u64) -> OutboundAction {
    OutboundAction::SendMessage {
        channel_id,
        content: format!(
            "Welcome to ticket #{:04}. Describe your issue and staff will be with you shortly.",
            ticket.number
        ),
        mention: Some(ticket.creator_id),
        origin: MessageOrigin::Plain,
        buttons: vec![ButtonSpec {
            custom_id: TICKET_CLOSE_BUTTON.to_owned(),
            label: "Close Ticket".to_owned(),
        }],
        delete_after: None,
    }
}

fn spam_actions(
    message: &MessageSent,
    action: SpamAction,
    reason: SpamReason,
) -> Vec<OutboundAction> {
    let notice = |content: String| OutboundAction::SendMessage {
        channel_id: message.channel_id,
        content,
        mention: Some(message.user_id),
        origin: MessageOrigin::Plain,
        buttons: Vec::new(),
        delete_after: Some(SPAM_NOTICE_TTL_SECONDS),
    };
    let audit_reason = format!("Anti-spam: {}", reason.describe());

    let mut actions = vec![OutboundAction::DeleteMessage {
        channel_id: message.channel_id,
        message_id: message.message_id,
    }];

    match action {
        SpamAction::Warn => {
            actions.push(notice(format!("⚠️ Please stop {}.", reason.describe())));
        }
        SpamAction::Mute => {
            actions.push(OutboundAction::TimeoutMember {
                guild_id: message.guild_id,
                user_id: message.user_id,
                seconds: MUTE_DURATION_SECONDS,
                reason: audit_reason,
            });
            actions.push(notice(format!(
                "🔇 Timed out for {} minutes for {}.",
                MUTE_DURATION_SECONDS / 60,
                reason.describe()
            )));
        }
        SpamAction::Kick => {
            actions.push(OutboundAction::KickMember {
                guild_id: message.guild_id,
                user_id: message.user_id,
                reason: audit_reason,
            });
            actions.push(notice(format!("👢 Kicked for {}.", reason.describe())));
        }
    }

    actions
}

/// Reactions on messages that are not open campaigns are not errors.
fn ignore_rejected<T>(
    result: EngineResult<T>,
    reaction: &ReactionChanged,
) -> EngineResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_recoverable() => {
            debug!(
                message_id = reaction.message_id,
                user_id = reaction.user_id,
                emoji = %reaction.emoji,
                error = %err,
                "reaction ignored"
            );
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn rejection_notice(err: &EngineError) -> String {
    match err {
        EngineError::TicketNotFound => "This channel is not a ticket.".to_owned(),
        EngineError::AlreadyClosed => "This ticket is already closed.".to_owned(),
        other => format!("Could not complete that: {other}."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npn_database::impls::guild_config::set_antispam_config;
    use npn_database::model::guild_config::AntiSpamConfig;

    const GUILD: u64 = 1;
    const CHANNEL: u64 = 2;
    const USER: u64 = 3;

    fn message(message_id: u64, content: &str, timestamp: u64) -> InboundEvent {
        InboundEvent::MessageSent(MessageSent {
            guild_id: GUILD,
            channel_id: CHANNEL,
            user_id: USER,
            message_id,
            content: content.to_owned(),
            timestamp,
            author_is_bot: false,
            author_is_admin: false,
        })
    }

    fn reaction(message_id: u64, emoji: &str, added: bool) -> InboundEvent {
        InboundEvent::ReactionChanged(ReactionChanged {
            guild_id: GUILD,
            channel_id: CHANNEL,
            message_id,
            user_id: USER,
            emoji: emoji.to_owned(),
            added,
            user_is_bot: false,
        })
    }

    fn click(custom_id: &str, channel_id: u64, user_id: u64) -> InboundEvent {
        InboundEvent::ButtonClicked(ButtonClicked {
            guild_id: GUILD,
            channel_id,
            user_id,
            custom_id: custom_id.to_owned(),
            user_is_admin: false,
            user_role_ids: Vec::new(),
        })
    }

    #[tokio::test]
    async fn sticky_follows_the_conversation() {
        let dispatcher = Dispatcher::new(Database::in_memory());
        sticky::set(dispatcher.db(), GUILD, CHANNEL, "Be nice").await.unwrap();
        dispatcher
            .acknowledge(ActionReceipt::MessagePosted {
                channel_id: CHANNEL,
                message_id: 500,
                origin: MessageOrigin::Sticky,
            })
            .await
            .unwrap();

        let actions = dispatcher.dispatch_at(message(10, "hello", 0), 0).await.unwrap();
        assert!(matches!(
            actions.as_slice(),
            [OutboundAction::SendMessage { origin: MessageOrigin::Sticky, .. }]
        ));

        let InboundEvent::MessageSent(mut from_bot) = message(11, "sticky", 1) else {
            unreachable!();
        };
        from_bot.author_is_bot = true;
        let actions = dispatcher
            .dispatch_at(InboundEvent::MessageSent(from_bot), 1)
            .await
            .unwrap();
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn overlapping_reposts_leave_one_copy() {
        let dispatcher = Dispatcher::new(Database::in_memory());
        sticky::set(dispatcher.db(), GUILD, CHANNEL, "Be nice").await.unwrap();

        let posted = |message_id| ActionReceipt::MessagePosted {
            channel_id: CHANNEL,
            message_id,
            origin: MessageOrigin::Sticky,
        };
        assert!(dispatcher.acknowledge(posted(500)).await.unwrap().is_empty());

        // Two messages arrive before either repost is acknowledged.
        for i in 0..2 {
            let actions = dispatcher
                .dispatch_at(message(10 + i, &format!("chat {i}"), i), i)
                .await
                .unwrap();
            assert!(matches!(
                actions.as_slice(),
                [OutboundAction::SendMessage { origin: MessageOrigin::Sticky, .. }]
            ));
        }

        let mut deleted = Vec::new();
        for message_id in [501, 502] {
            for action in dispatcher.acknowledge(posted(message_id)).await.unwrap() {
                let OutboundAction::DeleteMessage { message_id, .. } = action else {
                    panic!("unexpected follow-up {action:?}");
                };
                deleted.push(message_id);
            }
        }
        assert_eq!(deleted, vec![500, 501]);
        assert_eq!(
            sticky::get(dispatcher.db(), CHANNEL)
                .await
                .unwrap()
                .unwrap()
                .last_message_id,
            Some(502)
        );
    }

    #[tokio::test]
    async fn flood_deletes_and_warns() {
        let dispatcher = Dispatcher::new(Database::in_memory());
        set_antispam_config(
            dispatcher.db(),
            GUILD,
            &AntiSpamConfig {
                enabled: true,
                duplicate_threshold: 0,
                ..AntiSpamConfig::default()
            },
        )
        .await
        .unwrap();

        for i in 0..5 {
            let actions = dispatcher
                .dispatch_at(message(i, &format!("m{i}"), i), i)
                .await
                .unwrap();
            assert!(actions.is_empty());
        }

        let actions = dispatcher.dispatch_at(message(5, "m5", 5), 5).await.unwrap();
        assert!(matches!(
            actions.as_slice(),
            [
                OutboundAction::DeleteMessage { message_id: 5, .. },
                OutboundAction::SendMessage { mention: Some(USER), delete_after: Some(_), .. },
            ]
        ));
    }

    async fn flood_with(action: SpamAction) -> Vec<OutboundAction> {
        let dispatcher = Dispatcher::new(Database::in_memory());
        set_antispam_config(
            dispatcher.db(),
            GUILD,
            &AntiSpamConfig {
                enabled: true,
                action,
                duplicate_threshold: 0,
                ..AntiSpamConfig::default()
            },
        )
        .await
        .unwrap();

        for i in 0..5 {
            dispatcher
                .dispatch_at(message(i, &format!("m{i}"), i), i)
                .await
                .unwrap();
        }
        dispatcher.dispatch_at(message(5, "m5", 5), 5).await.unwrap()
    }

    #[tokio::test]
    async fn flood_mutes_for_five_minutes() {
        let actions = flood_with(SpamAction::Mute).await;
        assert!(matches!(
            actions.as_slice(),
            [
                OutboundAction::DeleteMessage { message_id: 5, .. },
                OutboundAction::TimeoutMember {
                    guild_id: GUILD,
                    user_id: USER,
                    seconds: 300,
                    ..
                },
                OutboundAction::SendMessage { mention: Some(USER), .. },
            ]
        ));
    }

    #[tokio::test]
    async fn flood_kicks_the_member() {
        let actions = flood_with(SpamAction::Kick).await;
        assert!(matches!(
            actions.as_slice(),
            [
                OutboundAction::DeleteMessage { message_id: 5, .. },
                OutboundAction::KickMember { guild_id: GUILD, user_id: USER, .. },
                OutboundAction::SendMessage { mention: Some(USER), .. },
            ]
        ));
    }

    #[tokio::test]
    async fn admins_skip_antispam() {
        let dispatcher = Dispatcher::new(Database::in_memory());
        set_antispam_config(
            dispatcher.db(),
            GUILD,
            &AntiSpamConfig {
                enabled: true,
                action: SpamAction::Kick,
                ..AntiSpamConfig::default()
            },
        )
        .await
        .unwrap();

        for i in 0..10 {
            let InboundEvent::MessageSent(mut sent) = message(i, "same", 0) else {
                unreachable!();
            };
            sent.author_is_admin = true;
            let actions = dispatcher
                .dispatch_at(InboundEvent::MessageSent(sent), 0)
                .await
                .unwrap();
            assert!(actions.is_empty());
        }
    }

    #[tokio::test]
    async fn ticket_intake_guard_and_close() {
        let dispatcher = Dispatcher::new(Database::in_memory());

        let actions = dispatcher
            .dispatch_at(click(TICKET_OPEN_BUTTON, CHANNEL, USER), 0)
            .await
            .unwrap();
        let Some(OutboundAction::CreateChannel {
            name,
            ticket_id: Some(ticket_id),
            access,
            ..
        }) = actions.first()
        else {
            panic!("expected CreateChannel, got {actions:?}");
        };
        assert_eq!(name, "ticket-0001");
        assert_eq!(access.members, vec![USER]);

        let greeting = dispatcher
            .acknowledge(ActionReceipt::ChannelCreated {
                guild_id: GUILD,
                channel_id: 900,
                ticket_id: Some(*ticket_id),
            })
            .await
            .unwrap();
        assert!(matches!(
            greeting.as_slice(),
            [OutboundAction::SendMessage { channel_id: 900, mention: Some(USER), buttons, .. }]
                if buttons.len() == 1
        ));

        let again = dispatcher
            .dispatch_at(click(TICKET_OPEN_BUTTON, CHANNEL, USER), 1)
            .await
            .unwrap();
        assert!(matches!(
            again.as_slice(),
            [OutboundAction::Notice { content, .. }] if content.contains("<#900>")
        ));

        let stranger = dispatcher
            .dispatch_at(click(TICKET_CLOSE_BUTTON, 900, 77), 2)
            .await
            .unwrap();
        assert!(matches!(stranger.as_slice(), [OutboundAction::Notice { .. }]));

        let closed = dispatcher
            .dispatch_at(click(TICKET_CLOSE_BUTTON, 900, USER), 3)
            .await
            .unwrap();
        assert!(matches!(
            closed.as_slice(),
            [
                OutboundAction::SendMessage { channel_id: 900, .. },
                OutboundAction::DeleteChannel { channel_id: 900, .. },
            ]
        ));

        let twice = dispatcher
            .dispatch_at(click(TICKET_CLOSE_BUTTON, 900, USER), 4)
            .await
            .unwrap();
        assert!(
            twice
                .iter()
                .all(|action| !matches!(action, OutboundAction::DeleteChannel { .. }))
        );
        assert!(matches!(
            twice.as_slice(),
            [OutboundAction::Notice { content, .. }] if content.contains("already closed")
        ));
    }

    #[tokio::test]
    async fn failed_channel_creation_releases_intake() {
        let dispatcher = Dispatcher::new(Database::in_memory());

        let actions = dispatcher
            .dispatch_at(click(TICKET_OPEN_BUTTON, CHANNEL, USER), 0)
            .await
            .unwrap();
        let Some(OutboundAction::CreateChannel {
            ticket_id: Some(ticket_id),
            ..
        }) = actions.first()
        else {
            panic!("expected CreateChannel");
        };

        dispatcher
            .acknowledge(ActionReceipt::ChannelCreateFailed {
                guild_id: GUILD,
                ticket_id: *ticket_id,
            })
            .await
            .unwrap();

        let retry = dispatcher
            .dispatch_at(click(TICKET_OPEN_BUTTON, CHANNEL, USER), 1)
            .await
            .unwrap();
        assert!(matches!(
            retry.first(),
            Some(OutboundAction::CreateChannel { name, .. }) if name == "ticket-0002"
        ));
    }

    #[tokio::test]
    async fn giveaway_reactions_enter_and_withdraw() {
        let dispatcher = Dispatcher::new(Database::in_memory());
        let (_, actions) = dispatcher
            .start_campaign(
                StartCampaign {
                    guild_id: GUILD,
                    channel_id: CHANNEL,
                    message_id: 70,
                    creator_id: 9,
                    duration_seconds: Some(60),
                    payload: CampaignPayload::Giveaway {
                        prize: "Key".into(),
                        winners_count: 1,
                    },
                },
                0,
            )
            .await
            .unwrap();
        assert!(matches!(
            actions.as_slice(),
            [OutboundAction::AddReaction { emoji, .. }] if emoji == GIVEAWAY_EMOJI
        ));

        dispatcher
            .dispatch_at(reaction(70, GIVEAWAY_EMOJI, true), 1)
            .await
            .unwrap();
        dispatcher
            .dispatch_at(reaction(70, GIVEAWAY_EMOJI, false), 2)
            .await
            .unwrap();

        let actions = dispatcher
            .dispatch_at(
                InboundEvent::EndRequested {
                    campaign_id: 70,
                    reason: EndReason::Manual,
                },
                3,
            )
            .await
            .unwrap();
        let [OutboundAction::AnnounceOutcome {
            outcome: campaigns::Outcome::Giveaway(outcome),
            ..
        }] = actions.as_slice()
        else {
            panic!("expected giveaway outcome");
        };
        assert_eq!(outcome.entrants, 0);

        // Reacting to an ended giveaway or an unrelated message is ignored.
        assert!(
            dispatcher
                .dispatch_at(reaction(70, GIVEAWAY_EMOJI, true), 4)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(
            dispatcher
                .dispatch_at(reaction(12345, GIVEAWAY_EMOJI, true), 4)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn changing_poll_vote_removes_old_reaction() {
        let dispatcher = Dispatcher::new(Database::in_memory());
        let (_, actions) = dispatcher
            .start_campaign(
                StartCampaign {
                    guild_id: GUILD,
                    channel_id: CHANNEL,
                    message_id: 80,
                    creator_id: 9,
                    duration_seconds: None,
                    payload: CampaignPayload::Poll {
                        question: "Lunch?".into(),
                        options: vec!["Pizza".into(), "Sushi".into(), "Tacos".into()],
                    },
                },
                0,
            )
            .await
            .unwrap();
        assert_eq!(actions.len(), 3);

        let first = dispatcher
            .dispatch_at(reaction(80, POLL_EMOJIS[0], true), 1)
            .await
            .unwrap();
        assert!(first.is_empty());

        let second = dispatcher
            .dispatch_at(reaction(80, POLL_EMOJIS[2], true), 2)
            .await
            .unwrap();
        assert!(matches!(
            second.as_slice(),
            [OutboundAction::RemoveReaction { emoji, user_id: USER, .. }] if emoji == POLL_EMOJIS[0]
        ));

        let removal = dispatcher
            .dispatch_at(reaction(80, POLL_EMOJIS[0], false), 3)
            .await
            .unwrap();
        assert!(removal.is_empty());

        dispatcher
            .end_campaign(80, EndReason::Manual, 4)
            .await
            .unwrap();
        let err = dispatcher
            .end_campaign(80, EndReason::Expired, 5)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyTerminal);
    }

    #[tokio::test]
    async fn member_leaving_drops_spam_window() {
        let dispatcher = Dispatcher::new(Database::in_memory());
        set_antispam_config(
            dispatcher.db(),
            GUILD,
            &AntiSpamConfig {
                enabled: true,
                ..AntiSpamConfig::default()
            },
        )
        .await
        .unwrap();

        dispatcher.dispatch_at(message(1, "hi", 0), 0).await.unwrap();
        dispatcher
            .dispatch_at(
                InboundEvent::MemberLeft {
                    guild_id: GUILD,
                    user_id: USER,
                },
                1,
            )
            .await
            .unwrap();

        assert_eq!(
            npn_database::impls::spam_windows::count_spam_windows(dispatcher.db(), GUILD)
                .await
                .unwrap(),
            0
        );
    }
}
