//! Periodic driver that ends campaigns whose time is up, finishes ticket
//! channel deletions that never completed and releases idle spam windows.

use std::time::Duration;

use npn_database::impls::campaigns::list_due_campaigns;
use npn_database::model::campaigns::EndReason;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::actions::{ActionQueue, OutboundAction};
use crate::dispatch::{Dispatcher, TICKET_DELETE_DELAY_SECONDS};
use crate::error::{EngineResult, ErrorKind};
use crate::events::InboundEvent;
use crate::tickets;
use crate::time::now_unix_secs;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Extra time a delayed ticket channel deletion gets before it is reissued.
const CHANNEL_REMOVAL_GRACE_SECONDS: u64 = 60;

/// Closed tickets older than this are no longer chased for channel removal.
const CHANNEL_REMOVAL_HORIZON_SECONDS: u64 = 24 * 60 * 60;

/// Spam windows untouched for this long are released from memory and the
/// store.
const IDLE_WINDOW_SECONDS: u64 = 600;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub due: usize,
    pub ended: usize,
    pub already_ended: usize,
    pub failed: usize,
    pub reissued_deletes: usize,
    pub evicted_windows: usize,
    pub purged_windows: u64,
}

/// End every active campaign with `ends_at <= now`, reissue ticket channel
/// deletions that were lost (for example across a restart), then drop spam
/// windows that have been idle for longer than [`IDLE_WINDOW_SECONDS`].
///
/// A campaign that was ended concurrently is counted and skipped; other
/// per-campaign failures are logged and do not stop the sweep.
pub async fn sweep_once(
    dispatcher: &Dispatcher,
    now: u64,
) -> EngineResult<(SweepReport, Vec<OutboundAction>)> {
    let due = list_due_campaigns(dispatcher.db(), now).await?;
    let mut report = SweepReport {
        due: due.len(),
        ..SweepReport::default()
    };
    let mut actions = Vec::new();

    for campaign in due {
        let event = InboundEvent::EndRequested {
            campaign_id: campaign.id,
            reason: EndReason::Expired,
        };

        match dispatcher.dispatch_at(event, now).await {
            Ok(produced) => {
                report.ended += 1;
                actions.extend(produced);
            }
            Err(err) if err.kind() == ErrorKind::AlreadyTerminal => {
                debug!(campaign_id = campaign.id, "campaign already ended");
                report.already_ended += 1;
            }
            Err(err) => {
                error!(campaign_id = campaign.id, error = %err, "failed to end campaign");
                report.failed += 1;
            }
        }
    }

    let closed_before =
        now.saturating_sub(TICKET_DELETE_DELAY_SECONDS + CHANNEL_REMOVAL_GRACE_SECONDS);
    let closed_after = now.saturating_sub(CHANNEL_REMOVAL_HORIZON_SECONDS);
    match tickets::pending_channel_removals(dispatcher.db(), closed_after, closed_before).await {
        Ok(pending) => {
            for ticket in pending {
                let Some(channel_id) = ticket.channel_id else {
                    continue;
                };
                warn!(ticket_id = ticket.id, channel_id, "reissuing ticket channel deletion");
                report.reissued_deletes += 1;
                actions.push(OutboundAction::DeleteChannel {
                    channel_id,
                    delay_seconds: 0,
                    reason: format!("Ticket #{:04} closed", ticket.number),
                });
            }
        }
        Err(err) => error!(error = %err, "failed to list pending ticket channel removals"),
    }

    report.evicted_windows = dispatcher.tracker().evict_idle(now, IDLE_WINDOW_SECONDS);
    match dispatcher
        .tracker()
        .purge_stale(dispatcher.db(), now, IDLE_WINDOW_SECONDS)
        .await
    {
        Ok(purged) => report.purged_windows = purged,
        Err(err) => error!(error = %err, "failed to purge stale spam windows"),
    }

    Ok((report, actions))
}

/// Run [`sweep_once`] forever, sleeping `interval` after each pass so passes
/// never overlap. Stops when the action queue is closed.
pub fn spawn_sweeper(
    dispatcher: Dispatcher,
    interval: Duration,
    queue: ActionQueue,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "campaign sweep started");

        loop {
            let now = now_unix_secs();

            match sweep_once(&dispatcher, now).await {
                Ok((report, actions)) => {
                    if report.due > 0 || report.reissued_deletes > 0 {
                        info!(
                            due = report.due,
                            ended = report.ended,
                            already_ended = report.already_ended,
                            failed = report.failed,
                            reissued_deletes = report.reissued_deletes,
                            "campaign sweep finished"
                        );
                    }
                    if report.evicted_windows > 0 || report.purged_windows > 0 {
                        debug!(
                            evicted = report.evicted_windows,
                            purged = report.purged_windows,
                            "released idle spam windows"
                        );
                    }
                    if !actions.is_empty() && queue.send(actions).await.is_err() {
                        warn!("action queue closed, stopping campaign sweep");
                        return;
                    }
                }
                Err(err) => error!(error = %err, "campaign sweep failed"),
            }

            tokio::time::sleep(interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionReceipt, action_queue};
    use crate::campaigns::{self, Outcome, StartCampaign};
    use npn_database::Database;
    use npn_database::impls::spam_windows::count_spam_windows;
    use npn_database::model::campaigns::{CampaignPayload, CampaignStatus};
    use npn_database::model::guild_config::AntiSpamConfig;

    fn giveaway(message_id: u64, duration: u64) -> StartCampaign {
        StartCampaign {
            guild_id: 1,
            channel_id: 2,
            message_id,
            creator_id: 3,
            duration_seconds: Some(duration),
            payload: CampaignPayload::Giveaway {
                prize: "Sticker pack".into(),
                winners_count: 1,
            },
        }
    }

    #[tokio::test]
    async fn expired_giveaway_ends_exactly_once() {
        let dispatcher = Dispatcher::new(Database::in_memory());
        let db = dispatcher.db().clone();

        campaigns::start(&db, giveaway(100, 60), 0).await.unwrap();
        campaigns::record_entry(&db, 100, 7, None, 10).await.unwrap();
        campaigns::record_entry(&db, 100, 8, None, 20).await.unwrap();

        let (early, actions) = sweep_once(&dispatcher, 59).await.unwrap();
        assert_eq!(early.due, 0);
        assert!(actions.is_empty());

        let (report, actions) = sweep_once(&dispatcher, 61).await.unwrap();
        assert_eq!(report.ended, 1);

        let [OutboundAction::AnnounceOutcome {
            outcome: Outcome::Giveaway(outcome),
            ..
        }] = actions.as_slice()
        else {
            panic!("expected one giveaway outcome, got {actions:?}");
        };
        assert_eq!(outcome.winners.len(), 1);
        assert!([7, 8].contains(&outcome.winners[0]));

        let stored = campaigns::get(&db, 100).await.unwrap();
        assert_eq!(stored.status, CampaignStatus::Ended);
        assert_eq!(stored.end_reason, Some(EndReason::Expired));
        assert_eq!(stored.ended_at, Some(61));

        let (later, actions) = sweep_once(&dispatcher, 200).await.unwrap();
        assert_eq!(later, SweepReport::default());
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn manual_end_wins_over_sweep() {
        let dispatcher = Dispatcher::new(Database::in_memory());
        let db = dispatcher.db().clone();

        campaigns::start(&db, giveaway(101, 30), 0).await.unwrap();
        dispatcher
            .end_campaign(101, EndReason::Manual, 15)
            .await
            .unwrap();

        let (report, _) = sweep_once(&dispatcher, 31).await.unwrap();
        assert_eq!(report.due, 0);
        assert_eq!(
            campaigns::get(&db, 101).await.unwrap().end_reason,
            Some(EndReason::Manual)
        );
    }

    #[tokio::test]
    async fn sweep_releases_idle_spam_windows() {
        let dispatcher = Dispatcher::new(Database::in_memory());
        let db = dispatcher.db().clone();
        let config = AntiSpamConfig {
            enabled: true,
            ..AntiSpamConfig::default()
        };

        for user_id in 0..100 {
            dispatcher
                .tracker()
                .record_message(&db, &config, 1, user_id, "hi", 0)
                .await
                .unwrap();
        }

        let (report, _) = sweep_once(&dispatcher, 100).await.unwrap();
        assert_eq!(report.purged_windows, 0);
        assert_eq!(count_spam_windows(&db, 1).await.unwrap(), 100);

        let (report, _) = sweep_once(&dispatcher, 1_000_000).await.unwrap();
        assert_eq!(report.evicted_windows, 100);
        assert_eq!(report.purged_windows, 100);
        assert_eq!(count_spam_windows(&db, 1).await.unwrap(), 0);
        assert_eq!(dispatcher.tracker().tracked(), 0);
    }

    #[tokio::test]
    async fn lost_ticket_channel_deletion_is_reissued() {
        let dispatcher = Dispatcher::new(Database::in_memory());
        let db = dispatcher.db().clone();

        let (ticket, _) = tickets::open(&db, 1, 5, 1, 0).await.unwrap();
        tickets::attach_channel(&db, ticket.id, 900).await.unwrap();
        tickets::close(&db, ticket.id, 100).await.unwrap();

        let (report, actions) = sweep_once(&dispatcher, 120).await.unwrap();
        assert_eq!(report.reissued_deletes, 0);
        assert!(actions.is_empty());

        let (report, actions) = sweep_once(&dispatcher, 200).await.unwrap();
        assert_eq!(report.reissued_deletes, 1);
        assert!(matches!(
            actions.as_slice(),
            [OutboundAction::DeleteChannel { channel_id: 900, delay_seconds: 0, .. }]
        ));

        dispatcher
            .acknowledge(ActionReceipt::ChannelRemoved { channel_id: 900 })
            .await
            .unwrap();
        let (report, actions) = sweep_once(&dispatcher, 260).await.unwrap();
        assert_eq!(report.reissued_deletes, 0);
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn gateway_channel_delete_settles_removal() {
        let dispatcher = Dispatcher::new(Database::in_memory());
        let db = dispatcher.db().clone();

        let (ticket, _) = tickets::open(&db, 1, 5, 1, 0).await.unwrap();
        tickets::attach_channel(&db, ticket.id, 901).await.unwrap();
        tickets::close(&db, ticket.id, 100).await.unwrap();

        dispatcher
            .dispatch_at(
                InboundEvent::ChannelDeleted {
                    guild_id: 1,
                    channel_id: 901,
                },
                110,
            )
            .await
            .unwrap();

        let (report, _) = sweep_once(&dispatcher, 500).await.unwrap();
        assert_eq!(report.reissued_deletes, 0);
    }

    #[tokio::test]
    async fn sweeper_task_pushes_outcomes() {
        let dispatcher = Dispatcher::new(Database::in_memory());
        let started_at = now_unix_secs().saturating_sub(120);
        campaigns::start(dispatcher.db(), giveaway(102, 60), started_at)
            .await
            .unwrap();

        let (queue, mut receiver) = action_queue();
        let handle = spawn_sweeper(dispatcher, Duration::from_secs(3600), queue);

        let batch = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            batch.as_slice(),
            [OutboundAction::AnnounceOutcome { announcement_id: 102, .. }]
        ));

        handle.abort();
    }
}
