//! Giveaway and poll lifecycle: start, entries, exactly-once end, rerolls.

use npn_database::Database;
use npn_database::impls::campaigns::{
    finish_campaign, get_campaign, insert_campaign, list_active_campaigns, list_entries,
    remove_entry, replace_winners, upsert_entry,
};
use npn_database::impls::guild_config::get_guild_config;
use npn_database::model::campaigns::{
    Campaign, CampaignEntry, CampaignPayload, EndReason, EntryChange, EntryWrite, FinishResult,
    NewCampaign,
};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::error::{EngineError, EngineResult};

pub const MIN_POLL_OPTIONS: usize = 2;
pub const MAX_POLL_OPTIONS: usize = 10;

#[derive(Clone, Debug)]
pub struct StartCampaign {
    pub guild_id: u64,
    pub channel_id: u64,
    /// Announcement message; becomes the campaign id.
    pub message_id: u64,
    pub creator_id: u64,
    /// `None` means the campaign only ends manually.
    pub duration_seconds: Option<u64>,
    pub payload: CampaignPayload,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GiveawayOutcome {
    pub campaign_id: u64,
    pub prize: String,
    pub winners: Vec<u64>,
    pub requested: u32,
    pub entrants: usize,
    pub rerolled: bool,
}

impl GiveawayOutcome {
    /// Fewer entrants than prizes.
    pub fn is_partial(&self) -> bool {
        (self.winners.len() as u64) < u64::from(self.requested)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OptionResult {
    pub index: u32,
    pub label: String,
    pub votes: usize,
    pub percentage: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PollOutcome {
    pub campaign_id: u64,
    pub question: String,
    /// Ranked by votes; ties keep option order.
    pub results: Vec<OptionResult>,
    pub total_votes: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Giveaway(GiveawayOutcome),
    Poll(PollOutcome),
}

impl Outcome {
    pub fn campaign_id(&self) -> u64 {
        match self {
            Self::Giveaway(outcome) => outcome.campaign_id,
            Self::Poll(outcome) => outcome.campaign_id,
        }
    }
}

fn validate_payload(payload: CampaignPayload) -> EngineResult<CampaignPayload> {
    match payload {
        CampaignPayload::Giveaway {
            prize,
            winners_count,
        } => {
            let prize = prize.trim().to_owned();
            if prize.is_empty() {
                return Err(EngineError::InvalidInput("prize cannot be empty".into()));
            }
            if winners_count == 0 {
                return Err(EngineError::InvalidInput(
                    "a giveaway needs at least one winner".into(),
                ));
            }
            Ok(CampaignPayload::Giveaway {
                prize,
                winners_count,
            })
        }
        CampaignPayload::Poll { question, options } => {
            let question = question.trim().to_owned();
            if question.is_empty() {
                return Err(EngineError::InvalidInput("question cannot be empty".into()));
            }

            let options: Vec<String> = options
                .iter()
                .map(|option| option.trim())
                .filter(|option| !option.is_empty())
                .map(str::to_owned)
                .collect();

            if options.len() < MIN_POLL_OPTIONS {
                return Err(EngineError::InvalidInput(format!(
                    "a poll needs at least {MIN_POLL_OPTIONS} options"
                )));
            }
            if options.len() > MAX_POLL_OPTIONS {
                return Err(EngineError::CapacityExceeded {
                    what: "poll options",
                    limit: MAX_POLL_OPTIONS,
                });
            }

            Ok(CampaignPayload::Poll { question, options })
        }
    }
}

pub async fn start(db: &Database, request: StartCampaign, now: u64) -> EngineResult<Campaign> {
    let payload = validate_payload(request.payload)?;

    if request.duration_seconds == Some(0) {
        return Err(EngineError::InvalidInput(
            "duration must be at least one second".into(),
        ));
    }

    let campaign = insert_campaign(
        db,
        NewCampaign {
            id: request.message_id,
            guild_id: request.guild_id,
            channel_id: request.channel_id,
            creator_id: request.creator_id,
            created_at: now,
            ends_at: request.duration_seconds.map(|secs| now.saturating_add(secs)),
            payload,
        },
    )
    .await?
    .ok_or_else(|| {
        EngineError::InvalidInput(format!("campaign {} already exists", request.message_id))
    })?;

    info!(
        campaign_id = campaign.id,
        guild_id = campaign.guild_id,
        kind = %campaign.kind(),
        ends_at = ?campaign.ends_at,
        "campaign started"
    );

    Ok(campaign)
}

fn applied(write: EntryWrite) -> EngineResult<EntryChange> {
    match write {
        EntryWrite::Missing => Err(EngineError::CampaignNotFound),
        EntryWrite::Ended => Err(EngineError::CampaignEnded),
        EntryWrite::Applied(change) => Ok(change),
    }
}

/// Enter a giveaway (`choice = None`) or vote in a poll. Poll votes replace
/// the participant's previous choice.
pub async fn record_entry(
    db: &Database,
    campaign_id: u64,
    user_id: u64,
    choice: Option<u32>,
    now: u64,
) -> EngineResult<EntryChange> {
    let campaign = get(db, campaign_id).await?;
    if !campaign.is_active() {
        return Err(EngineError::CampaignEnded);
    }

    let choice = match (&campaign.payload, choice) {
        (CampaignPayload::Giveaway { .. }, None) => None,
        (CampaignPayload::Giveaway { .. }, Some(_)) => {
            return Err(EngineError::InvalidTransition(
                "giveaway entries do not carry a choice",
            ));
        }
        (CampaignPayload::Poll { options, .. }, Some(index)) => {
            if index as usize >= options.len() {
                return Err(EngineError::InvalidInput(format!(
                    "option {} does not exist",
                    index + 1
                )));
            }
            Some(index)
        }
        (CampaignPayload::Poll { .. }, None) => {
            return Err(EngineError::InvalidInput("a vote needs an option".into()));
        }
    };

    applied(upsert_entry(db, campaign_id, user_id, choice, now).await?)
}

pub async fn withdraw_entry(
    db: &Database,
    campaign_id: u64,
    user_id: u64,
) -> EngineResult<EntryChange> {
    let campaign = get(db, campaign_id).await?;
    if let CampaignPayload::Poll { .. } = campaign.payload {
        return Err(EngineError::InvalidTransition("poll votes cannot be withdrawn"));
    }

    applied(remove_entry(db, campaign_id, user_id).await?)
}

/// Pick up to `count` distinct winners uniformly at random.
pub fn draw_winners<R: Rng + ?Sized>(pool: &[u64], count: u32, rng: &mut R) -> Vec<u64> {
    pool.choose_multiple(rng, count as usize).copied().collect()
}

/// Count each participant's final choice and rank the options.
pub fn tally(options: &[String], entries: &[CampaignEntry]) -> (Vec<OptionResult>, usize) {
    let mut counts = vec![0usize; options.len()];
    for choice in entries.iter().filter_map(|entry| entry.choice) {
        if let Some(count) = counts.get_mut(choice as usize) {
            *count += 1;
        }
    }

    let total: usize = counts.iter().sum();
    let mut results: Vec<OptionResult> = options
        .iter()
        .zip(counts)
        .enumerate()
        .map(|(index, (label, votes))| OptionResult {
            index: index as u32,
            label: label.clone(),
            votes,
            percentage: if total == 0 {
                0.0
            } else {
                votes as f64 * 100.0 / total as f64
            },
        })
        .collect();

    // Stable sort, so equal counts stay in option order.
    results.sort_by(|a, b| b.votes.cmp(&a.votes));
    (results, total)
}

fn outcome_for(campaign: &Campaign, entries: &[CampaignEntry], rerolled: bool) -> Outcome {
    match &campaign.payload {
        CampaignPayload::Giveaway {
            prize,
            winners_count,
        } => Outcome::Giveaway(GiveawayOutcome {
            campaign_id: campaign.id,
            prize: prize.clone(),
            winners: campaign.winners.clone(),
            requested: *winners_count,
            entrants: entries.len(),
            rerolled,
        }),
        CampaignPayload::Poll { question, options } => {
            let (results, total_votes) = tally(options, entries);
            Outcome::Poll(PollOutcome {
                campaign_id: campaign.id,
                question: question.clone(),
                results,
                total_votes,
            })
        }
    }
}

/// End an active campaign. Only one caller ever succeeds; the rest get
/// [`EngineError::CampaignEnded`].
pub async fn end(
    db: &Database,
    campaign_id: u64,
    reason: EndReason,
    now: u64,
) -> EngineResult<(Campaign, Outcome)> {
    let result = finish_campaign(db, campaign_id, reason, now, |campaign, entries| {
        match &campaign.payload {
            CampaignPayload::Giveaway { winners_count, .. } => {
                let pool: Vec<u64> = entries.iter().map(|entry| entry.user_id).collect();
                draw_winners(&pool, *winners_count, &mut rand::thread_rng())
            }
            CampaignPayload::Poll { .. } => Vec::new(),
        }
    })
    .await?;

    match result {
        FinishResult::Missing => Err(EngineError::CampaignNotFound),
        FinishResult::AlreadyEnded => Err(EngineError::CampaignEnded),
        FinishResult::Finished { campaign, entries } => {
            info!(
                campaign_id,
                reason = reason.as_str(),
                entrants = entries.len(),
                "campaign ended"
            );
            let outcome = outcome_for(&campaign, &entries, false);
            Ok((campaign, outcome))
        }
    }
}

/// Draw new winners for an ended giveaway from the same entrants.
///
/// With `exclude_previous_winners` set, everyone announced by any earlier
/// draw is left out of the pool. A draw that comes up empty is rejected and
/// the stored winners stay as they were.
pub async fn reroll(db: &Database, campaign_id: u64) -> EngineResult<(Campaign, Outcome)> {
    let campaign = get(db, campaign_id).await?;

    let winners_count = match &campaign.payload {
        CampaignPayload::Giveaway { winners_count, .. } => *winners_count,
        CampaignPayload::Poll { .. } => {
            return Err(EngineError::InvalidTransition("only giveaways can be rerolled"));
        }
    };
    if campaign.is_active() {
        return Err(EngineError::InvalidTransition("giveaway is still running"));
    }

    let config = get_guild_config(db, campaign.guild_id).await?;
    let entries = list_entries(db, campaign_id).await?;

    let pool: Vec<u64> = entries
        .iter()
        .map(|entry| entry.user_id)
        .filter(|user_id| {
            !config.exclude_previous_winners
                || !(campaign.winners.contains(user_id) || campaign.past_winners.contains(user_id))
        })
        .collect();

    let winners = draw_winners(&pool, winners_count, &mut rand::thread_rng());
    if winners.is_empty() {
        return Err(EngineError::InvalidTransition("no eligible entrants left to draw"));
    }

    let campaign = replace_winners(db, campaign_id, &winners)
        .await?
        .ok_or(EngineError::CampaignNotFound)?;

    info!(campaign_id, winners = winners.len(), "giveaway rerolled");

    let outcome = outcome_for(&campaign, &entries, true);
    Ok((campaign, outcome))
}

pub async fn get(db: &Database, campaign_id: u64) -> EngineResult<Campaign> {
    get_campaign(db, campaign_id)
        .await?
        .ok_or(EngineError::CampaignNotFound)
}

pub async fn list_active(db: &Database, guild_id: u64) -> EngineResult<Vec<Campaign>> {
    Ok(list_active_campaigns(db, guild_id).await?)
}
