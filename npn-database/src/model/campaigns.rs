use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
    Giveaway,
    Poll,
}

impl CampaignKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Giveaway => "giveaway",
            Self::Poll => "poll",
        }
    }
}

impl fmt::Display for CampaignKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Active,
    Ended,
}

impl CampaignStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw {
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            other => Err(anyhow::anyhow!("unknown campaign status `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Expired,
    Manual,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Manual => "manual",
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw {
            "expired" => Ok(Self::Expired),
            "manual" => Ok(Self::Manual),
            other => Err(anyhow::anyhow!("unknown end reason `{other}`")),
        }
    }
}

/// Variant-specific campaign data, stored as JSON alongside the shared
/// lifecycle columns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CampaignPayload {
    Giveaway { prize: String, winners_count: u32 },
    Poll { question: String, options: Vec<String> },
}

impl CampaignPayload {
    pub fn kind(&self) -> CampaignKind {
        match self {
            Self::Giveaway { .. } => CampaignKind::Giveaway,
            Self::Poll { .. } => CampaignKind::Poll,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Campaign {
    /// Platform message id of the announcement message.
    pub id: u64,
    pub guild_id: u64,
    pub channel_id: u64,
    pub creator_id: u64,
    pub created_at: u64,
    pub ends_at: Option<u64>,
    pub status: CampaignStatus,
    pub ended_at: Option<u64>,
    pub end_reason: Option<EndReason>,
    pub payload: CampaignPayload,
    /// Most recent winner draw. Empty until a giveaway ends.
    pub winners: Vec<u64>,
    /// Every winner ever announced for this campaign, across all draws.
    pub past_winners: Vec<u64>,
}

impl Campaign {
    pub fn kind(&self) -> CampaignKind {
        self.payload.kind()
    }

    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active
    }
}

pub struct NewCampaign {
    pub id: u64,
    pub guild_id: u64,
    pub channel_id: u64,
    pub creator_id: u64,
    pub created_at: u64,
    pub ends_at: Option<u64>,
    pub payload: CampaignPayload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CampaignEntry {
    pub user_id: u64,
    /// Poll option index. Always `None` for giveaway entrants.
    pub choice: Option<u32>,
    pub entered_at: u64,
}

/// How a store write touched an entrant row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryChange {
    Inserted,
    Replaced { previous: Option<u32> },
    Unchanged,
    Removed,
}

/// Result of an entrant write guarded by the campaign's status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryWrite {
    Missing,
    Ended,
    Applied(EntryChange),
}

/// Result of the ACTIVE -> ENDED compare-and-set.
#[derive(Clone, Debug)]
pub enum FinishResult {
    Missing,
    AlreadyEnded,
    Finished {
        campaign: Campaign,
        entries: Vec<CampaignEntry>,
    },
}
