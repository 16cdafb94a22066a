use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_MESSAGES: u32 = 5;
pub const DEFAULT_TIME_WINDOW_SECONDS: u64 = 10;
pub const DEFAULT_DUPLICATE_THRESHOLD: u32 = 1;

/// Moderation action applied when the anti-spam tracker flags a member.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpamAction {
    #[default]
    Warn,
    Mute,
    Kick,
}

impl SpamAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Mute => "mute",
            Self::Kick => "kick",
        }
    }
}

impl fmt::Display for SpamAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpamAction {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "mute" | "timeout" => Ok(Self::Mute),
            "kick" => Ok(Self::Kick),
            other => Err(anyhow::anyhow!("unknown anti-spam action `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiSpamConfig {
    pub enabled: bool,
    pub max_messages: u32,
    pub time_window_seconds: u64,
    pub action: SpamAction,
    /// Consecutive identical messages tolerated; the next identical one is
    /// flagged. Zero disables duplicate detection.
    pub duplicate_threshold: u32,
}

impl Default for AntiSpamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_messages: DEFAULT_MAX_MESSAGES,
            time_window_seconds: DEFAULT_TIME_WINDOW_SECONDS,
            action: SpamAction::Warn,
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketConfig {
    pub category_id: Option<u64>,
    pub support_role_ids: Vec<u64>,
}

/// Per-guild settings read by the engine. A guild without a stored row gets
/// [`GuildConfig::defaults`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    pub guild_id: u64,
    pub antispam: AntiSpamConfig,
    pub tickets: TicketConfig,
    pub exclude_previous_winners: bool,
}

impl GuildConfig {
    pub fn defaults(guild_id: u64) -> Self {
        Self {
            guild_id,
            antispam: AntiSpamConfig::default(),
            tickets: TicketConfig::default(),
            exclude_previous_winners: false,
        }
    }
}
