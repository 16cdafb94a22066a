/// Renders outbound actions through the serenity HTTP client.
pub mod actions;
/// Embed builders for campaign announcements and results.
pub mod embed;
/// Shared formatting helpers (durations, result bars, mentions).
pub mod formatting;
/// Pure parser helpers.
pub mod parse;
/// Permission helper utilities.
pub mod permissions;
/// Failure classification and backoff for platform calls.
pub mod retry;

/// Single source of truth for the message-command prefix.
pub const COMMAND_PREFIX: char = '!';
