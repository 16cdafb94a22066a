//! Per-member sliding-window flood and duplicate detection.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use npn_database::Database;
use npn_database::impls::spam_windows::{
    delete_spam_window, load_spam_window, purge_stale_spam_windows, save_spam_window,
};
use npn_database::model::guild_config::{AntiSpamConfig, SpamAction};
use npn_database::model::spam::SpamWindowRecord;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::EngineResult;

pub const MUTE_DURATION_SECONDS: u64 = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpamReason {
    Flood,
    Duplicate,
}

impl SpamReason {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Flood => "sending messages too quickly",
            Self::Duplicate => "repeating the same message",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    Spam { action: SpamAction, reason: SpamReason },
}

/// Hex SHA-256 digest of the exact message content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct SpamWindow {
    timestamps: VecDeque<u64>,
    last_hash: Option<String>,
    /// Length of the current run of identical messages.
    repeat_count: u32,
}

impl SpamWindow {
    fn from_record(record: SpamWindowRecord) -> Self {
        Self {
            timestamps: record.timestamps.into(),
            last_hash: record.last_hash,
            repeat_count: record.repeat_count,
        }
    }

    fn to_record(&self, guild_id: u64, user_id: u64) -> SpamWindowRecord {
        SpamWindowRecord {
            guild_id,
            user_id,
            timestamps: self.timestamps.iter().copied().collect(),
            last_hash: self.last_hash.clone(),
            repeat_count: self.repeat_count,
        }
    }

    fn record(&mut self, config: &AntiSpamConfig, hash: &str, now: u64) -> Option<SpamReason> {
        self.timestamps.push_back(now);
        self.timestamps
            .retain(|seen| now.saturating_sub(*seen) <= config.time_window_seconds);

        if self.last_hash.as_deref() == Some(hash) {
            self.repeat_count = self.repeat_count.saturating_add(1);
        } else {
            self.last_hash = Some(hash.to_owned());
            self.repeat_count = 1;
        }

        if self.timestamps.len() > config.max_messages as usize {
            self.timestamps.clear();
            return Some(SpamReason::Flood);
        }

        if config.duplicate_threshold > 0 && self.repeat_count > config.duplicate_threshold {
            return Some(SpamReason::Duplicate);
        }

        None
    }

    fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    fn is_stale(&self, now: u64, window: u64) -> bool {
        self.timestamps
            .back()
            .is_none_or(|last| now.saturating_sub(*last) > window)
    }
}

/// `None` until the window has been loaded from the store.
type WindowSlot = Arc<tokio::sync::Mutex<Option<SpamWindow>>>;

/// Tracks recent messages per (guild, member).
///
/// The outer map lock is only held to find or insert a member's slot; all
/// window work happens under that member's own async lock, so members never
/// contend with each other.
#[derive(Debug, Default)]
pub struct RateWindowTracker {
    windows: Mutex<HashMap<(u64, u64), WindowSlot>>,
}

impl RateWindowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, guild_id: u64, user_id: u64) -> WindowSlot {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.entry((guild_id, user_id)).or_default().clone()
    }

    pub async fn record_message(
        &self,
        db: &Database,
        config: &AntiSpamConfig,
        guild_id: u64,
        user_id: u64,
        content_hash: &str,
        now: u64,
    ) -> EngineResult<Verdict> {
        if !config.enabled {
            return Ok(Verdict::Ok);
        }

        let slot = self.slot(guild_id, user_id);
        let mut guard = slot.lock().await;

        if guard.is_none() {
            let loaded = load_spam_window(db, guild_id, user_id)
                .await?
                .map(SpamWindow::from_record)
                .unwrap_or_default();
            *guard = Some(loaded);
        }
        let window = guard.get_or_insert_with(SpamWindow::default);

        let reason = window.record(config, content_hash, now);

        if window.is_empty() {
            delete_spam_window(db, guild_id, user_id).await?;
            *guard = None;
        } else {
            save_spam_window(db, &window.to_record(guild_id, user_id)).await?;
        }

        Ok(match reason {
            Some(reason) => {
                debug!(guild_id, user_id, ?reason, "spam detected");
                Verdict::Spam {
                    action: config.action,
                    reason,
                }
            }
            None => Verdict::Ok,
        })
    }

    /// Drop a member's window, e.g. when they leave the guild.
    pub async fn forget(&self, db: &Database, guild_id: u64, user_id: u64) -> EngineResult<()> {
        let slot = self.slot(guild_id, user_id);
        let mut guard = slot.lock().await;
        *guard = None;
        delete_spam_window(db, guild_id, user_id).await?;
        Ok(())
    }

    /// Release in-memory slots nobody is using whose window is empty or older
    /// than `max_window` seconds. Persisted state is untouched.
    pub fn evict_idle(&self, now: u64, max_window: u64) -> usize {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(window) => window
                    .as_ref()
                    .is_some_and(|window| !window.is_stale(now, max_window)),
                Err(_) => true,
            }
        });
        before - windows.len()
    }

    /// Delete persisted windows whose newest message is more than
    /// `max_window` seconds old.
    pub async fn purge_stale(&self, db: &Database, now: u64, max_window: u64) -> EngineResult<u64> {
        let cutoff = now.saturating_sub(max_window);
        Ok(purge_stale_spam_windows(db, cutoff).await?)
    }

    pub fn tracked(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npn_database::impls::spam_windows::count_spam_windows;

    const GUILD: u64 = 10;
    const USER: u64 = 20;

    fn enabled() -> AntiSpamConfig {
        AntiSpamConfig {
            enabled: true,
            duplicate_threshold: 0,
            ..AntiSpamConfig::default()
        }
    }

    async fn send(
        tracker: &RateWindowTracker,
        db: &Database,
        config: &AntiSpamConfig,
        text: &str,
        at: u64,
    ) -> Verdict {
        tracker
            .record_message(db, config, GUILD, USER, &content_hash(text), at)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn sixth_message_inside_window_is_flood() {
        let db = Database::in_memory();
        let tracker = RateWindowTracker::new();
        let config = enabled();

        for (i, at) in [0, 2, 4, 6, 8].into_iter().enumerate() {
            assert_eq!(send(&tracker, &db, &config, &format!("m{i}"), at).await, Verdict::Ok);
        }

        assert_eq!(
            send(&tracker, &db, &config, "m5", 9).await,
            Verdict::Spam {
                action: SpamAction::Warn,
                reason: SpamReason::Flood
            }
        );
    }

    #[tokio::test]
    async fn sixth_message_after_window_is_ok() {
        let db = Database::in_memory();
        let tracker = RateWindowTracker::new();
        let config = enabled();

        for (i, at) in [0, 1, 2, 3, 4].into_iter().enumerate() {
            assert_eq!(send(&tracker, &db, &config, &format!("m{i}"), at).await, Verdict::Ok);
        }

        // t=0 has aged out by t=11, leaving five messages in the window.
        assert_eq!(send(&tracker, &db, &config, "m5", 11).await, Verdict::Ok);
    }

    #[tokio::test]
    async fn flood_clears_the_window() {
        let db = Database::in_memory();
        let tracker = RateWindowTracker::new();
        let config = enabled();

        for i in 0..6 {
            send(&tracker, &db, &config, &format!("m{i}"), 1).await;
        }
        assert_eq!(send(&tracker, &db, &config, "after", 2).await, Verdict::Ok);
    }

    #[tokio::test]
    async fn disabled_config_keeps_no_state() {
        let db = Database::in_memory();
        let tracker = RateWindowTracker::new();
        let config = AntiSpamConfig::default();

        for at in 0..20 {
            assert_eq!(send(&tracker, &db, &config, "same", at).await, Verdict::Ok);
        }

        assert_eq!(tracker.tracked(), 0);
        assert_eq!(count_spam_windows(&db, GUILD).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn second_identical_message_is_duplicate() {
        let db = Database::in_memory();
        let tracker = RateWindowTracker::new();
        let config = AntiSpamConfig {
            enabled: true,
            action: SpamAction::Mute,
            ..AntiSpamConfig::default()
        };

        assert_eq!(send(&tracker, &db, &config, "buy now", 0).await, Verdict::Ok);
        assert_eq!(
            send(&tracker, &db, &config, "buy now", 1).await,
            Verdict::Spam {
                action: SpamAction::Mute,
                reason: SpamReason::Duplicate
            }
        );
        assert_eq!(send(&tracker, &db, &config, "something else", 2).await, Verdict::Ok);
    }

    #[tokio::test]
    async fn window_survives_a_restart() {
        let db = Database::in_memory();
        let config = enabled();

        let first = RateWindowTracker::new();
        for i in 0..5 {
            send(&first, &db, &config, &format!("m{i}"), i).await;
        }
        assert_eq!(count_spam_windows(&db, GUILD).await.unwrap(), 1);

        let second = RateWindowTracker::new();
        assert!(matches!(
            send(&second, &db, &config, "m5", 5).await,
            Verdict::Spam { reason: SpamReason::Flood, .. }
        ));
    }

    #[tokio::test]
    async fn forget_drops_persisted_window() {
        let db = Database::in_memory();
        let tracker = RateWindowTracker::new();
        let config = enabled();

        send(&tracker, &db, &config, "hello", 0).await;
        tracker.forget(&db, GUILD, USER).await.unwrap();

        assert_eq!(count_spam_windows(&db, GUILD).await.unwrap(), 0);
        assert_eq!(tracker.evict_idle(0, 10), 1);
    }

    #[tokio::test]
    async fn idle_slots_are_evicted() {
        let db = Database::in_memory();
        let tracker = RateWindowTracker::new();
        let config = enabled();

        send(&tracker, &db, &config, "hello", 0).await;
        assert_eq!(tracker.evict_idle(5, 10), 0);
        assert_eq!(tracker.evict_idle(30, 10), 1);
        assert_eq!(tracker.tracked(), 0);
    }

    #[test]
    fn content_hash_is_lowercase_hex() {
        let hash = content_hash("hello");
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_ne!(hash, content_hash("Hello"));
    }

    #[tokio::test]
    async fn stale_windows_leave_the_store() {
        let db = Database::in_memory();
        let tracker = RateWindowTracker::new();
        let config = enabled();

        for user_id in 0..100 {
            tracker
                .record_message(&db, &config, GUILD, user_id, "hi", 0)
                .await
                .unwrap();
        }
        assert_eq!(count_spam_windows(&db, GUILD).await.unwrap(), 100);

        assert_eq!(tracker.evict_idle(1_000_000, 600), 100);
        assert_eq!(tracker.purge_stale(&db, 1_000_000, 600).await.unwrap(), 100);
        assert_eq!(count_spam_windows(&db, GUILD).await.unwrap(), 0);
        assert_eq!(tracker.tracked(), 0);
    }
}
