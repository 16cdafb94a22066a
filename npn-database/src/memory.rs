use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use crate::model::campaigns::{Campaign, CampaignEntry};
use crate::model::guild_config::GuildConfig;
use crate::model::spam::SpamWindowRecord;
use crate::model::sticky::StickyMessage;
use crate::model::tickets::Ticket;

#[derive(Debug, Default)]
pub(crate) struct MemoryTables {
    pub guild_configs: HashMap<u64, GuildConfig>,
    pub ticket_counters: HashMap<u64, u64>,
    pub tickets: BTreeMap<u64, Ticket>,
    pub next_ticket_id: u64,
    /// Ticket channels confirmed gone from the platform.
    pub removed_ticket_channels: HashSet<u64>,
    pub campaigns: HashMap<u64, Campaign>,
    pub entries: HashMap<u64, BTreeMap<u64, CampaignEntry>>,
    pub spam_windows: HashMap<(u64, u64), SpamWindowRecord>,
    pub stickies: HashMap<u64, StickyMessage>,
}

/// In-process tables guarded by a single mutex. Every query runs to
/// completion while holding the lock, which gives each operation the same
/// atomicity the Postgres statements have.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<MemoryTables>>,
}

impl MemoryStore {
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut MemoryTables) -> R) -> R {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tables)
    }
}
