/// Persisted snapshot of a member's anti-spam window.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpamWindowRecord {
    pub guild_id: u64,
    pub user_id: u64,
    pub timestamps: Vec<u64>,
    pub last_hash: Option<String>,
    pub repeat_count: u32,
}
