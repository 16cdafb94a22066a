#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StickyMessage {
    pub channel_id: u64,
    pub guild_id: u64,
    pub content: String,
    pub enabled: bool,
    pub last_message_id: Option<u64>,
}
