#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(anyhow::anyhow!("unknown ticket status `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub id: u64,
    pub guild_id: u64,
    pub number: u64,
    /// Set once the platform channel has been created.
    pub channel_id: Option<u64>,
    pub creator_id: u64,
    pub status: TicketStatus,
    pub created_at: u64,
    pub closed_at: Option<u64>,
}

#[derive(Clone, Debug)]
pub enum TicketClose {
    Missing,
    AlreadyClosed,
    Closed(Ticket),
}
