use thiserror::Error;

/// Coarse classification callers use to decide how to surface a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyTerminal,
    InvalidTransition,
    CapacityExceeded,
    InvalidInput,
    StoreUnavailable,
}

/// Errors returned by engine operations. Only [`EngineError::StoreUnavailable`]
/// means the operation may not have been applied; every other variant is
/// raised before any state changes.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("campaign not found")]
    CampaignNotFound,

    #[error("ticket not found")]
    TicketNotFound,

    #[error("no configuration found")]
    ConfigNotFound,

    #[error("campaign has already ended")]
    CampaignEnded,

    #[error("ticket is already closed")]
    AlreadyClosed,

    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    #[error("too many {what} (limit is {limit})")]
    CapacityExceeded { what: &'static str, limit: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store unavailable: {0:#}")]
    StoreUnavailable(#[from] anyhow::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CampaignNotFound | Self::TicketNotFound | Self::ConfigNotFound => {
                ErrorKind::NotFound
            }
            Self::CampaignEnded | Self::AlreadyClosed => ErrorKind::AlreadyTerminal,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }

    /// Everything except store failures is a rejected request, not a fault.
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::StoreUnavailable
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_group_variants() {
        assert_eq!(EngineError::CampaignEnded.kind(), ErrorKind::AlreadyTerminal);
        assert_eq!(EngineError::AlreadyClosed.kind(), ErrorKind::AlreadyTerminal);
        assert_eq!(EngineError::TicketNotFound.kind(), ErrorKind::NotFound);
        assert!(EngineError::InvalidTransition("x").is_recoverable());
        assert!(!EngineError::from(anyhow::anyhow!("connection reset")).is_recoverable());
    }
}
