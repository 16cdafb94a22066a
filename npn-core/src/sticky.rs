//! Messages that are reposted so they always sit at the bottom of a channel.

use npn_database::Database;
use npn_database::impls::sticky::{
    get_sticky, record_sticky_posted, remove_sticky, set_sticky, set_sticky_enabled,
};
use npn_database::model::sticky::StickyMessage;
use tracing::info;

use crate::actions::{MessageOrigin, OutboundAction};
use crate::error::{EngineError, EngineResult};

pub const MAX_STICKY_LENGTH: usize = 2000;

fn post(sticky: &StickyMessage) -> OutboundAction {
    OutboundAction::SendMessage {
        channel_id: sticky.channel_id,
        content: sticky.content.clone(),
        mention: None,
        origin: MessageOrigin::Sticky,
        buttons: Vec::new(),
        delete_after: None,
    }
}

fn delete_previous(sticky: &StickyMessage) -> Option<OutboundAction> {
    sticky
        .last_message_id
        .map(|message_id| OutboundAction::DeleteMessage {
            channel_id: sticky.channel_id,
            message_id,
        })
}

/// Create or replace the sticky message for a channel and post it. The old
/// copy is removed once the new one is acknowledged.
pub async fn set(
    db: &Database,
    guild_id: u64,
    channel_id: u64,
    content: &str,
) -> EngineResult<Vec<OutboundAction>> {
    let content = content.trim();
    if content.is_empty() {
        return Err(EngineError::InvalidInput("sticky content cannot be empty".into()));
    }
    if content.chars().count() > MAX_STICKY_LENGTH {
        return Err(EngineError::CapacityExceeded {
            what: "characters",
            limit: MAX_STICKY_LENGTH,
        });
    }

    let sticky = set_sticky(db, guild_id, channel_id, content).await?;
    info!(guild_id, channel_id, "sticky message set");
    Ok(vec![post(&sticky)])
}

/// Remove a channel's sticky and its posted copy.
pub async fn remove(db: &Database, channel_id: u64) -> EngineResult<Vec<OutboundAction>> {
    let sticky = remove_sticky(db, channel_id)
        .await?
        .ok_or(EngineError::ConfigNotFound)?;
    info!(guild_id = sticky.guild_id, channel_id, "sticky message removed");
    Ok(delete_previous(&sticky).into_iter().collect())
}

pub async fn set_enabled(db: &Database, channel_id: u64, enabled: bool) -> EngineResult<()> {
    if set_sticky_enabled(db, channel_id, enabled).await? {
        Ok(())
    } else {
        Err(EngineError::ConfigNotFound)
    }
}

pub async fn get(db: &Database, channel_id: u64) -> EngineResult<Option<StickyMessage>> {
    Ok(get_sticky(db, channel_id).await?)
}

/// Remember a freshly posted copy and clean up whatever it replaced.
///
/// Every copy is swapped out by exactly one acknowledgement, so reposts that
/// overlap never leave a stale copy behind. A copy posted after the sticky
/// was removed is deleted straight away.
pub async fn record_posted(
    db: &Database,
    channel_id: u64,
    message_id: u64,
) -> EngineResult<Vec<OutboundAction>> {
    let stale = match record_sticky_posted(db, channel_id, message_id).await? {
        None => Some(message_id),
        Some(previous) => previous.filter(|previous| *previous != message_id),
    };

    Ok(stale
        .map(|message_id| OutboundAction::DeleteMessage {
            channel_id,
            message_id,
        })
        .into_iter()
        .collect())
}

/// Post a fresh copy of the channel's sticky after someone else wrote in it.
pub async fn on_message(db: &Database, channel_id: u64) -> EngineResult<Vec<OutboundAction>> {
    match get(db, channel_id).await? {
        Some(sticky) if sticky.enabled => Ok(vec![post(&sticky)]),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn acknowledged_copy_replaces_previous() {
        let db = Database::in_memory();

        let actions = set(&db, 1, 2, "Read the rules").await.unwrap();
        assert!(matches!(
            actions.as_slice(),
            [OutboundAction::SendMessage { origin: MessageOrigin::Sticky, .. }]
        ));
        assert!(record_posted(&db, 2, 500).await.unwrap().is_empty());

        let actions = on_message(&db, 2).await.unwrap();
        assert!(matches!(
            actions.as_slice(),
            [OutboundAction::SendMessage { channel_id: 2, .. }]
        ));

        let actions = record_posted(&db, 2, 501).await.unwrap();
        assert!(matches!(
            actions.as_slice(),
            [OutboundAction::DeleteMessage { channel_id: 2, message_id: 500 }]
        ));
        assert_eq!(get(&db, 2).await.unwrap().unwrap().last_message_id, Some(501));
    }

    #[tokio::test]
    async fn copy_posted_after_removal_is_deleted() {
        let db = Database::in_memory();
        set(&db, 1, 2, "hi").await.unwrap();
        remove(&db, 2).await.unwrap();

        let actions = record_posted(&db, 2, 77).await.unwrap();
        assert!(matches!(
            actions.as_slice(),
            [OutboundAction::DeleteMessage { channel_id: 2, message_id: 77 }]
        ));
    }

    #[tokio::test]
    async fn disabled_sticky_stays_quiet() {
        let db = Database::in_memory();
        set(&db, 1, 2, "hi").await.unwrap();
        set_enabled(&db, 2, false).await.unwrap();

        assert!(on_message(&db, 2).await.unwrap().is_empty());
        assert!(on_message(&db, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_requires_sticky() {
        let db = Database::in_memory();
        let err = remove(&db, 2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        set(&db, 1, 2, "hi").await.unwrap();
        record_posted(&db, 2, 9).await.unwrap();
        let actions = remove(&db, 2).await.unwrap();
        assert!(matches!(
            actions.as_slice(),
            [OutboundAction::DeleteMessage { message_id: 9, .. }]
        ));
        assert!(get(&db, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_blank_content() {
        let db = Database::in_memory();
        let err = set(&db, 1, 2, "   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
