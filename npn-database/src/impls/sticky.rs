use crate::database::{Backend, Database};
use crate::impls::{from_db, to_db};
use crate::model::sticky::StickyMessage;

#[derive(sqlx::FromRow)]
struct StickyRow {
    channel_id: i64,
    guild_id: i64,
    content: String,
    enabled: bool,
    last_message_id: Option<i64>,
}

impl StickyRow {
    fn into_sticky(self) -> anyhow::Result<StickyMessage> {
        Ok(StickyMessage {
            channel_id: from_db(self.channel_id, "channel_id")?,
            guild_id: from_db(self.guild_id, "guild_id")?,
            content: self.content,
            enabled: self.enabled,
            last_message_id: self
                .last_message_id
                .map(|id| from_db(id, "last_message_id"))
                .transpose()?,
        })
    }
}

pub async fn get_sticky(db: &Database, channel_id: u64) -> anyhow::Result<Option<StickyMessage>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let row: Option<StickyRow> = sqlx::query_as(
                "SELECT channel_id, guild_id, content, enabled, last_message_id
                 FROM sticky_messages WHERE channel_id = $1",
            )
            .bind(to_db(channel_id, "channel_id")?)
            .fetch_optional(pool)
            .await?;

            row.map(StickyRow::into_sticky).transpose()
        }
        Backend::Memory(store) => Ok(store.with(|tables| tables.stickies.get(&channel_id).cloned())),
    }
}

/// Create or overwrite a channel's sticky message. The previously posted
/// message id is kept so the old copy can still be cleaned up.
pub async fn set_sticky(
    db: &Database,
    guild_id: u64,
    channel_id: u64,
    content: &str,
) -> anyhow::Result<StickyMessage> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let row: StickyRow = sqlx::query_as(
                "INSERT INTO sticky_messages (channel_id, guild_id, content, enabled)
                 VALUES ($1, $2, $3, TRUE)
                 ON CONFLICT (channel_id) DO UPDATE SET content = EXCLUDED.content, enabled = TRUE
                 RETURNING channel_id, guild_id, content, enabled, last_message_id",
            )
            .bind(to_db(channel_id, "channel_id")?)
            .bind(to_db(guild_id, "guild_id")?)
            .bind(content)
            .fetch_one(pool)
            .await?;

            row.into_sticky()
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            let sticky = tables
                .stickies
                .entry(channel_id)
                .or_insert_with(|| StickyMessage {
                    channel_id,
                    guild_id,
                    content: String::new(),
                    enabled: true,
                    last_message_id: None,
                });
            sticky.content = content.to_owned();
            sticky.enabled = true;
            sticky.clone()
        })),
    }
}

/// Toggle a sticky without discarding its content. Returns `false` when the
/// channel has no sticky.
pub async fn set_sticky_enabled(
    db: &Database,
    channel_id: u64,
    enabled: bool,
) -> anyhow::Result<bool> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let result = sqlx::query("UPDATE sticky_messages SET enabled = $2 WHERE channel_id = $1")
                .bind(to_db(channel_id, "channel_id")?)
                .bind(enabled)
                .execute(pool)
                .await?;

            Ok(result.rows_affected() > 0)
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            match tables.stickies.get_mut(&channel_id) {
                Some(sticky) => {
                    sticky.enabled = enabled;
                    true
                }
                None => false,
            }
        })),
    }
}

/// Delete a channel's sticky, returning the removed record.
pub async fn remove_sticky(
    db: &Database,
    channel_id: u64,
) -> anyhow::Result<Option<StickyMessage>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let row: Option<StickyRow> = sqlx::query_as(
                "DELETE FROM sticky_messages WHERE channel_id = $1
                 RETURNING channel_id, guild_id, content, enabled, last_message_id",
            )
            .bind(to_db(channel_id, "channel_id")?)
            .fetch_optional(pool)
            .await?;

            row.map(StickyRow::into_sticky).transpose()
        }
        Backend::Memory(store) => Ok(store.with(|tables| tables.stickies.remove(&channel_id))),
    }
}

/// Store the id of a freshly posted copy and hand back the one it replaces.
///
/// Returns `None` when the channel no longer has a sticky, and
/// `Some(previous)` otherwise. The swap is atomic so every replaced copy is
/// reported to exactly one caller.
pub async fn record_sticky_posted(
    db: &Database,
    channel_id: u64,
    message_id: u64,
) -> anyhow::Result<Option<Option<u64>>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let row: Option<(Option<i64>,)> = sqlx::query_as(
                "UPDATE sticky_messages AS sticky SET last_message_id = $2
                 FROM (
                    SELECT channel_id, last_message_id FROM sticky_messages
                    WHERE channel_id = $1
                    FOR UPDATE
                 ) AS previous
                 WHERE sticky.channel_id = previous.channel_id
                 RETURNING previous.last_message_id",
            )
            .bind(to_db(channel_id, "channel_id")?)
            .bind(to_db(message_id, "message_id")?)
            .fetch_optional(pool)
            .await?;

            row.map(|(previous,)| previous.map(|id| from_db(id, "last_message_id")).transpose())
                .transpose()
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            tables
                .stickies
                .get_mut(&channel_id)
                .map(|sticky| sticky.last_message_id.replace(message_id))
        })),
    }
}
