use anyhow::Context as _;

use crate::database::{Backend, Database};
use crate::impls::{from_db_all, to_db, to_db_all};
use crate::model::spam::SpamWindowRecord;

pub async fn load_spam_window(
    db: &Database,
    guild_id: u64,
    user_id: u64,
) -> anyhow::Result<Option<SpamWindowRecord>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let row = sqlx::query_as::<_, (Vec<i64>, Option<String>, i32)>(
                "SELECT timestamps, last_hash, repeat_count FROM spam_windows
                 WHERE guild_id = $1 AND user_id = $2",
            )
            .bind(to_db(guild_id, "guild_id")?)
            .bind(to_db(user_id, "user_id")?)
            .fetch_optional(pool)
            .await?;

            row.map(|(timestamps, last_hash, repeat_count)| {
                Ok(SpamWindowRecord {
                    guild_id,
                    user_id,
                    timestamps: from_db_all(timestamps, "timestamp")?,
                    last_hash,
                    repeat_count: u32::try_from(repeat_count)
                        .context("repeat_count out of u32 range")?,
                })
            })
            .transpose()
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            tables.spam_windows.get(&(guild_id, user_id)).cloned()
        })),
    }
}

pub async fn save_spam_window(db: &Database, record: &SpamWindowRecord) -> anyhow::Result<()> {
    match db.backend() {
        Backend::Postgres(pool) => {
            sqlx::query(
                "INSERT INTO spam_windows (guild_id, user_id, timestamps, last_hash, repeat_count)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (guild_id, user_id) DO UPDATE SET
                    timestamps = EXCLUDED.timestamps,
                    last_hash = EXCLUDED.last_hash,
                    repeat_count = EXCLUDED.repeat_count",
            )
            .bind(to_db(record.guild_id, "guild_id")?)
            .bind(to_db(record.user_id, "user_id")?)
            .bind(to_db_all(&record.timestamps, "timestamp")?)
            .bind(record.last_hash.as_deref())
            .bind(i32::try_from(record.repeat_count).context("repeat_count out of i32 range")?)
            .execute(pool)
            .await?;
        }
        Backend::Memory(store) => store.with(|tables| {
            tables
                .spam_windows
                .insert((record.guild_id, record.user_id), record.clone());
        }),
    }

    Ok(())
}

pub async fn delete_spam_window(db: &Database, guild_id: u64, user_id: u64) -> anyhow::Result<()> {
    match db.backend() {
        Backend::Postgres(pool) => {
            sqlx::query("DELETE FROM spam_windows WHERE guild_id = $1 AND user_id = $2")
                .bind(to_db(guild_id, "guild_id")?)
                .bind(to_db(user_id, "user_id")?)
                .execute(pool)
                .await?;
        }
        Backend::Memory(store) => store.with(|tables| {
            tables.spam_windows.remove(&(guild_id, user_id));
        }),
    }

    Ok(())
}

/// Number of persisted windows for a guild. Used by diagnostics.
pub async fn count_spam_windows(db: &Database, guild_id: u64) -> anyhow::Result<u64> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM spam_windows WHERE guild_id = $1")
                    .bind(to_db(guild_id, "guild_id")?)
                    .fetch_one(pool)
                    .await?;

            u64::try_from(count).context("spam window count out of u64 range")
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            tables
                .spam_windows
                .keys()
                .filter(|(guild, _)| *guild == guild_id)
                .count() as u64
        })),
    }
}

/// Delete every window whose newest timestamp is older than `cutoff`.
/// Returns how many rows were removed.
pub async fn purge_stale_spam_windows(db: &Database, cutoff: u64) -> anyhow::Result<u64> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let result = sqlx::query(
                "DELETE FROM spam_windows
                 WHERE cardinality(timestamps) = 0
                    OR timestamps[cardinality(timestamps)] < $1",
            )
            .bind(to_db(cutoff, "cutoff")?)
            .execute(pool)
            .await?;

            Ok(result.rows_affected())
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            let before = tables.spam_windows.len();
            tables
                .spam_windows
                .retain(|_, record| record.timestamps.last().is_some_and(|last| *last >= cutoff));
            (before - tables.spam_windows.len()) as u64
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user_id: u64, timestamps: Vec<u64>) -> SpamWindowRecord {
        SpamWindowRecord {
            guild_id: 1,
            user_id,
            timestamps,
            last_hash: None,
            repeat_count: 0,
        }
    }

    #[tokio::test]
    async fn purge_keeps_recent_windows() {
        let db = Database::in_memory();
        save_spam_window(&db, &record(1, vec![10, 20])).await.unwrap();
        save_spam_window(&db, &record(2, vec![10, 500])).await.unwrap();
        save_spam_window(&db, &record(3, Vec::new())).await.unwrap();

        assert_eq!(purge_stale_spam_windows(&db, 100).await.unwrap(), 2);
        assert_eq!(count_spam_windows(&db, 1).await.unwrap(), 1);
        assert!(load_spam_window(&db, 1, 2).await.unwrap().is_some());
    }
}
