use anyhow::Context as _;
use sqlx::{Postgres, Transaction};

use crate::database::{Backend, Database};
use crate::impls::{from_db, from_db_all, to_db, to_db_all};
use crate::memory::MemoryTables;
use crate::model::campaigns::{
    Campaign, CampaignEntry, CampaignPayload, CampaignStatus, EndReason, EntryChange, EntryWrite,
    FinishResult, NewCampaign,
};

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id: i64,
    guild_id: i64,
    channel_id: i64,
    creator_id: i64,
    created_at: i64,
    ends_at: Option<i64>,
    status: String,
    ended_at: Option<i64>,
    end_reason: Option<String>,
    payload: String,
    winners: Vec<i64>,
    past_winners: Vec<i64>,
}

impl CampaignRow {
    fn into_campaign(self) -> anyhow::Result<Campaign> {
        let payload: CampaignPayload = serde_json::from_str(&self.payload)
            .with_context(|| format!("invalid payload for campaign {}", self.id))?;

        Ok(Campaign {
            id: from_db(self.id, "campaign id")?,
            guild_id: from_db(self.guild_id, "guild_id")?,
            channel_id: from_db(self.channel_id, "channel_id")?,
            creator_id: from_db(self.creator_id, "creator_id")?,
            created_at: from_db(self.created_at, "created_at")?,
            ends_at: self.ends_at.map(|at| from_db(at, "ends_at")).transpose()?,
            status: CampaignStatus::parse(&self.status)?,
            ended_at: self.ended_at.map(|at| from_db(at, "ended_at")).transpose()?,
            end_reason: self.end_reason.as_deref().map(EndReason::parse).transpose()?,
            payload,
            winners: from_db_all(self.winners, "winner id")?,
            past_winners: from_db_all(self.past_winners, "past winner id")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    user_id: i64,
    choice: Option<i32>,
    entered_at: i64,
}

impl EntryRow {
    fn into_entry(self) -> anyhow::Result<CampaignEntry> {
        Ok(CampaignEntry {
            user_id: from_db(self.user_id, "user_id")?,
            choice: self
                .choice
                .map(u32::try_from)
                .transpose()
                .context("choice out of u32 range")?,
            entered_at: from_db(self.entered_at, "entered_at")?,
        })
    }
}

const CAMPAIGN_COLUMNS: &str = "id, guild_id, channel_id, creator_id, created_at, ends_at, status, \
     ended_at, end_reason, payload, winners, past_winners";

/// Insert a new active campaign. Returns `None` when a campaign with the same
/// message id already exists.
pub async fn insert_campaign(
    db: &Database,
    new_campaign: NewCampaign,
) -> anyhow::Result<Option<Campaign>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let payload = serde_json::to_string(&new_campaign.payload)
                .context("failed to serialize campaign payload")?;

            let row: Option<CampaignRow> = sqlx::query_as(&format!(
                "INSERT INTO campaigns (
                    id, kind, guild_id, channel_id, creator_id, created_at, ends_at, status, payload
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', $8)
                 ON CONFLICT (id) DO NOTHING
                 RETURNING {CAMPAIGN_COLUMNS}"
            ))
            .bind(to_db(new_campaign.id, "campaign id")?)
            .bind(new_campaign.payload.kind().as_str())
            .bind(to_db(new_campaign.guild_id, "guild_id")?)
            .bind(to_db(new_campaign.channel_id, "channel_id")?)
            .bind(to_db(new_campaign.creator_id, "creator_id")?)
            .bind(to_db(new_campaign.created_at, "created_at")?)
            .bind(new_campaign.ends_at.map(|at| to_db(at, "ends_at")).transpose()?)
            .bind(payload)
            .fetch_optional(pool)
            .await?;

            row.map(CampaignRow::into_campaign).transpose()
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            if tables.campaigns.contains_key(&new_campaign.id) {
                return None;
            }

            let campaign = Campaign {
                id: new_campaign.id,
                guild_id: new_campaign.guild_id,
                channel_id: new_campaign.channel_id,
                creator_id: new_campaign.creator_id,
                created_at: new_campaign.created_at,
                ends_at: new_campaign.ends_at,
                status: CampaignStatus::Active,
                ended_at: None,
                end_reason: None,
                payload: new_campaign.payload,
                winners: Vec::new(),
                past_winners: Vec::new(),
            };
            tables.campaigns.insert(campaign.id, campaign.clone());
            tables.entries.insert(campaign.id, Default::default());
            Some(campaign)
        })),
    }
}

pub async fn get_campaign(db: &Database, campaign_id: u64) -> anyhow::Result<Option<Campaign>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let row: Option<CampaignRow> = sqlx::query_as(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1"
            ))
            .bind(to_db(campaign_id, "campaign id")?)
            .fetch_optional(pool)
            .await?;

            row.map(CampaignRow::into_campaign).transpose()
        }
        Backend::Memory(store) => {
            Ok(store.with(|tables| tables.campaigns.get(&campaign_id).cloned()))
        }
    }
}

/// Active campaigns of a guild, newest first.
pub async fn list_active_campaigns(db: &Database, guild_id: u64) -> anyhow::Result<Vec<Campaign>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let rows: Vec<CampaignRow> = sqlx::query_as(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
                 WHERE guild_id = $1 AND status = 'active'
                 ORDER BY created_at DESC, id DESC"
            ))
            .bind(to_db(guild_id, "guild_id")?)
            .fetch_all(pool)
            .await?;

            rows.into_iter().map(CampaignRow::into_campaign).collect()
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            let mut campaigns: Vec<Campaign> = tables
                .campaigns
                .values()
                .filter(|campaign| campaign.guild_id == guild_id && campaign.is_active())
                .cloned()
                .collect();
            campaigns.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            campaigns
        })),
    }
}

/// Active campaigns whose deadline is at or before `now`, earliest first.
pub async fn list_due_campaigns(db: &Database, now: u64) -> anyhow::Result<Vec<Campaign>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let rows: Vec<CampaignRow> = sqlx::query_as(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns
                 WHERE status = 'active' AND ends_at IS NOT NULL AND ends_at <= $1
                 ORDER BY ends_at ASC, id ASC"
            ))
            .bind(to_db(now, "now")?)
            .fetch_all(pool)
            .await?;

            rows.into_iter().map(CampaignRow::into_campaign).collect()
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            let mut due: Vec<Campaign> = tables
                .campaigns
                .values()
                .filter(|campaign| {
                    campaign.is_active() && campaign.ends_at.is_some_and(|ends_at| ends_at <= now)
                })
                .cloned()
                .collect();
            due.sort_by_key(|campaign| (campaign.ends_at, campaign.id));
            due
        })),
    }
}

/// Entrants of a campaign in entry order.
pub async fn list_entries(db: &Database, campaign_id: u64) -> anyhow::Result<Vec<CampaignEntry>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let rows: Vec<EntryRow> = sqlx::query_as(
                "SELECT user_id, choice, entered_at FROM campaign_entries
                 WHERE campaign_id = $1
                 ORDER BY entered_at ASC, user_id ASC",
            )
            .bind(to_db(campaign_id, "campaign id")?)
            .fetch_all(pool)
            .await?;

            rows.into_iter().map(EntryRow::into_entry).collect()
        }
        Backend::Memory(store) => Ok(store.with(|tables| memory_entries(tables, campaign_id))),
    }
}

/// Lock the campaign row for the rest of the transaction so the status cannot
/// flip to ended while an entrant write is in flight.
async fn lock_campaign_status(
    tx: &mut Transaction<'_, Postgres>,
    campaign_id: i64,
) -> anyhow::Result<Option<CampaignStatus>> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM campaigns WHERE id = $1 FOR SHARE")
            .bind(campaign_id)
            .fetch_optional(&mut **tx)
            .await?;

    status.as_deref().map(CampaignStatus::parse).transpose()
}

/// Add or update an entrant while the campaign is active.
///
/// With `choice = None` the write has set semantics: an existing entrant is
/// left untouched. With `Some(choice)` the stored choice is overwritten.
pub async fn upsert_entry(
    db: &Database,
    campaign_id: u64,
    user_id: u64,
    choice: Option<u32>,
    now: u64,
) -> anyhow::Result<EntryWrite> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let campaign_id_i64 = to_db(campaign_id, "campaign id")?;
            let user_id_i64 = to_db(user_id, "user_id")?;
            let choice_i32 = choice
                .map(i32::try_from)
                .transpose()
                .context("choice out of i32 range")?;

            let mut tx = pool.begin().await?;

            match lock_campaign_status(&mut tx, campaign_id_i64).await? {
                None => return Ok(EntryWrite::Missing),
                Some(CampaignStatus::Ended) => return Ok(EntryWrite::Ended),
                Some(CampaignStatus::Active) => {}
            }

            let existing: Option<Option<i32>> = sqlx::query_scalar(
                "SELECT choice FROM campaign_entries
                 WHERE campaign_id = $1 AND user_id = $2 FOR UPDATE",
            )
            .bind(campaign_id_i64)
            .bind(user_id_i64)
            .fetch_optional(&mut *tx)
            .await?;

            let change = match existing {
                Some(previous) if choice.is_none() || previous == choice_i32 => {
                    EntryChange::Unchanged
                }
                Some(previous) => {
                    sqlx::query(
                        "UPDATE campaign_entries SET choice = $3, entered_at = $4
                         WHERE campaign_id = $1 AND user_id = $2",
                    )
                    .bind(campaign_id_i64)
                    .bind(user_id_i64)
                    .bind(choice_i32)
                    .bind(to_db(now, "entered_at")?)
                    .execute(&mut *tx)
                    .await?;

                    EntryChange::Replaced {
                        previous: previous
                            .map(u32::try_from)
                            .transpose()
                            .context("choice out of u32 range")?,
                    }
                }
                None => {
                    sqlx::query(
                        "INSERT INTO campaign_entries (campaign_id, user_id, choice, entered_at)
                         VALUES ($1, $2, $3, $4)
                         ON CONFLICT (campaign_id, user_id) DO UPDATE SET choice = EXCLUDED.choice",
                    )
                    .bind(campaign_id_i64)
                    .bind(user_id_i64)
                    .bind(choice_i32)
                    .bind(to_db(now, "entered_at")?)
                    .execute(&mut *tx)
                    .await?;

                    EntryChange::Inserted
                }
            };

            tx.commit().await?;
            Ok(EntryWrite::Applied(change))
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            match tables.campaigns.get(&campaign_id) {
                None => return EntryWrite::Missing,
                Some(campaign) if !campaign.is_active() => return EntryWrite::Ended,
                Some(_) => {}
            }

            let entries = tables.entries.entry(campaign_id).or_default();
            let change = match entries.get_mut(&user_id) {
                Some(entry) if choice.is_none() || entry.choice == choice => EntryChange::Unchanged,
                Some(entry) => {
                    let previous = entry.choice;
                    entry.choice = choice;
                    entry.entered_at = now;
                    EntryChange::Replaced { previous }
                }
                None => {
                    entries.insert(
                        user_id,
                        CampaignEntry {
                            user_id,
                            choice,
                            entered_at: now,
                        },
                    );
                    EntryChange::Inserted
                }
            };
            EntryWrite::Applied(change)
        })),
    }
}

/// Remove an entrant while the campaign is active.
pub async fn remove_entry(
    db: &Database,
    campaign_id: u64,
    user_id: u64,
) -> anyhow::Result<EntryWrite> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let campaign_id_i64 = to_db(campaign_id, "campaign id")?;
            let mut tx = pool.begin().await?;

            match lock_campaign_status(&mut tx, campaign_id_i64).await? {
                None => return Ok(EntryWrite::Missing),
                Some(CampaignStatus::Ended) => return Ok(EntryWrite::Ended),
                Some(CampaignStatus::Active) => {}
            }

            let result =
                sqlx::query("DELETE FROM campaign_entries WHERE campaign_id = $1 AND user_id = $2")
                    .bind(campaign_id_i64)
                    .bind(to_db(user_id, "user_id")?)
                    .execute(&mut *tx)
                    .await?;

            tx.commit().await?;

            Ok(EntryWrite::Applied(if result.rows_affected() > 0 {
                EntryChange::Removed
            } else {
                EntryChange::Unchanged
            }))
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            match tables.campaigns.get(&campaign_id) {
                None => return EntryWrite::Missing,
                Some(campaign) if !campaign.is_active() => return EntryWrite::Ended,
                Some(_) => {}
            }

            let removed = tables
                .entries
                .get_mut(&campaign_id)
                .and_then(|entries| entries.remove(&user_id))
                .is_some();

            EntryWrite::Applied(if removed {
                EntryChange::Removed
            } else {
                EntryChange::Unchanged
            })
        })),
    }
}

/// Transition a campaign from active to ended exactly once.
///
/// The status flip, the entrant read and the winner write happen in one
/// transaction. `draw` runs only for the caller that won the
/// compare-and-set; everyone else gets [`FinishResult::AlreadyEnded`].
pub async fn finish_campaign<F>(
    db: &Database,
    campaign_id: u64,
    reason: EndReason,
    now: u64,
    draw: F,
) -> anyhow::Result<FinishResult>
where
    F: FnOnce(&Campaign, &[CampaignEntry]) -> Vec<u64>,
{
    match db.backend() {
        Backend::Postgres(pool) => {
            let campaign_id_i64 = to_db(campaign_id, "campaign id")?;
            let mut tx = pool.begin().await?;

            let row: Option<CampaignRow> = sqlx::query_as(&format!(
                "UPDATE campaigns SET status = 'ended', ended_at = $2, end_reason = $3
                 WHERE id = $1 AND status = 'active'
                 RETURNING {CAMPAIGN_COLUMNS}"
            ))
            .bind(campaign_id_i64)
            .bind(to_db(now, "ended_at")?)
            .bind(reason.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            let Some(row) = row else {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM campaigns WHERE id = $1)")
                        .bind(campaign_id_i64)
                        .fetch_one(&mut *tx)
                        .await?;

                return Ok(if exists {
                    FinishResult::AlreadyEnded
                } else {
                    FinishResult::Missing
                });
            };

            let mut campaign = row.into_campaign()?;

            let rows: Vec<EntryRow> = sqlx::query_as(
                "SELECT user_id, choice, entered_at FROM campaign_entries
                 WHERE campaign_id = $1
                 ORDER BY entered_at ASC, user_id ASC",
            )
            .bind(campaign_id_i64)
            .fetch_all(&mut *tx)
            .await?;
            let entries = rows
                .into_iter()
                .map(EntryRow::into_entry)
                .collect::<anyhow::Result<Vec<_>>>()?;

            let winners = draw(&campaign, &entries);
            if !winners.is_empty() {
                sqlx::query(
                    "UPDATE campaigns SET winners = $2, past_winners = $2 WHERE id = $1",
                )
                .bind(campaign_id_i64)
                .bind(to_db_all(&winners, "winner id")?)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;

            campaign.past_winners = winners.clone();
            campaign.winners = winners;
            Ok(FinishResult::Finished { campaign, entries })
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            let entries = memory_entries(tables, campaign_id);
            let Some(campaign) = tables.campaigns.get_mut(&campaign_id) else {
                return FinishResult::Missing;
            };
            if !campaign.is_active() {
                return FinishResult::AlreadyEnded;
            }

            campaign.status = CampaignStatus::Ended;
            campaign.ended_at = Some(now);
            campaign.end_reason = Some(reason);
            let winners = draw(campaign, &entries);
            campaign.past_winners = winners.clone();
            campaign.winners = winners;

            FinishResult::Finished {
                campaign: campaign.clone(),
                entries,
            }
        })),
    }
}

/// Record a reroll draw. The current winners are replaced and the draw is
/// appended to `past_winners`. Returns the updated campaign, or `None` when
/// it does not exist.
pub async fn replace_winners(
    db: &Database,
    campaign_id: u64,
    winners: &[u64],
) -> anyhow::Result<Option<Campaign>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let row: Option<CampaignRow> = sqlx::query_as(&format!(
                "UPDATE campaigns SET
                    winners = $2,
                    past_winners = ARRAY(
                        SELECT DISTINCT unnest(past_winners || $2::BIGINT[])
                    )
                 WHERE id = $1
                 RETURNING {CAMPAIGN_COLUMNS}"
            ))
            .bind(to_db(campaign_id, "campaign id")?)
            .bind(to_db_all(winners, "winner id")?)
            .fetch_optional(pool)
            .await?;

            row.map(CampaignRow::into_campaign).transpose()
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            let campaign = tables.campaigns.get_mut(&campaign_id)?;
            campaign.winners = winners.to_vec();
            for winner in winners {
                if !campaign.past_winners.contains(winner) {
                    campaign.past_winners.push(*winner);
                }
            }
            Some(campaign.clone())
        })),
    }
}

fn memory_entries(tables: &MemoryTables, campaign_id: u64) -> Vec<CampaignEntry> {
    let mut entries: Vec<CampaignEntry> = tables
        .entries
        .get(&campaign_id)
        .map(|entries| entries.values().copied().collect())
        .unwrap_or_default();
    entries.sort_by_key(|entry| (entry.entered_at, entry.user_id));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn giveaway(id: u64, ends_at: Option<u64>) -> NewCampaign {
        NewCampaign {
            id,
            guild_id: 1,
            channel_id: 2,
            creator_id: 3,
            created_at: 0,
            ends_at,
            payload: CampaignPayload::Giveaway {
                prize: "Nitro".to_owned(),
                winners_count: 1,
            },
        }
    }

    #[tokio::test]
    async fn duplicate_message_ids_are_not_inserted() {
        let db = Database::in_memory();
        assert!(insert_campaign(&db, giveaway(10, None)).await.unwrap().is_some());
        assert!(insert_campaign(&db, giveaway(10, None)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn due_listing_skips_open_ended_and_future_campaigns() {
        let db = Database::in_memory();
        insert_campaign(&db, giveaway(1, Some(50))).await.unwrap();
        insert_campaign(&db, giveaway(2, Some(10))).await.unwrap();
        insert_campaign(&db, giveaway(3, None)).await.unwrap();
        insert_campaign(&db, giveaway(4, Some(500))).await.unwrap();

        let due: Vec<u64> = list_due_campaigns(&db, 50)
            .await
            .unwrap()
            .into_iter()
            .map(|campaign| campaign.id)
            .collect();
        assert_eq!(due, vec![2, 1]);
    }

    #[tokio::test]
    async fn entry_writes_report_their_effect() {
        let db = Database::in_memory();
        insert_campaign(&db, giveaway(1, None)).await.unwrap();

        assert_eq!(
            upsert_entry(&db, 1, 7, None, 1).await.unwrap(),
            EntryWrite::Applied(EntryChange::Inserted)
        );
        assert_eq!(
            upsert_entry(&db, 1, 7, None, 2).await.unwrap(),
            EntryWrite::Applied(EntryChange::Unchanged)
        );
        assert_eq!(
            remove_entry(&db, 1, 7).await.unwrap(),
            EntryWrite::Applied(EntryChange::Removed)
        );
        assert_eq!(
            upsert_entry(&db, 99, 7, None, 2).await.unwrap(),
            EntryWrite::Missing
        );
    }

    #[tokio::test]
    async fn finish_runs_draw_once_and_freezes_entries() {
        let db = Database::in_memory();
        insert_campaign(&db, giveaway(1, None)).await.unwrap();
        upsert_entry(&db, 1, 7, None, 1).await.unwrap();

        let first = finish_campaign(&db, 1, EndReason::Manual, 5, |_, entries| {
            entries.iter().map(|entry| entry.user_id).collect()
        })
        .await
        .unwrap();
        assert!(matches!(
            first,
            FinishResult::Finished { ref campaign, .. } if campaign.winners == vec![7]
        ));

        let second = finish_campaign(&db, 1, EndReason::Expired, 6, |_, _| {
            panic!("draw must not run twice")
        })
        .await
        .unwrap();
        assert!(matches!(second, FinishResult::AlreadyEnded));

        assert_eq!(upsert_entry(&db, 1, 8, None, 7).await.unwrap(), EntryWrite::Ended);
        let stored = get_campaign(&db, 1).await.unwrap().unwrap();
        assert_eq!(stored.end_reason, Some(EndReason::Manual));
        assert_eq!(stored.ended_at, Some(5));
    }
}
