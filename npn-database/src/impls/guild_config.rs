use anyhow::Context as _;

use crate::cache::{CONFIG_CACHE_TTL, guild_config_key, invalidate_guild_config};
use crate::database::{Backend, Database};
use crate::impls::{from_db, from_db_all, to_db, to_db_all};
use crate::model::guild_config::{AntiSpamConfig, GuildConfig, TicketConfig};

#[derive(sqlx::FromRow)]
struct GuildConfigRow {
    antispam_enabled: bool,
    antispam_max_messages: i32,
    antispam_time_window: i64,
    antispam_action: String,
    antispam_duplicate_threshold: i32,
    ticket_category_id: Option<i64>,
    support_role_ids: Vec<i64>,
    exclude_previous_winners: bool,
}

impl GuildConfigRow {
    fn into_config(self, guild_id: u64) -> anyhow::Result<GuildConfig> {
        Ok(GuildConfig {
            guild_id,
            antispam: AntiSpamConfig {
                enabled: self.antispam_enabled,
                max_messages: u32::try_from(self.antispam_max_messages)
                    .context("antispam_max_messages out of u32 range")?,
                time_window_seconds: from_db(self.antispam_time_window, "antispam_time_window")?,
                action: self.antispam_action.parse()?,
                duplicate_threshold: u32::try_from(self.antispam_duplicate_threshold)
                    .context("antispam_duplicate_threshold out of u32 range")?,
            },
            tickets: TicketConfig {
                category_id: self
                    .ticket_category_id
                    .map(|id| from_db(id, "ticket_category_id"))
                    .transpose()?,
                support_role_ids: from_db_all(self.support_role_ids, "support_role_id")?,
            },
            exclude_previous_winners: self.exclude_previous_winners,
        })
    }
}

/// Load a guild's configuration, falling back to defaults when the guild has
/// never been configured.
pub async fn get_guild_config(db: &Database, guild_id: u64) -> anyhow::Result<GuildConfig> {
    let cache_key = guild_config_key(db.cache(), guild_id);
    db.cache()
        .get_or_load_json(&cache_key, CONFIG_CACHE_TTL, || async {
            match db.backend() {
                Backend::Postgres(pool) => {
                    let row: Option<GuildConfigRow> = sqlx::query_as(
                        "SELECT antispam_enabled, antispam_max_messages, antispam_time_window,
                                antispam_action, antispam_duplicate_threshold, ticket_category_id,
                                support_role_ids, exclude_previous_winners
                         FROM guild_config WHERE guild_id = $1",
                    )
                    .bind(to_db(guild_id, "guild_id")?)
                    .fetch_optional(pool)
                    .await?;

                    match row {
                        Some(row) => row.into_config(guild_id),
                        None => Ok(GuildConfig::defaults(guild_id)),
                    }
                }
                Backend::Memory(store) => Ok(store.with(|tables| {
                    tables
                        .guild_configs
                        .get(&guild_id)
                        .cloned()
                        .unwrap_or_else(|| GuildConfig::defaults(guild_id))
                })),
            }
        })
        .await
}

pub async fn set_antispam_config(
    db: &Database,
    guild_id: u64,
    config: &AntiSpamConfig,
) -> anyhow::Result<()> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let max_messages =
                i32::try_from(config.max_messages).context("max_messages out of i32 range")?;
            let duplicate_threshold = i32::try_from(config.duplicate_threshold)
                .context("duplicate_threshold out of i32 range")?;

            sqlx::query(
                "INSERT INTO guild_config (
                    guild_id, antispam_enabled, antispam_max_messages, antispam_time_window,
                    antispam_action, antispam_duplicate_threshold
                 ) VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (guild_id) DO UPDATE SET
                    antispam_enabled = EXCLUDED.antispam_enabled,
                    antispam_max_messages = EXCLUDED.antispam_max_messages,
                    antispam_time_window = EXCLUDED.antispam_time_window,
                    antispam_action = EXCLUDED.antispam_action,
                    antispam_duplicate_threshold = EXCLUDED.antispam_duplicate_threshold",
            )
            .bind(to_db(guild_id, "guild_id")?)
            .bind(config.enabled)
            .bind(max_messages)
            .bind(to_db(config.time_window_seconds, "time_window_seconds")?)
            .bind(config.action.as_str())
            .bind(duplicate_threshold)
            .execute(pool)
            .await?;
        }
        Backend::Memory(store) => store.with(|tables| {
            tables
                .guild_configs
                .entry(guild_id)
                .or_insert_with(|| GuildConfig::defaults(guild_id))
                .antispam = config.clone();
        }),
    }

    invalidate_guild_config(db.cache(), guild_id).await
}

pub async fn set_ticket_category(
    db: &Database,
    guild_id: u64,
    category_id: Option<u64>,
) -> anyhow::Result<()> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let category_id = category_id
                .map(|id| to_db(id, "category_id"))
                .transpose()?;

            sqlx::query(
                "INSERT INTO guild_config (guild_id, ticket_category_id) VALUES ($1, $2)
                 ON CONFLICT (guild_id) DO UPDATE SET ticket_category_id = EXCLUDED.ticket_category_id",
            )
            .bind(to_db(guild_id, "guild_id")?)
            .bind(category_id)
            .execute(pool)
            .await?;
        }
        Backend::Memory(store) => store.with(|tables| {
            tables
                .guild_configs
                .entry(guild_id)
                .or_insert_with(|| GuildConfig::defaults(guild_id))
                .tickets
                .category_id = category_id;
        }),
    }

    invalidate_guild_config(db.cache(), guild_id).await
}

/// Replace the set of roles granted access to new ticket channels.
pub async fn set_support_roles(
    db: &Database,
    guild_id: u64,
    role_ids: &[u64],
) -> anyhow::Result<()> {
    let mut role_ids = role_ids.to_vec();
    role_ids.sort_unstable();
    role_ids.dedup();

    match db.backend() {
        Backend::Postgres(pool) => {
            sqlx::query(
                "INSERT INTO guild_config (guild_id, support_role_ids) VALUES ($1, $2)
                 ON CONFLICT (guild_id) DO UPDATE SET support_role_ids = EXCLUDED.support_role_ids",
            )
            .bind(to_db(guild_id, "guild_id")?)
            .bind(to_db_all(&role_ids, "role_id")?)
            .execute(pool)
            .await?;
        }
        Backend::Memory(store) => store.with(|tables| {
            tables
                .guild_configs
                .entry(guild_id)
                .or_insert_with(|| GuildConfig::defaults(guild_id))
                .tickets
                .support_role_ids = role_ids;
        }),
    }

    invalidate_guild_config(db.cache(), guild_id).await
}

pub async fn set_exclude_previous_winners(
    db: &Database,
    guild_id: u64,
    exclude: bool,
) -> anyhow::Result<()> {
    match db.backend() {
        Backend::Postgres(pool) => {
            sqlx::query(
                "INSERT INTO guild_config (guild_id, exclude_previous_winners) VALUES ($1, $2)
                 ON CONFLICT (guild_id) DO UPDATE SET exclude_previous_winners = EXCLUDED.exclude_previous_winners",
            )
            .bind(to_db(guild_id, "guild_id")?)
            .bind(exclude)
            .execute(pool)
            .await?;
        }
        Backend::Memory(store) => store.with(|tables| {
            tables
                .guild_configs
                .entry(guild_id)
                .or_insert_with(|| GuildConfig::defaults(guild_id))
                .exclude_previous_winners = exclude;
        }),
    }

    invalidate_guild_config(db.cache(), guild_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::guild_config::SpamAction;

    #[tokio::test]
    async fn unconfigured_guild_reads_defaults() {
        let db = Database::in_memory();
        let config = get_guild_config(&db, 7).await.unwrap();
        assert_eq!(config, GuildConfig::defaults(7));
        assert!(!config.antispam.enabled);
    }

    #[tokio::test]
    async fn config_writes_are_independent() {
        let db = Database::in_memory();
        let antispam = AntiSpamConfig {
            enabled: true,
            max_messages: 3,
            time_window_seconds: 20,
            action: SpamAction::Kick,
            duplicate_threshold: 2,
        };

        set_antispam_config(&db, 1, &antispam).await.unwrap();
        set_ticket_category(&db, 1, Some(99)).await.unwrap();
        set_support_roles(&db, 1, &[5, 3, 5]).await.unwrap();

        let config = get_guild_config(&db, 1).await.unwrap();
        assert_eq!(config.antispam, antispam);
        assert_eq!(config.tickets.category_id, Some(99));
        assert_eq!(config.tickets.support_role_ids, vec![3, 5]);
        assert!(!config.exclude_previous_winners);
    }
}
