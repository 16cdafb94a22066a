use crate::database::{Backend, Database};
use crate::impls::{from_db, to_db};
use crate::model::tickets::{Ticket, TicketClose, TicketStatus};

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: i64,
    guild_id: i64,
    number: i64,
    channel_id: Option<i64>,
    creator_id: i64,
    status: String,
    created_at: i64,
    closed_at: Option<i64>,
}

impl TicketRow {
    fn into_ticket(self) -> anyhow::Result<Ticket> {
        Ok(Ticket {
            id: from_db(self.id, "ticket id")?,
            guild_id: from_db(self.guild_id, "guild_id")?,
            number: from_db(self.number, "ticket number")?,
            channel_id: self
                .channel_id
                .map(|id| from_db(id, "channel_id"))
                .transpose()?,
            creator_id: from_db(self.creator_id, "creator_id")?,
            status: TicketStatus::parse(&self.status)?,
            created_at: from_db(self.created_at, "created_at")?,
            closed_at: self
                .closed_at
                .map(|at| from_db(at, "closed_at"))
                .transpose()?,
        })
    }
}

const TICKET_COLUMNS: &str =
    "id, guild_id, number, channel_id, creator_id, status, created_at, closed_at";

/// Atomically advance the guild's ticket counter and return the new number.
/// The first ticket of a guild is number 1.
pub async fn allocate_ticket_number(db: &Database, guild_id: u64) -> anyhow::Result<u64> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let number: i64 = sqlx::query_scalar(
                "INSERT INTO ticket_counters (guild_id, last_number) VALUES ($1, 1)
                 ON CONFLICT (guild_id) DO UPDATE SET last_number = ticket_counters.last_number + 1
                 RETURNING last_number",
            )
            .bind(to_db(guild_id, "guild_id")?)
            .fetch_one(pool)
            .await?;

            from_db(number, "ticket number")
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            let counter = tables.ticket_counters.entry(guild_id).or_insert(0);
            *counter += 1;
            *counter
        })),
    }
}

pub async fn insert_ticket(
    db: &Database,
    guild_id: u64,
    number: u64,
    creator_id: u64,
    now: u64,
) -> anyhow::Result<Ticket> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let row: TicketRow = sqlx::query_as(&format!(
                "INSERT INTO tickets (guild_id, number, creator_id, status, created_at)
                 VALUES ($1, $2, $3, 'open', $4)
                 RETURNING {TICKET_COLUMNS}"
            ))
            .bind(to_db(guild_id, "guild_id")?)
            .bind(to_db(number, "ticket number")?)
            .bind(to_db(creator_id, "creator_id")?)
            .bind(to_db(now, "created_at")?)
            .fetch_one(pool)
            .await?;

            row.into_ticket()
        }
        Backend::Memory(store) => store.with(|tables| {
            if tables
                .tickets
                .values()
                .any(|ticket| ticket.guild_id == guild_id && ticket.number == number)
            {
                anyhow::bail!("ticket number {number} already exists in guild {guild_id}");
            }

            tables.next_ticket_id += 1;
            let ticket = Ticket {
                id: tables.next_ticket_id,
                guild_id,
                number,
                channel_id: None,
                creator_id,
                status: TicketStatus::Open,
                created_at: now,
                closed_at: None,
            };
            tables.tickets.insert(ticket.id, ticket.clone());
            Ok(ticket)
        }),
    }
}

/// Record the platform channel backing a ticket. Returns `false` when the
/// ticket does not exist.
pub async fn attach_ticket_channel(
    db: &Database,
    ticket_id: u64,
    channel_id: u64,
) -> anyhow::Result<bool> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let result = sqlx::query("UPDATE tickets SET channel_id = $2 WHERE id = $1")
                .bind(to_db(ticket_id, "ticket id")?)
                .bind(to_db(channel_id, "channel_id")?)
                .execute(pool)
                .await?;

            Ok(result.rows_affected() > 0)
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            match tables.tickets.get_mut(&ticket_id) {
                Some(ticket) => {
                    ticket.channel_id = Some(channel_id);
                    true
                }
                None => false,
            }
        })),
    }
}

pub async fn get_ticket(db: &Database, ticket_id: u64) -> anyhow::Result<Option<Ticket>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let row: Option<TicketRow> =
                sqlx::query_as(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"))
                    .bind(to_db(ticket_id, "ticket id")?)
                    .fetch_optional(pool)
                    .await?;

            row.map(TicketRow::into_ticket).transpose()
        }
        Backend::Memory(store) => Ok(store.with(|tables| tables.tickets.get(&ticket_id).cloned())),
    }
}

pub async fn find_ticket_by_channel(
    db: &Database,
    channel_id: u64,
) -> anyhow::Result<Option<Ticket>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let row: Option<TicketRow> = sqlx::query_as(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets WHERE channel_id = $1
                 ORDER BY id DESC LIMIT 1"
            ))
            .bind(to_db(channel_id, "channel_id")?)
            .fetch_optional(pool)
            .await?;

            row.map(TicketRow::into_ticket).transpose()
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            tables
                .tickets
                .values()
                .rev()
                .find(|ticket| ticket.channel_id == Some(channel_id))
                .cloned()
        })),
    }
}

pub async fn find_open_ticket_for_user(
    db: &Database,
    guild_id: u64,
    user_id: u64,
) -> anyhow::Result<Option<Ticket>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let row: Option<TicketRow> = sqlx::query_as(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets
                 WHERE guild_id = $1 AND creator_id = $2 AND status = 'open'
                 ORDER BY number ASC LIMIT 1"
            ))
            .bind(to_db(guild_id, "guild_id")?)
            .bind(to_db(user_id, "user_id")?)
            .fetch_optional(pool)
            .await?;

            row.map(TicketRow::into_ticket).transpose()
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            tables
                .tickets
                .values()
                .find(|ticket| {
                    ticket.guild_id == guild_id
                        && ticket.creator_id == user_id
                        && ticket.status == TicketStatus::Open
                })
                .cloned()
        })),
    }
}

/// Open tickets of a guild, oldest number first.
pub async fn list_open_tickets(db: &Database, guild_id: u64) -> anyhow::Result<Vec<Ticket>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let rows: Vec<TicketRow> = sqlx::query_as(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets
                 WHERE guild_id = $1 AND status = 'open'
                 ORDER BY number ASC"
            ))
            .bind(to_db(guild_id, "guild_id")?)
            .fetch_all(pool)
            .await?;

            rows.into_iter().map(TicketRow::into_ticket).collect()
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            let mut tickets: Vec<Ticket> = tables
                .tickets
                .values()
                .filter(|ticket| ticket.guild_id == guild_id && ticket.status == TicketStatus::Open)
                .cloned()
                .collect();
            tickets.sort_by_key(|ticket| ticket.number);
            tickets
        })),
    }
}

/// Compare-and-set a ticket from open to closed. Only one caller can ever
/// observe [`TicketClose::Closed`] for a given ticket.
pub async fn close_ticket(db: &Database, ticket_id: u64, now: u64) -> anyhow::Result<TicketClose> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let ticket_id_i64 = to_db(ticket_id, "ticket id")?;

            let closed: Option<TicketRow> = sqlx::query_as(&format!(
                "UPDATE tickets SET status = 'closed', closed_at = $2
                 WHERE id = $1 AND status = 'open'
                 RETURNING {TICKET_COLUMNS}"
            ))
            .bind(ticket_id_i64)
            .bind(to_db(now, "closed_at")?)
            .fetch_optional(pool)
            .await?;

            if let Some(row) = closed {
                return Ok(TicketClose::Closed(row.into_ticket()?));
            }

            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tickets WHERE id = $1)")
                    .bind(ticket_id_i64)
                    .fetch_one(pool)
                    .await?;

            Ok(if exists {
                TicketClose::AlreadyClosed
            } else {
                TicketClose::Missing
            })
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            match tables.tickets.get_mut(&ticket_id) {
                None => TicketClose::Missing,
                Some(ticket) if ticket.status == TicketStatus::Closed => TicketClose::AlreadyClosed,
                Some(ticket) => {
                    ticket.status = TicketStatus::Closed;
                    ticket.closed_at = Some(now);
                    TicketClose::Closed(ticket.clone())
                }
            }
        })),
    }
}

/// Note that a ticket channel no longer exists on the platform. Returns
/// `false` when no ticket uses the channel.
pub async fn mark_ticket_channel_removed(db: &Database, channel_id: u64) -> anyhow::Result<bool> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let result =
                sqlx::query("UPDATE tickets SET channel_removed = TRUE WHERE channel_id = $1")
                    .bind(to_db(channel_id, "channel_id")?)
                    .execute(pool)
                    .await?;

            Ok(result.rows_affected() > 0)
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            let known = tables
                .tickets
                .values()
                .any(|ticket| ticket.channel_id == Some(channel_id));
            if known {
                tables.removed_ticket_channels.insert(channel_id);
            }
            known
        })),
    }
}

/// Closed tickets whose channel still has to be deleted, limited to those
/// closed inside `[closed_after, closed_before]`.
pub async fn list_pending_channel_removals(
    db: &Database,
    closed_after: u64,
    closed_before: u64,
) -> anyhow::Result<Vec<Ticket>> {
    match db.backend() {
        Backend::Postgres(pool) => {
            let rows: Vec<TicketRow> = sqlx::query_as(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets
                 WHERE status = 'closed' AND NOT channel_removed
                   AND channel_id IS NOT NULL
                   AND closed_at BETWEEN $1 AND $2
                 ORDER BY closed_at ASC"
            ))
            .bind(to_db(closed_after, "closed_after")?)
            .bind(to_db(closed_before, "closed_before")?)
            .fetch_all(pool)
            .await?;

            rows.into_iter().map(TicketRow::into_ticket).collect()
        }
        Backend::Memory(store) => Ok(store.with(|tables| {
            let mut pending: Vec<Ticket> = tables
                .tickets
                .values()
                .filter(|ticket| ticket.status == TicketStatus::Closed)
                .filter(|ticket| {
                    ticket.channel_id.is_some_and(|channel_id| {
                        !tables.removed_ticket_channels.contains(&channel_id)
                    })
                })
                .filter(|ticket| {
                    ticket
                        .closed_at
                        .is_some_and(|at| (closed_after..=closed_before).contains(&at))
                })
                .cloned()
                .collect();
            pending.sort_by_key(|ticket| ticket.closed_at);
            pending
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counters_are_per_guild() {
        let db = Database::in_memory();
        assert_eq!(allocate_ticket_number(&db, 1).await.unwrap(), 1);
        assert_eq!(allocate_ticket_number(&db, 1).await.unwrap(), 2);
        assert_eq!(allocate_ticket_number(&db, 2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_numbers_are_rejected() {
        let db = Database::in_memory();
        insert_ticket(&db, 1, 1, 10, 0).await.unwrap();
        assert!(insert_ticket(&db, 1, 1, 11, 0).await.is_err());
        assert!(insert_ticket(&db, 2, 1, 11, 0).await.is_ok());
    }

    #[tokio::test]
    async fn close_is_compare_and_set() {
        let db = Database::in_memory();
        let ticket = insert_ticket(&db, 1, 1, 10, 0).await.unwrap();
        assert!(attach_ticket_channel(&db, ticket.id, 500).await.unwrap());

        assert!(matches!(
            close_ticket(&db, ticket.id, 5).await.unwrap(),
            TicketClose::Closed(closed) if closed.closed_at == Some(5)
        ));
        assert!(matches!(
            close_ticket(&db, ticket.id, 6).await.unwrap(),
            TicketClose::AlreadyClosed
        ));
        assert!(matches!(
            close_ticket(&db, 404, 6).await.unwrap(),
            TicketClose::Missing
        ));

        let by_channel = find_ticket_by_channel(&db, 500).await.unwrap().unwrap();
        assert_eq!(by_channel.status, TicketStatus::Closed);
        assert!(find_open_ticket_for_user(&db, 1, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn removed_channels_stop_being_pending() {
        let db = Database::in_memory();
        let ticket = insert_ticket(&db, 1, 1, 5, 0).await.unwrap();
        attach_ticket_channel(&db, ticket.id, 900).await.unwrap();
        let open = insert_ticket(&db, 1, 2, 6, 0).await.unwrap();
        attach_ticket_channel(&db, open.id, 901).await.unwrap();

        assert!(list_pending_channel_removals(&db, 0, 100).await.unwrap().is_empty());

        close_ticket(&db, ticket.id, 50).await.unwrap();
        let pending = list_pending_channel_removals(&db, 0, 100).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].channel_id, Some(900));
        assert!(list_pending_channel_removals(&db, 60, 100).await.unwrap().is_empty());

        assert!(mark_ticket_channel_removed(&db, 900).await.unwrap());
        assert!(!mark_ticket_channel_removed(&db, 12345).await.unwrap());
        assert!(list_pending_channel_removals(&db, 0, 100).await.unwrap().is_empty());
    }
}
