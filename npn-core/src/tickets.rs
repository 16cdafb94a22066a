use npn_database::Database;
use npn_database::impls::guild_config::get_guild_config;
use npn_database::impls::tickets::{
    allocate_ticket_number, attach_ticket_channel, close_ticket, find_open_ticket_for_user,
    find_ticket_by_channel, get_ticket, insert_ticket, list_open_tickets,
    list_pending_channel_removals, mark_ticket_channel_removed,
};
use npn_database::model::tickets::{Ticket, TicketClose};
use tracing::info;

use crate::actions::AccessSet;
use crate::error::{EngineError, EngineResult};

/// Channel name for a ticket number, e.g. `ticket-0042`.
pub fn channel_name(number: u64) -> String {
    format!("ticket-{number:04}")
}

/// Reserve the next ticket number for a guild.
pub async fn allocate(db: &Database, guild_id: u64) -> EngineResult<u64> {
    Ok(allocate_ticket_number(db, guild_id).await?)
}

/// Create the ticket record and compute who may see its channel.
pub async fn open(
    db: &Database,
    guild_id: u64,
    creator_id: u64,
    number: u64,
    now: u64,
) -> EngineResult<(Ticket, AccessSet)> {
    let config = get_guild_config(db, guild_id).await?;
    let ticket = insert_ticket(db, guild_id, number, creator_id, now).await?;

    info!(guild_id, ticket_id = ticket.id, number, creator_id, "ticket opened");

    let access = AccessSet {
        members: vec![creator_id],
        roles: config.tickets.support_role_ids,
        administrators: true,
    };
    Ok((ticket, access))
}

pub async fn attach_channel(db: &Database, ticket_id: u64, channel_id: u64) -> EngineResult<()> {
    if attach_ticket_channel(db, ticket_id, channel_id).await? {
        Ok(())
    } else {
        Err(EngineError::TicketNotFound)
    }
}

/// Record that a ticket channel is gone. Channels that never belonged to a
/// ticket are ignored.
pub async fn channel_removed(db: &Database, channel_id: u64) -> EngineResult<()> {
    if mark_ticket_channel_removed(db, channel_id).await? {
        info!(channel_id, "ticket channel removed");
    }
    Ok(())
}

/// Closed tickets whose channel deletion was never confirmed.
pub async fn pending_channel_removals(
    db: &Database,
    closed_after: u64,
    closed_before: u64,
) -> EngineResult<Vec<Ticket>> {
    Ok(list_pending_channel_removals(db, closed_after, closed_before).await?)
}

/// Mark a ticket closed. Exactly one caller succeeds.
pub async fn close(db: &Database, ticket_id: u64, now: u64) -> EngineResult<Ticket> {
    match close_ticket(db, ticket_id, now).await? {
        TicketClose::Missing => Err(EngineError::TicketNotFound),
        TicketClose::AlreadyClosed => Err(EngineError::AlreadyClosed),
        TicketClose::Closed(ticket) => {
            info!(ticket_id, guild_id = ticket.guild_id, "ticket closed");
            Ok(ticket)
        }
    }
}

pub async fn get(db: &Database, ticket_id: u64) -> EngineResult<Ticket> {
    get_ticket(db, ticket_id)
        .await?
        .ok_or(EngineError::TicketNotFound)
}

pub async fn find_open_for_user(
    db: &Database,
    guild_id: u64,
    user_id: u64,
) -> EngineResult<Option<Ticket>> {
    Ok(find_open_ticket_for_user(db, guild_id, user_id).await?)
}

pub async fn find_by_channel(db: &Database, channel_id: u64) -> EngineResult<Option<Ticket>> {
    Ok(find_ticket_by_channel(db, channel_id).await?)
}

pub async fn list_open(db: &Database, guild_id: u64) -> EngineResult<Vec<Ticket>> {
    Ok(list_open_tickets(db, guild_id).await?)
}

#[derive(Clone, Debug)]
pub enum Intake {
    /// The member already has an open ticket.
    Existing(Ticket),
    Opened {
        ticket: Ticket,
        access: AccessSet,
        category_id: Option<u64>,
    },
}

/// Open a ticket unless the member already has one.
pub async fn intake(
    db: &Database,
    guild_id: u64,
    creator_id: u64,
    now: u64,
) -> EngineResult<Intake> {
    if let Some(existing) = find_open_for_user(db, guild_id, creator_id).await? {
        return Ok(Intake::Existing(existing));
    }

    let number = allocate(db, guild_id).await?;
    let (ticket, access) = open(db, guild_id, creator_id, number, now).await?;
    let category_id = get_guild_config(db, guild_id).await?.tickets.category_id;

    Ok(Intake::Opened {
        ticket,
        access,
        category_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use npn_database::impls::guild_config::set_support_roles;
    use npn_database::model::tickets::TicketStatus;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocations_are_sequential() {
        let db = Database::in_memory();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move { allocate(&db, 7).await })
            })
            .collect();

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap());
        }
        numbers.sort_unstable();

        assert_eq!(numbers, (1..=32).collect::<Vec<u64>>());
        assert_eq!(allocate(&db, 8).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn open_grants_creator_and_support_roles() {
        let db = Database::in_memory();
        set_support_roles(&db, 1, &[50, 40]).await.unwrap();

        let number = allocate(&db, 1).await.unwrap();
        let (ticket, access) = open(&db, 1, 99, number, 10).await.unwrap();

        assert_eq!(ticket.number, 1);
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(access.members, vec![99]);
        assert_eq!(access.roles, vec![40, 50]);
        assert!(access.administrators);
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let db = Database::in_memory();
        let (ticket, _) = open(&db, 1, 99, allocate(&db, 1).await.unwrap(), 10)
            .await
            .unwrap();
        attach_channel(&db, ticket.id, 555).await.unwrap();

        let closed = close(&db, ticket.id, 20).await.unwrap();
        assert_eq!(closed.status, TicketStatus::Closed);
        assert_eq!(closed.channel_id, Some(555));

        let err = close(&db, ticket.id, 30).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyTerminal);

        let err = close(&db, 12345, 30).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn attach_requires_ticket() {
        let db = Database::in_memory();
        let err = attach_channel(&db, 404, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn intake_reuses_open_ticket() {
        let db = Database::in_memory();

        let Intake::Opened { ticket, .. } = intake(&db, 1, 99, 0).await.unwrap() else {
            panic!("expected a new ticket");
        };
        let Intake::Existing(existing) = intake(&db, 1, 99, 5).await.unwrap() else {
            panic!("expected the open ticket");
        };
        assert_eq!(existing.id, ticket.id);

        close(&db, ticket.id, 10).await.unwrap();
        let Intake::Opened { ticket: next, .. } = intake(&db, 1, 99, 20).await.unwrap() else {
            panic!("expected a new ticket after close");
        };
        assert_eq!(next.number, 2);
        assert_eq!(channel_name(next.number), "ticket-0002");
    }
}
