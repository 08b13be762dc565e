//! Ticket history and user notifications
//!
//! Both are append-only side effects of ticket mutations and are always
//! written on the same connection (and transaction) as the change that
//! produced them.

use crate::db::{to_db_time, HistoryRow, NewHistoryRow, NewNotificationRow, NotificationRow};
use crate::error::Result;
use crate::model::{HistoryEntry, Notification, NotificationKind, TicketId, UserId};
use crate::schema::{notifications, ticket_history};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

pub fn append_history(
    conn: &mut SqliteConnection,
    ticket_id: TicketId,
    user_id: UserId,
    description: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let recorded_at = to_db_time(&at);
    diesel::insert_into(ticket_history::table)
        .values(&NewHistoryRow {
            ticket_id,
            recorded_at: &recorded_at,
            description,
            user_id,
        })
        .execute(conn)?;
    Ok(())
}

pub fn notify(
    conn: &mut SqliteConnection,
    recipient_id: UserId,
    ticket_id: Option<TicketId>,
    kind: NotificationKind,
    message: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let sent_at = to_db_time(&at);
    diesel::insert_into(notifications::table)
        .values(&NewNotificationRow {
            recipient_id,
            message,
            ticket_id,
            kind: kind.as_str(),
            sent_at: &sent_at,
            is_read: false,
        })
        .execute(conn)?;
    Ok(())
}

/// History of one ticket, oldest first
pub fn history_for(conn: &mut SqliteConnection, ticket_id: TicketId) -> Result<Vec<HistoryEntry>> {
    let rows = ticket_history::table
        .filter(ticket_history::ticket_id.eq(ticket_id))
        .order((ticket_history::recorded_at.asc(), ticket_history::id.asc()))
        .select(HistoryRow::as_select())
        .load::<HistoryRow>(conn)?;
    let entries = rows
        .into_iter()
        .map(HistoryEntry::try_from)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Unread notifications of `recipient_id`, newest first, flagged read in
/// the same call. Run it inside a write transaction so a second reader
/// cannot see the same batch.
pub fn take_unread(conn: &mut SqliteConnection, recipient_id: UserId) -> Result<Vec<Notification>> {
    let rows = notifications::table
        .filter(notifications::recipient_id.eq(recipient_id))
        .filter(notifications::is_read.eq(false))
        .order((notifications::sent_at.desc(), notifications::id.desc()))
        .select(NotificationRow::as_select())
        .load::<NotificationRow>(conn)?;

    let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
    if !ids.is_empty() {
        diesel::update(notifications::table.filter(notifications::id.eq_any(&ids)))
            .set(notifications::is_read.eq(true))
            .execute(conn)?;
    }

    let unread = rows
        .into_iter()
        .map(Notification::try_from)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(unread)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture, start_time};
    use chrono::Duration;

    #[test]
    fn test_take_unread_marks_read_and_orders_newest_first() {
        let fx = fixture();
        let t0 = start_time();
        let taken = fx
            .db
            .write(|conn| {
                notify(conn, fx.requester, None, NotificationKind::Update, "first", t0)?;
                notify(conn, fx.requester, None, NotificationKind::Resolution, "second", t0 + Duration::minutes(5))?;
                notify(conn, fx.manager, None, NotificationKind::Update, "not yours", t0)?;
                take_unread(conn, fx.requester)
            })
            .unwrap();

        let messages: Vec<_> = taken.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["second", "first"]);
        assert!(taken.iter().all(|n| !n.read));

        let again = fx.db.write(|conn| take_unread(conn, fx.requester)).unwrap();
        assert!(again.is_empty());
        let managers = fx.db.write(|conn| take_unread(conn, fx.manager)).unwrap();
        assert_eq!(managers.len(), 1);
    }
}
