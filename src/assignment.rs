//! Technician assignment
//!
//! Candidates are technicians whose skill names contain the ticket
//! category. While no technician has declared any skill at all, every
//! technician is a candidate. The first candidate by name wins.

use crate::directory::Directory;
use crate::error::{HelpdeskError, Result};
use crate::journal;
use crate::lifecycle::load_ticket;
use crate::model::{NotificationKind, TicketId, TicketStatus, User, UserId};
use crate::schema::tickets;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub ticket_id: TicketId,
    pub technician: User,
}

#[derive(Clone)]
pub struct AssignmentEngine {
    directory: Arc<dyn Directory>,
}

impl AssignmentEngine {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Technicians eligible for tickets in `category`, ordered by name
    pub fn candidates(&self, conn: &mut SqliteConnection, category: &str) -> Result<Vec<User>> {
        if !self.directory.any_technician_has_declared_skills(conn)? {
            debug!(category, "no technician declared skills, widening to all technicians");
            return self.directory.list_technicians(conn);
        }
        self.directory.technicians_with_skill_match(conn, category)
    }

    /// Assign the ticket and move it to IN_PROGRESS. Must run inside the
    /// caller's write transaction; any `Err` leaves nothing behind.
    pub fn assign(
        &self,
        conn: &mut SqliteConnection,
        ticket_id: TicketId,
        requested_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Assignment> {
        let ticket = load_ticket(conn, ticket_id)?
            .ok_or_else(|| HelpdeskError::not_found(format!("ticket {} not found", ticket_id)))?;
        if !self.directory.user_exists(conn, requested_by)? {
            return Err(HelpdeskError::not_found(format!("user {} not found", requested_by)));
        }
        if ticket.technician_id.is_some() {
            return Err(HelpdeskError::conflict(format!(
                "ticket {} is already assigned",
                ticket_id
            )));
        }
        if ticket.status.is_terminal() {
            return Err(HelpdeskError::conflict(format!(
                "wrong status: ticket {} is {}",
                ticket_id, ticket.status
            )));
        }

        let candidates = self.candidates(conn, &ticket.category)?;
        debug!(ticket_id, candidates = candidates.len(), "technician candidates");
        let technician = candidates.into_iter().next().ok_or_else(|| {
            HelpdeskError::conflict(format!(
                "no suitable technician for category '{}'",
                ticket.category
            ))
        })?;

        diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
            .set((
                tickets::technician_id.eq(Some(technician.id)),
                tickets::status.eq(TicketStatus::InProgress.as_str()),
            ))
            .execute(conn)?;

        journal::append_history(
            conn,
            ticket_id,
            requested_by,
            &format!(
                "Ticket assigned to technician #{} ({}) by user #{}.",
                technician.id, technician.name, requested_by
            ),
            now,
        )?;
        journal::notify(
            conn,
            technician.id,
            Some(ticket_id),
            NotificationKind::Assignment,
            &format!("A ticket was assigned to you: #{} ({}).", ticket_id, ticket.description),
            now,
        )?;
        journal::notify(
            conn,
            ticket.requester_id,
            Some(ticket_id),
            NotificationKind::Update,
            &format!(
                "Your ticket #{} was assigned to a technician and is now {}.",
                ticket_id,
                TicketStatus::InProgress
            ),
            now,
        )?;

        Ok(Assignment { ticket_id, technician })
    }
}
