//! Ticket lifecycle service
//!
//! [`ServiceDesk`] is the entry point the presentation layer talks to.
//! Every mutation is one `BEGIN IMMEDIATE` unit of work: the ticket row,
//! its history entry and any notifications commit together or not at all.
//!
//! ```text
//! OPEN ──> IN_PROGRESS ──> RESOLVED ──> CLOSED
//!   │           │                         ^
//!   └───────────┴─────────────────────────┘
//! ```

use crate::assignment::{Assignment, AssignmentEngine};
use crate::clock::Clock;
use crate::config::TriageConfig;
use crate::db::{
    last_insert_id, to_db_time, Database, EvaluationRow, NewEvaluationRow, NewTicketRow,
    NewTimeLogRow, TicketRow, TimeLogRow,
};
use crate::directory::{Directory, SqlDirectory};
use crate::error::{HelpdeskError, Result};
use crate::journal;
use crate::knowledge::{KnowledgeBase, Suggestion};
use crate::model::{
    Evaluation, HistoryEntry, Notification, NotificationKind, Score, SlaEntry, Ticket, TicketId,
    TicketStatus, TimeLogEntry, Urgency, UserId,
};
use crate::schema::{evaluations, tickets, time_logs};
use crate::sla::SlaRegistry;
use crate::triage::TriageEngine;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) fn load_ticket(conn: &mut SqliteConnection, id: TicketId) -> Result<Option<Ticket>> {
    let row = tickets::table
        .filter(tickets::id.eq(id))
        .select(TicketRow::as_select())
        .first::<TicketRow>(conn)
        .optional()?;
    Ok(row.map(Ticket::try_from).transpose()?)
}

fn require_ticket(conn: &mut SqliteConnection, id: TicketId) -> Result<Ticket> {
    load_ticket(conn, id)?.ok_or_else(|| HelpdeskError::not_found(format!("ticket {} not found", id)))
}

fn load_evaluation(conn: &mut SqliteConnection, ticket_id: TicketId) -> Result<Option<Evaluation>> {
    let row = evaluations::table
        .filter(evaluations::ticket_id.eq(ticket_id))
        .select(EvaluationRow::as_select())
        .first::<EvaluationRow>(conn)
        .optional()?;
    Ok(row.map(Evaluation::try_from).transpose()?)
}

fn load_time_logs(conn: &mut SqliteConnection, ticket_id: TicketId) -> Result<Vec<TimeLogEntry>> {
    let rows = time_logs::table
        .filter(time_logs::ticket_id.eq(ticket_id))
        .order((time_logs::logged_at.asc(), time_logs::id.asc()))
        .select(TimeLogRow::as_select())
        .load::<TimeLogRow>(conn)?;
    let logs = rows
        .into_iter()
        .map(TimeLogEntry::try_from)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(logs)
}

/// Log a rejected or failed operation and pass the result through
fn traced<T>(operation: &'static str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        warn!(operation, kind = e.kind(), reason = %e, "operation rejected");
    }
    result
}

/// Everything a requester sees about one ticket
#[derive(Debug, Clone, Serialize)]
pub struct TicketSnapshot {
    pub ticket: Ticket,
    pub history: Vec<HistoryEntry>,
    pub time_logs: Vec<TimeLogEntry>,
    /// Only looked up once the ticket is RESOLVED or CLOSED
    pub evaluation: Option<Evaluation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionReview {
    pub ticket_id: TicketId,
    pub suggested: Option<String>,
    pub alternatives: Vec<Suggestion>,
}

/// Requested change for [`ServiceDesk::update_status`]
#[derive(Debug, Clone)]
pub struct StatusUpdate<'a> {
    pub status: TicketStatus,
    /// Replaces the stored solution when given
    pub solution: Option<&'a str>,
    /// Only valid with a terminal status; defaults to now
    pub closed_at: Option<DateTime<Utc>>,
}

pub struct ServiceDesk {
    db: Database,
    clock: Arc<dyn Clock>,
    directory: Arc<dyn Directory>,
    triage: TriageEngine,
    assignment: AssignmentEngine,
    knowledge: KnowledgeBase,
    sla: SlaRegistry,
    suggestion_limit: usize,
}

impl ServiceDesk {
    /// Desk wired to the SQL-backed directory, SLA table and knowledge base
    pub fn new(db: Database, clock: Arc<dyn Clock>, config: &TriageConfig) -> Self {
        let directory: Arc<dyn Directory> = Arc::new(SqlDirectory);
        let knowledge = KnowledgeBase::new(config.excerpt_chars);
        Self {
            triage: TriageEngine::new(Arc::new(SlaRegistry), Arc::new(knowledge.clone())),
            assignment: AssignmentEngine::new(directory.clone()),
            db,
            clock,
            directory,
            knowledge,
            sla: SlaRegistry,
            suggestion_limit: config.suggestion_limit,
        }
    }

    /// Replace the triage collaborators
    pub fn with_triage(mut self, triage: TriageEngine) -> Self {
        self.triage = triage;
        self
    }

    /// Replace the directory used for user checks and assignment
    pub fn with_directory(mut self, directory: Arc<dyn Directory>) -> Self {
        self.assignment = AssignmentEngine::new(directory.clone());
        self.directory = directory;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // ========================================================================
    // Tickets
    // ========================================================================

    /// Open and triage a ticket. Ticket, history entry and requester
    /// notification are written together.
    pub fn open_ticket(&self, description: &str, category: &str, requester_id: UserId) -> Result<TicketId> {
        let description = description.trim();
        let category = category.trim();
        if description.is_empty() || category.is_empty() {
            return traced(
                "open_ticket",
                Err(HelpdeskError::validation("description and category are required")),
            );
        }

        let now = self.clock.now();
        let result = self.db.write(|conn| {
            if !self.directory.user_exists(conn, requester_id)? {
                return Err(HelpdeskError::not_found(format!("user {} not found", requester_id)));
            }

            let triage = self.triage.triage(conn, description, category)?;
            let opened_at = to_db_time(&now);
            diesel::insert_into(tickets::table)
                .values(&NewTicketRow {
                    description,
                    category,
                    urgency: triage.urgency.as_str(),
                    status: TicketStatus::Open.as_str(),
                    requester_id,
                    technician_id: None,
                    solution: triage.suggestion.as_deref(),
                    opened_at: &opened_at,
                    closed_at: None,
                    total_attendance_minutes: None,
                })
                .execute(conn)?;
            let id = last_insert_id(conn)?;

            journal::append_history(
                conn,
                id,
                requester_id,
                "Ticket opened by requester and triaged automatically.",
                now,
            )?;

            let follow_up = if triage.suggestion.is_some() {
                "A suggested solution is available."
            } else {
                "It is awaiting technician review."
            };
            journal::notify(
                conn,
                requester_id,
                Some(id),
                NotificationKind::Update,
                &format!(
                    "Ticket #{} opened. Status: {}, Urgency: {}. {}",
                    id,
                    TicketStatus::Open,
                    triage.urgency,
                    follow_up
                ),
                now,
            )?;
            Ok((id, triage.urgency))
        });

        let (id, urgency) = traced("open_ticket", result)?;
        info!(ticket_id = id, requester_id, urgency = %urgency, "ticket opened");
        Ok(id)
    }

    pub fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>> {
        self.db.read(|conn| load_ticket(conn, id))
    }

    /// History of a ticket, oldest first; empty for unknown ids
    pub fn get_history(&self, id: TicketId) -> Result<Vec<HistoryEntry>> {
        self.db.read(|conn| journal::history_for(conn, id))
    }

    pub fn status_view(&self, id: TicketId) -> Result<Option<TicketSnapshot>> {
        self.db.read(|conn| {
            let Some(ticket) = load_ticket(conn, id)? else {
                return Ok(None);
            };
            let history = journal::history_for(conn, id)?;
            let time_logs = load_time_logs(conn, id)?;
            let evaluation = if ticket.status.is_terminal() {
                load_evaluation(conn, id)?
            } else {
                None
            };
            Ok(Some(TicketSnapshot { ticket, history, time_logs, evaluation }))
        })
    }

    /// Tickets assigned to a technician, most urgent first, then oldest first
    pub fn assigned_tickets(&self, technician_id: UserId) -> Result<Vec<Ticket>> {
        let rows = self.db.read(|conn| {
            tickets::table
                .filter(tickets::technician_id.eq(technician_id))
                .order(tickets::id.asc())
                .select(TicketRow::as_select())
                .load::<TicketRow>(conn)
                .map_err(HelpdeskError::from)
        })?;
        let mut assigned = rows
            .into_iter()
            .map(Ticket::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        assigned.sort_by(|a, b| {
            b.urgency
                .rank()
                .cmp(&a.urgency.rank())
                .then(a.opened_at.cmp(&b.opened_at))
        });
        Ok(assigned)
    }

    /// Move a ticket along its lifecycle and record the applied solution.
    ///
    /// Terminal moves stamp `closed_at` (the given one, else now) and notify
    /// the requester. Logged effort is left untouched.
    pub fn update_status(&self, id: TicketId, update: &StatusUpdate<'_>, acting_user: UserId) -> Result<Ticket> {
        if update.closed_at.is_some() && !update.status.is_terminal() {
            return traced(
                "update_status",
                Err(HelpdeskError::validation(format!(
                    "closed-at can only be set when moving to {} or {}",
                    TicketStatus::Resolved,
                    TicketStatus::Closed
                ))),
            );
        }

        let now = self.clock.now();
        let result = self.db.write(|conn| {
            let ticket = require_ticket(conn, id)?;
            if !self.directory.user_exists(conn, acting_user)? {
                return Err(HelpdeskError::not_found(format!("user {} not found", acting_user)));
            }
            if !ticket.status.can_transition_to(update.status) {
                return Err(HelpdeskError::conflict(format!(
                    "wrong status: ticket {} is {} and cannot move to {}",
                    id, ticket.status, update.status
                )));
            }

            let closed_at = if update.status.is_terminal() {
                Some(update.closed_at.unwrap_or(now))
            } else {
                ticket.closed_at
            };
            let closed_at_raw = closed_at.as_ref().map(to_db_time);
            let solution = update
                .solution
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .or(ticket.solution.clone());

            diesel::update(tickets::table.filter(tickets::id.eq(id)))
                .set((
                    tickets::status.eq(update.status.as_str()),
                    tickets::solution.eq(solution.as_deref()),
                    tickets::closed_at.eq(closed_at_raw.as_deref()),
                ))
                .execute(conn)?;

            journal::append_history(
                conn,
                id,
                acting_user,
                &format!(
                    "Status updated to {}. Solution: {}",
                    update.status,
                    update.solution.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("N/A")
                ),
                now,
            )?;

            if update.status.is_terminal() {
                journal::notify(
                    conn,
                    ticket.requester_id,
                    Some(id),
                    NotificationKind::Resolution,
                    &format!("Ticket #{} was {}.", id, update.status),
                    now,
                )?;
            }

            require_ticket(conn, id)
        });

        let ticket = traced("update_status", result)?;
        info!(ticket_id = id, status = %ticket.status, acting_user, "ticket status updated");
        Ok(ticket)
    }

    /// Record effort on a ticket and add it to the running total
    pub fn add_time_log(&self, id: TicketId, technician_id: UserId, minutes: f64, activity: &str) -> Result<i32> {
        let activity = activity.trim();
        if !(minutes.is_finite() && minutes > 0.0) {
            return traced(
                "add_time_log",
                Err(HelpdeskError::validation(format!(
                    "invalid duration {}: minutes must be positive",
                    minutes
                ))),
            );
        }
        if activity.is_empty() {
            return traced("add_time_log", Err(HelpdeskError::validation("activity description is required")));
        }

        let now = self.clock.now();
        let result = self.db.write(|conn| {
            let ticket = require_ticket(conn, id)?;
            if !self.directory.user_exists(conn, technician_id)? {
                return Err(HelpdeskError::not_found(format!("technician {} not found", technician_id)));
            }

            let logged_at = to_db_time(&now);
            diesel::insert_into(time_logs::table)
                .values(&NewTimeLogRow {
                    ticket_id: id,
                    technician_id,
                    logged_at: &logged_at,
                    minutes,
                    activity,
                })
                .execute(conn)?;
            let log_id = last_insert_id(conn)?;

            let total = ticket.total_attendance_minutes.unwrap_or(0.0) + minutes;
            diesel::update(tickets::table.filter(tickets::id.eq(id)))
                .set(tickets::total_attendance_minutes.eq(Some(total)))
                .execute(conn)?;

            journal::append_history(
                conn,
                id,
                technician_id,
                &format!("Logged {} minutes on '{}'.", minutes, activity),
                now,
            )?;
            Ok(log_id)
        });

        let log_id = traced("add_time_log", result)?;
        info!(ticket_id = id, technician_id, minutes, "time logged");
        Ok(log_id)
    }

    /// Score a finished ticket, at most once. Returns the evaluation id.
    pub fn evaluate(&self, id: TicketId, score: i32, comment: Option<&str>, evaluator_id: UserId) -> Result<i32> {
        let score = traced("evaluate", Score::try_from(score))?;
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());

        let now = self.clock.now();
        let result = self.db.write(|conn| {
            if !self.directory.user_exists(conn, evaluator_id)? {
                return Err(HelpdeskError::not_found(format!("user {} not found", evaluator_id)));
            }
            let ticket = require_ticket(conn, id)?;
            if !ticket.status.is_terminal() {
                return Err(HelpdeskError::conflict(format!(
                    "wrong status: ticket {} is {} and cannot be evaluated yet",
                    id, ticket.status
                )));
            }
            if load_evaluation(conn, id)?.is_some() {
                return Err(HelpdeskError::conflict(format!("ticket {} was already evaluated", id)));
            }

            let evaluated_at = to_db_time(&now);
            diesel::insert_into(evaluations::table)
                .values(&NewEvaluationRow {
                    ticket_id: id,
                    evaluator_id,
                    score: i32::from(score.value()),
                    comment,
                    evaluated_at: &evaluated_at,
                })
                .execute(conn)?;
            let evaluation_id = last_insert_id(conn)?;

            journal::append_history(
                conn,
                id,
                evaluator_id,
                &format!("Ticket evaluated with score {} by user #{}.", score.value(), evaluator_id),
                now,
            )?;
            Ok(evaluation_id)
        });

        let evaluation_id = traced("evaluate", result)?;
        info!(ticket_id = id, evaluator_id, score = score.value(), "ticket evaluated");
        Ok(evaluation_id)
    }

    pub fn assign_technician(&self, id: TicketId, requested_by: UserId) -> Result<Assignment> {
        let now = self.clock.now();
        let result = self
            .db
            .write(|conn| self.assignment.assign(conn, id, requested_by, now));
        let assignment = traced("assign_technician", result)?;
        info!(
            ticket_id = id,
            technician_id = assignment.technician.id,
            requested_by,
            "technician assigned"
        );
        Ok(assignment)
    }

    // ========================================================================
    // Notifications and suggestions
    // ========================================================================

    /// Unread notifications, newest first. Fetching marks them read.
    pub fn fetch_notifications(&self, user_id: UserId) -> Result<Vec<Notification>> {
        self.db.write(|conn| journal::take_unread(conn, user_id))
    }

    /// Knowledge-base suggestions; `limit` defaults to the configured one
    pub fn suggest_solutions(&self, description: &str, category: &str, limit: Option<usize>) -> Result<Vec<Suggestion>> {
        let limit = limit.unwrap_or(self.suggestion_limit);
        self.db
            .read(|conn| self.knowledge.suggest(conn, description, category.trim(), limit))
    }

    /// Stored suggestion of a ticket plus other matching articles
    pub fn review_solutions(&self, id: TicketId, limit: Option<usize>) -> Result<Option<SolutionReview>> {
        let limit = limit.unwrap_or(self.suggestion_limit);
        self.db.read(|conn| {
            let Some(ticket) = load_ticket(conn, id)? else {
                return Ok(None);
            };
            let alternatives = self.knowledge.alternatives(
                conn,
                &ticket.description,
                &ticket.category,
                limit,
                ticket.solution.as_deref(),
            )?;
            Ok(Some(SolutionReview {
                ticket_id: id,
                suggested: ticket.solution,
                alternatives,
            }))
        })
    }

    pub fn add_article(&self, category: &str, title: &str, description: &str, solution: &str) -> Result<i32> {
        let id = traced(
            "add_article",
            self.db
                .write(|conn| self.knowledge.add_article(conn, category, title, description, solution)),
        )?;
        info!(article_id = id, category, "knowledge article added");
        Ok(id)
    }

    // ========================================================================
    // SLA management
    // ========================================================================

    pub fn list_sla(&self) -> Result<Vec<SlaEntry>> {
        self.db.read(|conn| self.sla.list(conn))
    }

    pub fn upsert_sla(&self, category: &str, urgency: Urgency, max_resolution_hours: i32) -> Result<()> {
        traced(
            "upsert_sla",
            self.db
                .write(|conn| self.sla.upsert(conn, category, urgency, max_resolution_hours)),
        )?;
        info!(category, urgency = %urgency, max_resolution_hours, "SLA entry saved");
        Ok(())
    }

    /// `false` when no entry existed for the pair
    pub fn delete_sla(&self, category: &str, urgency: Urgency) -> Result<bool> {
        let removed = self.db.write(|conn| self.sla.delete(conn, category, urgency))?;
        if removed {
            info!(category, urgency = %urgency, "SLA entry deleted");
        }
        Ok(removed)
    }

    pub fn categories(&self) -> Result<Vec<String>> {
        self.db.read(|conn| self.sla.categories(conn))
    }
}
