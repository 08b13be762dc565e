//! Management reports
//!
//! All reports are computed on demand from the ticket tables. Resolution
//! time is wall-clock (`closed_at - opened_at`); logged effort comes from
//! the time logs.

use crate::clock::Clock;
use crate::db::{Database, SlaRow, TicketRow, TimeLogRow};
use crate::directory::{Directory, SqlDirectory};
use crate::error::{HelpdeskError, Result};
use crate::model::{SlaEntry, Ticket, TicketStatus, TimeLogEntry, Urgency, UserId};
use crate::schema::{sla_entries, tickets, time_logs, users};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStat {
    pub category: String,
    pub tickets: usize,
    pub avg_resolution_minutes: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicianWorkload {
    pub technician_id: UserId,
    pub name: String,
    pub assigned_tickets: usize,
    pub logged_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicianHours {
    pub technician_id: UserId,
    pub name: String,
    pub logged_minutes: f64,
}

impl TechnicianHours {
    pub fn hours(&self) -> f64 {
        self.logged_minutes / 60.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosureSummary {
    pub total: usize,
    pub resolved: usize,
    pub closed: usize,
    pub avg_resolution_minutes: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenTicketLine {
    pub ticket: Ticket,
    pub requester_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverdueTicket {
    pub ticket: Ticket,
    pub requester_name: String,
    pub max_resolution_hours: i32,
    pub deadline: DateTime<Utc>,
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn finished_tickets(conn: &mut SqliteConnection) -> Result<Vec<Ticket>> {
    let rows = tickets::table
        .filter(tickets::status.eq_any([TicketStatus::Resolved.as_str(), TicketStatus::Closed.as_str()]))
        .order(tickets::id.asc())
        .select(TicketRow::as_select())
        .load::<TicketRow>(conn)?;
    let finished = rows
        .into_iter()
        .map(Ticket::try_from)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(finished)
}

/// OPEN / IN_PROGRESS tickets with their requester's name
fn active_tickets(conn: &mut SqliteConnection) -> Result<Vec<OpenTicketLine>> {
    let rows: Vec<(TicketRow, String)> = tickets::table
        .inner_join(users::table.on(users::id.eq(tickets::requester_id)))
        .filter(tickets::status.eq_any([TicketStatus::Open.as_str(), TicketStatus::InProgress.as_str()]))
        .order(tickets::id.asc())
        .select((TicketRow::as_select(), users::name))
        .load(conn)?;
    let mut lines = Vec::with_capacity(rows.len());
    for (row, requester_name) in rows {
        lines.push(OpenTicketLine {
            ticket: Ticket::try_from(row)?,
            requester_name,
        });
    }
    Ok(lines)
}

fn all_time_logs(conn: &mut SqliteConnection) -> Result<Vec<TimeLogEntry>> {
    let rows = time_logs::table
        .order(time_logs::id.asc())
        .select(TimeLogRow::as_select())
        .load::<TimeLogRow>(conn)?;
    let logs = rows
        .into_iter()
        .map(TimeLogEntry::try_from)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(logs)
}

pub struct Reports {
    db: Database,
    clock: Arc<dyn Clock>,
    directory: Arc<dyn Directory>,
}

impl Reports {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            directory: Arc::new(SqlDirectory),
        }
    }

    /// Finished tickets per category, busiest first
    pub fn tickets_by_category(&self) -> Result<Vec<CategoryStat>> {
        let finished = self.db.read(finished_tickets)?;

        let mut groups: BTreeMap<String, Vec<&Ticket>> = BTreeMap::new();
        for ticket in &finished {
            groups.entry(ticket.category.clone()).or_default().push(ticket);
        }

        let mut stats: Vec<CategoryStat> = groups
            .into_iter()
            .map(|(category, group)| CategoryStat {
                tickets: group.len(),
                avg_resolution_minutes: average(group.iter().filter_map(|t| t.elapsed_minutes())),
                category,
            })
            .collect();
        stats.sort_by(|a, b| b.tickets.cmp(&a.tickets).then_with(|| a.category.cmp(&b.category)));
        Ok(stats)
    }

    /// Mean wall-clock resolution time over finished tickets
    pub fn average_resolution_minutes(&self) -> Result<Option<f64>> {
        let finished = self.db.read(finished_tickets)?;
        Ok(average(finished.iter().filter_map(Ticket::elapsed_minutes)))
    }

    /// Assigned tickets and the effort each technician logged on them
    pub fn technician_workload(&self) -> Result<Vec<TechnicianWorkload>> {
        let (technicians, assigned, logs) = self.db.read(|conn| {
            let technicians = self.directory.list_technicians(conn)?;
            let assigned: Vec<(i32, Option<i32>)> = tickets::table
                .filter(tickets::technician_id.is_not_null())
                .select((tickets::id, tickets::technician_id))
                .load(conn)?;
            let logs = all_time_logs(conn)?;
            Ok::<_, HelpdeskError>((technicians, assigned, logs))
        })?;

        let owner: HashMap<i32, UserId> = assigned
            .into_iter()
            .filter_map(|(ticket_id, tech)| tech.map(|t| (ticket_id, t)))
            .collect();

        let mut workload: Vec<TechnicianWorkload> = technicians
            .into_iter()
            .map(|tech| {
                let assigned_tickets = owner.values().filter(|t| **t == tech.id).count();
                let logged_minutes = logs
                    .iter()
                    .filter(|log| log.technician_id == tech.id && owner.get(&log.ticket_id) == Some(&tech.id))
                    .map(|log| log.minutes)
                    .sum();
                TechnicianWorkload {
                    technician_id: tech.id,
                    name: tech.name,
                    assigned_tickets,
                    logged_minutes,
                }
            })
            .collect();
        workload.sort_by(|a, b| {
            b.assigned_tickets
                .cmp(&a.assigned_tickets)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(workload)
    }

    /// Logged minutes per technician within an optional inclusive window
    pub fn technician_hours(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<TechnicianHours>> {
        let (technicians, logs) = self.db.read(|conn| {
            let technicians = self.directory.list_technicians(conn)?;
            let logs = all_time_logs(conn)?;
            Ok::<_, HelpdeskError>((technicians, logs))
        })?;

        let mut totals: HashMap<UserId, f64> = HashMap::new();
        for log in logs {
            let after_start = from.map_or(true, |f| log.logged_at >= f);
            let before_end = to.map_or(true, |t| log.logged_at <= t);
            if after_start && before_end {
                *totals.entry(log.technician_id).or_insert(0.0) += log.minutes;
            }
        }

        // list_technicians is already ordered by name
        Ok(technicians
            .into_iter()
            .filter_map(|tech| {
                totals.get(&tech.id).map(|minutes| TechnicianHours {
                    technician_id: tech.id,
                    name: tech.name,
                    logged_minutes: *minutes,
                })
            })
            .collect())
    }

    pub fn closure_summary(&self) -> Result<ClosureSummary> {
        let finished = self.db.read(finished_tickets)?;
        let resolved = finished.iter().filter(|t| t.status == TicketStatus::Resolved).count();
        Ok(ClosureSummary {
            total: finished.len(),
            resolved,
            closed: finished.len() - resolved,
            avg_resolution_minutes: average(finished.iter().filter_map(Ticket::elapsed_minutes)),
        })
    }

    /// Active HIGH and CRITICAL tickets, newest first
    pub fn critical_open(&self) -> Result<Vec<OpenTicketLine>> {
        let mut lines: Vec<OpenTicketLine> = self
            .db
            .read(active_tickets)?
            .into_iter()
            .filter(|line| matches!(line.ticket.urgency, Urgency::High | Urgency::Critical))
            .collect();
        lines.sort_by(|a, b| {
            b.ticket
                .opened_at
                .cmp(&a.ticket.opened_at)
                .then_with(|| b.ticket.id.cmp(&a.ticket.id))
        });
        Ok(lines)
    }

    /// Active tickets past their SLA deadline, most overdue first
    pub fn overdue(&self) -> Result<Vec<OverdueTicket>> {
        let now = self.clock.now();
        let (active, sla) = self.db.read(|conn| {
            let active = active_tickets(conn)?;
            let sla = sla_entries::table
                .select(SlaRow::as_select())
                .load::<SlaRow>(conn)?
                .into_iter()
                .map(SlaEntry::try_from)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok::<_, HelpdeskError>((active, sla))
        })?;

        let limits: HashMap<(&str, Urgency), i32> = sla
            .iter()
            .map(|entry| ((entry.category.as_str(), entry.urgency), entry.max_resolution_hours))
            .collect();

        let mut overdue: Vec<OverdueTicket> = active
            .into_iter()
            .filter_map(|line| {
                let hours = *limits.get(&(line.ticket.category.as_str(), line.ticket.urgency))?;
                let deadline = line.ticket.opened_at + Duration::hours(i64::from(hours));
                (deadline < now).then(|| OverdueTicket {
                    max_resolution_hours: hours,
                    deadline,
                    ticket: line.ticket,
                    requester_name: line.requester_name,
                })
            })
            .collect();
        overdue.sort_by(|a, b| a.deadline.cmp(&b.deadline).then_with(|| a.ticket.id.cmp(&b.ticket.id)));
        Ok(overdue)
    }
}
