//! Helpdesk - ticket triage, assignment and tracking on SQLite
//!
//! Requesters open tickets, the desk triages them against the SLA table and
//! the knowledge base, technicians are picked by skill, and every change is
//! journaled as ticket history plus user notifications.
//!
//! # Ticket lifecycle
//!
//! | Status | Meaning |
//! |--------|---------|
//! | `OPEN` | Triaged, waiting for a technician |
//! | `IN_PROGRESS` | Assigned and being worked on |
//! | `RESOLVED` | Solution applied, can still be closed |
//! | `CLOSED` | Done; no further moves |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use helpdesk::{Database, ServiceDesk, SystemClock, TriageConfig};
//!
//! let db = Database::new("helpdesk.db").unwrap();
//! let desk = ServiceDesk::new(db, Arc::new(SystemClock), &TriageConfig::default());
//!
//! // Open a ticket as user 1; urgency and a suggested fix are filled in
//! let id = desk.open_ticket("Printer shows paper jam", "Hardware", 1).unwrap();
//!
//! // Pick a technician by skill
//! let assignment = desk.assign_technician(id, 1).unwrap();
//! println!("#{} -> {}", id, assignment.technician.name);
//! ```

pub mod assignment;
pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod init;
pub mod journal;
pub mod knowledge;
pub mod lifecycle;
pub mod model;
pub mod report;
pub mod schema;
pub mod sla;
pub mod triage;

#[cfg(test)]
pub(crate) mod test_support;

pub use assignment::{Assignment, AssignmentEngine};
pub use auth::{CredentialVerifier, SaltedSha256};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Config, TriageConfig};
pub use db::{Database, DbError, CURRENT_SCHEMA};
pub use directory::{Directory, NewUser, SqlDirectory, UserRegistry};
pub use error::HelpdeskError;
pub use knowledge::{KnowledgeBase, Suggestion};
pub use lifecycle::{ServiceDesk, SolutionReview, StatusUpdate, TicketSnapshot};
pub use model::{
    Department, Evaluation, HistoryEntry, KnowledgeArticle, Notification, NotificationKind, Score,
    Skill, SlaEntry, Ticket, TicketId, TicketStatus, TimeLogEntry, Urgency, User, UserId,
    UserStatus, UserType,
};
pub use report::Reports;
pub use sla::SlaRegistry;
pub use triage::{SlaLookup, SolutionLookup, Triage, TriageEngine};
