//! Domain records for the helpdesk
//!
//! Status, urgency and user-type values are closed enums here. Their text
//! form only exists in the database and on the command line; conversion
//! happens once, in the `TryFrom<...Row>` impls below.

use crate::db::{
    parse_db_time, ArticleRow, DbError, DepartmentRow, EvaluationRow, HistoryRow, NotificationRow,
    SkillRow, SlaRow, TicketRow, TimeLogRow, UserRow,
};
use crate::error::HelpdeskError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::str::FromStr;

pub type TicketId = i32;
pub type UserId = i32;

/// Implements `as_str`, `Display` and case-insensitive `FromStr` for a
/// fieldless enum with upper-case wire names.
macro_rules! wire_enum {
    ($enum_name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl $enum_name {
            pub const ALL: &'static [$enum_name] = &[$($enum_name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($enum_name::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
                match normalized.as_str() {
                    $($str => Ok($enum_name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

wire_enum!(Urgency {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
    Critical => "CRITICAL",
});

impl Urgency {
    /// Severity rank, LOW = 1 through CRITICAL = 4
    pub fn rank(self) -> u8 {
        match self {
            Urgency::Low => 1,
            Urgency::Medium => 2,
            Urgency::High => 3,
            Urgency::Critical => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

wire_enum!(TicketStatus {
    Open => "OPEN",
    InProgress => "IN_PROGRESS",
    Resolved => "RESOLVED",
    Closed => "CLOSED",
});

impl TicketStatus {
    /// RESOLVED and CLOSED end the working life of a ticket
    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }

    /// Forward-only moves. Non-terminal tickets may keep their status (to
    /// revise the solution); RESOLVED may only move on to CLOSED.
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        match self {
            TicketStatus::Open => true,
            TicketStatus::InProgress => next != TicketStatus::Open,
            TicketStatus::Resolved => next == TicketStatus::Closed,
            TicketStatus::Closed => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
    Regular,
    Technician,
    Manager,
    Hr,
}

wire_enum!(UserType {
    Regular => "REGULAR",
    Technician => "TECHNICIAN",
    Manager => "MANAGER",
    Hr => "HR",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Inactive,
}

wire_enum!(UserStatus {
    Active => "ACTIVE",
    Inactive => "INACTIVE",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Update,
    Assignment,
    Resolution,
}

wire_enum!(NotificationKind {
    Update => "UPDATE",
    Assignment => "ASSIGNMENT",
    Resolution => "RESOLUTION",
});

fn parse_stored<T: FromStr<Err = String>>(raw: &str) -> Result<T, DbError> {
    raw.parse::<T>().map_err(DbError::Corrupt)
}

fn parse_stored_time(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, DbError> {
    raw.map(parse_db_time).transpose()
}

/// Evaluation score, 0 through 10 inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Score(u8);

impl Score {
    pub const MAX: u8 = 10;

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i32> for Score {
    type Error = HelpdeskError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        if (0..=i32::from(Score::MAX)).contains(&raw) {
            Ok(Score(raw as u8))
        } else {
            Err(HelpdeskError::validation(format!(
                "invalid score {}: must be between 0 and {}",
                raw,
                Score::MAX
            )))
        }
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.0, Score::MAX)
    }
}

// ============================================================================
// Tickets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ticket {
    pub id: TicketId,
    pub description: String,
    pub category: String,
    pub urgency: Urgency,
    pub status: TicketStatus,
    pub requester_id: UserId,
    pub technician_id: Option<UserId>,
    /// Triage suggestion until a technician records the applied solution
    pub solution: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Sum of logged effort in minutes; None until the first time log
    pub total_attendance_minutes: Option<f64>,
}

impl Ticket {
    /// Wall-clock minutes between opening and closing
    pub fn elapsed_minutes(&self) -> Option<f64> {
        self.closed_at
            .map(|closed| (closed - self.opened_at).num_seconds() as f64 / 60.0)
    }
}

impl TryFrom<TicketRow> for Ticket {
    type Error = DbError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            urgency: parse_stored(&row.urgency)?,
            status: parse_stored(&row.status)?,
            opened_at: parse_db_time(&row.opened_at)?,
            closed_at: parse_stored_time(row.closed_at.as_deref())?,
            description: row.description,
            category: row.category,
            requester_id: row.requester_id,
            technician_id: row.technician_id,
            solution: row.solution,
            total_attendance_minutes: row.total_attendance_minutes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: i32,
    pub ticket_id: TicketId,
    pub recorded_at: DateTime<Utc>,
    pub description: String,
    pub user_id: UserId,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = DbError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(HistoryEntry {
            id: row.id,
            ticket_id: row.ticket_id,
            recorded_at: parse_db_time(&row.recorded_at)?,
            description: row.description,
            user_id: row.user_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: i32,
    pub recipient_id: UserId,
    pub message: String,
    pub ticket_id: Option<TicketId>,
    pub kind: NotificationKind,
    pub sent_at: DateTime<Utc>,
    pub read: bool,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = DbError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: row.id,
            recipient_id: row.recipient_id,
            kind: parse_stored(&row.kind)?,
            sent_at: parse_db_time(&row.sent_at)?,
            message: row.message,
            ticket_id: row.ticket_id,
            read: row.is_read,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeLogEntry {
    pub id: i32,
    pub ticket_id: TicketId,
    pub technician_id: UserId,
    pub logged_at: DateTime<Utc>,
    pub minutes: f64,
    pub activity: String,
}

impl TryFrom<TimeLogRow> for TimeLogEntry {
    type Error = DbError;

    fn try_from(row: TimeLogRow) -> Result<Self, Self::Error> {
        Ok(TimeLogEntry {
            id: row.id,
            ticket_id: row.ticket_id,
            technician_id: row.technician_id,
            logged_at: parse_db_time(&row.logged_at)?,
            minutes: row.minutes,
            activity: row.activity,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub id: i32,
    pub ticket_id: TicketId,
    pub evaluator_id: UserId,
    pub score: Score,
    pub comment: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl TryFrom<EvaluationRow> for Evaluation {
    type Error = DbError;

    fn try_from(row: EvaluationRow) -> Result<Self, Self::Error> {
        let score = Score::try_from(row.score)
            .map_err(|_| DbError::Corrupt(format!("stored score {} out of range", row.score)))?;
        Ok(Evaluation {
            id: row.id,
            ticket_id: row.ticket_id,
            evaluator_id: row.evaluator_id,
            score,
            comment: row.comment,
            evaluated_at: parse_db_time(&row.evaluated_at)?,
        })
    }
}

// ============================================================================
// Triage reference data
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlaEntry {
    pub category: String,
    pub urgency: Urgency,
    pub max_resolution_hours: i32,
}

impl TryFrom<SlaRow> for SlaEntry {
    type Error = DbError;

    fn try_from(row: SlaRow) -> Result<Self, Self::Error> {
        Ok(SlaEntry {
            urgency: parse_stored(&row.urgency)?,
            category: row.category,
            max_resolution_hours: row.max_resolution_hours,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnowledgeArticle {
    pub id: i32,
    pub category: String,
    pub title: String,
    pub description: String,
    pub solution: String,
}

impl From<ArticleRow> for KnowledgeArticle {
    fn from(row: ArticleRow) -> Self {
        KnowledgeArticle {
            id: row.id,
            category: row.category,
            title: row.title,
            description: row.description,
            solution: row.solution,
        }
    }
}

// ============================================================================
// Directory
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub birth_date: Option<NaiveDate>,
    pub user_type: UserType,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub status: UserStatus,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let birth_date = row
            .birth_date
            .as_deref()
            .map(|raw| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|e| DbError::Corrupt(format!("bad birth date '{}': {}", raw, e)))
            })
            .transpose()?;
        Ok(User {
            id: row.id,
            user_type: parse_stored(&row.user_type)?,
            status: parse_stored(&row.status)?,
            registered_at: parse_db_time(&row.registered_at)?,
            birth_date,
            name: row.name,
            email: row.email,
            department: row.department,
            phone: row.phone,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skill {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

impl From<SkillRow> for Skill {
    fn from(row: SkillRow) -> Self {
        Skill { id: row.id, name: row.name, description: row.description }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Department {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

impl From<DepartmentRow> for Department {
    fn from(row: DepartmentRow) -> Self {
        Department { id: row.id, name: row.name, description: row.description }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(TicketStatus::InProgress.as_str(), "IN_PROGRESS");
        assert_eq!("in-progress".parse::<TicketStatus>().unwrap(), TicketStatus::InProgress);
        assert_eq!("critical".parse::<Urgency>().unwrap(), Urgency::Critical);
        assert_eq!(" hr ".parse::<UserType>().unwrap(), UserType::Hr);
        assert!("URGENT".parse::<Urgency>().is_err());
        assert_eq!(serde_json::to_string(&TicketStatus::InProgress).unwrap(), "\"IN_PROGRESS\"");
    }

    #[test]
    fn test_urgency_rank_is_strictly_increasing() {
        let ranks: Vec<u8> = Urgency::ALL.iter().map(|u| u.rank()).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_status_transitions() {
        use TicketStatus::*;
        assert!(Open.can_transition_to(InProgress));
        assert!(Open.can_transition_to(Closed));
        assert!(InProgress.can_transition_to(Resolved));
        assert!(InProgress.can_transition_to(InProgress));
        assert!(!InProgress.can_transition_to(Open));
        assert!(Resolved.can_transition_to(Closed));
        assert!(!Resolved.can_transition_to(Resolved));
        assert!(!Resolved.can_transition_to(InProgress));
        for next in TicketStatus::ALL {
            assert!(!Closed.can_transition_to(*next));
        }
    }

    #[test]
    fn test_corrupt_row_is_rejected() {
        let row = TicketRow {
            id: 1,
            description: "d".into(),
            category: "c".into(),
            urgency: "SOMEDAY".into(),
            status: "OPEN".into(),
            requester_id: 1,
            technician_id: None,
            solution: None,
            opened_at: "2024-01-01T00:00:00.000000Z".into(),
            closed_at: None,
            total_attendance_minutes: None,
        };
        assert!(matches!(Ticket::try_from(row), Err(DbError::Corrupt(_))));
    }

    proptest! {
        #[test]
        fn score_accepts_exactly_zero_to_ten(raw in -1000i32..1000) {
            let parsed = Score::try_from(raw);
            prop_assert_eq!(parsed.is_ok(), (0..=10).contains(&raw));
            if let Ok(score) = parsed {
                prop_assert_eq!(i32::from(score.value()), raw);
            }
        }
    }
}
