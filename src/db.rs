//! SQLite database with Diesel ORM
//!
//! Stores tickets, their history, notifications, time logs, evaluations and
//! the directory/triage reference data. Tables are created on open; there is
//! no external migration runner.

use crate::schema::*;
use chrono::{DateTime, SecondsFormat, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use std::path::Path;
use thiserror::Error;

/// Walk up directory tree to find .helpdesk folder (like git finds .git)
/// Can be overridden with HELPDESK_DB_PATH env var
fn get_db_path() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("HELPDESK_DB_PATH") {
        return std::path::PathBuf::from(path);
    }

    if let Ok(current_dir) = std::env::current_dir() {
        let mut dir = current_dir.as_path();
        loop {
            let helpdesk_dir = dir.join(".helpdesk");
            if helpdesk_dir.is_dir() {
                return helpdesk_dir.join("helpdesk.db");
            }
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    // Nothing found - `helpdesk init` creates it here
    std::path::PathBuf::from(".helpdesk/helpdesk.db")
}

/// Current schema version for helpdesk
pub const CURRENT_SCHEMA: HelpdeskSchema = HelpdeskSchema {
    major: 1,
    minor: 2,
    patch: 0,
    name: "helpdesk-ticketing",
    features: &[
        "directory",
        "tickets",
        "ticket_history",
        "notifications",
        "time_logs",
        "evaluations",
        "sla_entries",
        "knowledge_articles",
    ],
};

/// Describes the version and capabilities of the schema
#[derive(Debug, Clone)]
pub struct HelpdeskSchema {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub name: &'static str,
    pub features: &'static [&'static str],
}

impl HelpdeskSchema {
    pub fn version_string(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl std::fmt::Display for HelpdeskSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{} ({})", self.version_string(), self.name)
    }
}

/// Format a timestamp the way every `*_at` column stores it
pub fn to_db_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored `*_at` column back into UTC
pub fn parse_db_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| DbError::Corrupt(format!("bad timestamp '{}': {}", raw, e)))
}

// ============================================================================
// Diesel Models
// ============================================================================

/// Insertable schema version
#[derive(Insertable)]
#[diesel(table_name = schema_versions)]
pub struct NewSchemaVersion<'a> {
    pub version: &'a str,
    pub name: &'a str,
    pub features: &'a str,
    pub introduced_at: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = departments)]
pub struct NewDepartmentRow<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = departments)]
pub struct DepartmentRow {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = skills)]
pub struct NewSkillRow<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = skills)]
pub struct SkillRow {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

/// Insertable user
#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUserRow<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub birth_date: Option<&'a str>,
    pub user_type: &'a str,
    pub department: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub registered_at: &'a str,
    pub status: &'a str,
    pub credential: &'a str,
}

/// Queryable user
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = users)]
pub struct UserRow {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub birth_date: Option<String>,
    pub user_type: String,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub registered_at: String,
    pub status: String,
    pub credential: String,
}

#[derive(Insertable)]
#[diesel(table_name = technician_skills)]
pub struct NewTechnicianSkill {
    pub technician_id: i32,
    pub skill_id: i32,
}

/// Insertable ticket
#[derive(Insertable)]
#[diesel(table_name = tickets)]
pub struct NewTicketRow<'a> {
    pub description: &'a str,
    pub category: &'a str,
    pub urgency: &'a str,
    pub status: &'a str,
    pub requester_id: i32,
    pub technician_id: Option<i32>,
    pub solution: Option<&'a str>,
    pub opened_at: &'a str,
    pub closed_at: Option<&'a str>,
    pub total_attendance_minutes: Option<f64>,
}

/// Queryable ticket
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = tickets)]
pub struct TicketRow {
    pub id: i32,
    pub description: String,
    pub category: String,
    pub urgency: String,
    pub status: String,
    pub requester_id: i32,
    pub technician_id: Option<i32>,
    pub solution: Option<String>,
    pub opened_at: String,
    pub closed_at: Option<String>,
    pub total_attendance_minutes: Option<f64>,
}

#[derive(Insertable)]
#[diesel(table_name = ticket_history)]
pub struct NewHistoryRow<'a> {
    pub ticket_id: i32,
    pub recorded_at: &'a str,
    pub description: &'a str,
    pub user_id: i32,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = ticket_history)]
pub struct HistoryRow {
    pub id: i32,
    pub ticket_id: i32,
    pub recorded_at: String,
    pub description: String,
    pub user_id: i32,
}

#[derive(Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotificationRow<'a> {
    pub recipient_id: i32,
    pub message: &'a str,
    pub ticket_id: Option<i32>,
    pub kind: &'a str,
    pub sent_at: &'a str,
    pub is_read: bool,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = notifications)]
pub struct NotificationRow {
    pub id: i32,
    pub recipient_id: i32,
    pub message: String,
    pub ticket_id: Option<i32>,
    pub kind: String,
    pub sent_at: String,
    pub is_read: bool,
}

#[derive(Insertable)]
#[diesel(table_name = time_logs)]
pub struct NewTimeLogRow<'a> {
    pub ticket_id: i32,
    pub technician_id: i32,
    pub logged_at: &'a str,
    pub minutes: f64,
    pub activity: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = time_logs)]
pub struct TimeLogRow {
    pub id: i32,
    pub ticket_id: i32,
    pub technician_id: i32,
    pub logged_at: String,
    pub minutes: f64,
    pub activity: String,
}

#[derive(Insertable)]
#[diesel(table_name = evaluations)]
pub struct NewEvaluationRow<'a> {
    pub ticket_id: i32,
    pub evaluator_id: i32,
    pub score: i32,
    pub comment: Option<&'a str>,
    pub evaluated_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = evaluations)]
pub struct EvaluationRow {
    pub id: i32,
    pub ticket_id: i32,
    pub evaluator_id: i32,
    pub score: i32,
    pub comment: Option<String>,
    pub evaluated_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = sla_entries)]
pub struct NewSlaRow<'a> {
    pub category: &'a str,
    pub urgency: &'a str,
    pub max_resolution_hours: i32,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = sla_entries)]
pub struct SlaRow {
    pub id: i32,
    pub category: String,
    pub urgency: String,
    pub max_resolution_hours: i32,
}

#[derive(Insertable)]
#[diesel(table_name = knowledge_articles)]
pub struct NewArticleRow<'a> {
    pub category: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub solution: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = knowledge_articles)]
pub struct ArticleRow {
    pub id: i32,
    pub category: String,
    pub title: String,
    pub description: String,
    pub solution: String,
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection pragmas. SQLite forgets these between connections.
#[derive(Debug)]
struct ConnectionOptions {
    busy_timeout_ms: u32,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            self.busy_timeout_ms
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Database connection wrapper with connection pool
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

/// Error type for database operations
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(#[from] diesel::result::Error),
    /// A stored value that no longer maps onto the domain model
    #[error("Corrupt value: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

pub const DEFAULT_POOL_SIZE: u32 = 5;

impl Database {
    /// Get the database path that will be used
    pub fn db_path() -> std::path::PathBuf {
        get_db_path()
    }

    /// Create a new database at a custom path
    pub fn new(path: &str) -> Result<Self> {
        Self::open_at(path, DEFAULT_POOL_SIZE)
    }

    /// Open database at specified path
    pub fn open_at<P: AsRef<Path>>(path: P, pool_size: u32) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_customizer(Box::new(ConnectionOptions { busy_timeout_ms: 5_000 }))
            .build(manager)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.init_schema()?;
        tracing::debug!(path = %path_str, schema = %CURRENT_SCHEMA, "database opened");
        Ok(db)
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| DbError::Connection(e.to_string()))
    }

    /// Run read-only queries on one pooled connection
    pub fn read<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut SqliteConnection) -> std::result::Result<T, E>,
        E: From<DbError>,
    {
        let mut conn = self.get_conn()?;
        f(&mut *conn)
    }

    /// Run a unit of work inside one `BEGIN IMMEDIATE` transaction.
    ///
    /// Any `Err` returned by `f` rolls every write back, including ids
    /// handed out by AUTOINCREMENT.
    pub fn write<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut SqliteConnection) -> std::result::Result<T, E>,
        E: From<DbError> + From<diesel::result::Error>,
    {
        let mut conn = self.get_conn()?;
        conn.immediate_transaction(f)
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS schema_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                version TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                features TEXT NOT NULL,
                introduced_at TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS departments (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                name TEXT NOT NULL UNIQUE,
                description TEXT
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS skills (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                name TEXT NOT NULL UNIQUE,
                description TEXT
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                birth_date TEXT,
                user_type TEXT NOT NULL,
                department TEXT,
                phone TEXT,
                registered_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                credential TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS technician_skills (
                technician_id INTEGER NOT NULL,
                skill_id INTEGER NOT NULL,
                PRIMARY KEY (technician_id, skill_id),
                FOREIGN KEY (technician_id) REFERENCES users(id),
                FOREIGN KEY (skill_id) REFERENCES skills(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                urgency TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'OPEN',
                requester_id INTEGER NOT NULL,
                technician_id INTEGER,
                solution TEXT,
                opened_at TEXT NOT NULL,
                closed_at TEXT,
                total_attendance_minutes REAL,
                FOREIGN KEY (requester_id) REFERENCES users(id),
                FOREIGN KEY (technician_id) REFERENCES users(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS ticket_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                ticket_id INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                description TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                FOREIGN KEY (ticket_id) REFERENCES tickets(id),
                FOREIGN KEY (user_id) REFERENCES users(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                recipient_id INTEGER NOT NULL,
                message TEXT NOT NULL,
                ticket_id INTEGER,
                kind TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (recipient_id) REFERENCES users(id),
                FOREIGN KEY (ticket_id) REFERENCES tickets(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS time_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                ticket_id INTEGER NOT NULL,
                technician_id INTEGER NOT NULL,
                logged_at TEXT NOT NULL,
                minutes REAL NOT NULL CHECK (minutes > 0),
                activity TEXT NOT NULL,
                FOREIGN KEY (ticket_id) REFERENCES tickets(id),
                FOREIGN KEY (technician_id) REFERENCES users(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS evaluations (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                ticket_id INTEGER NOT NULL UNIQUE,
                evaluator_id INTEGER NOT NULL,
                score INTEGER NOT NULL CHECK (score BETWEEN 0 AND 10),
                comment TEXT,
                evaluated_at TEXT NOT NULL,
                FOREIGN KEY (ticket_id) REFERENCES tickets(id),
                FOREIGN KEY (evaluator_id) REFERENCES users(id)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS sla_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                category TEXT NOT NULL,
                urgency TEXT NOT NULL,
                max_resolution_hours INTEGER NOT NULL,
                UNIQUE(category, urgency)
            )
        "#).execute(&mut conn)?;

        diesel::sql_query(r#"
            CREATE TABLE IF NOT EXISTS knowledge_articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                category TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                solution TEXT NOT NULL
            )
        "#).execute(&mut conn)?;

        // Create indexes
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_tickets_technician ON tickets(technician_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_history_ticket ON ticket_history(ticket_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id, is_read)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_time_logs_ticket ON time_logs(ticket_id)").execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_articles_category ON knowledge_articles(category)").execute(&mut conn)?;

        self.register_schema(&mut conn, &CURRENT_SCHEMA)?;
        Ok(())
    }

    fn register_schema(&self, conn: &mut SqliteConnection, schema: &HelpdeskSchema) -> Result<()> {
        let now = to_db_time(&Utc::now());
        let features_json = serde_json::to_string(&schema.features).unwrap_or_default();

        let new_schema = NewSchemaVersion {
            version: &schema.version_string(),
            name: schema.name,
            features: &features_json,
            introduced_at: &now,
        };

        diesel::insert_or_ignore_into(schema_versions::table)
            .values(&new_schema)
            .execute(conn)?;

        Ok(())
    }

    /// Versions this database file has been opened with, oldest first
    pub fn schema_versions(&self) -> Result<Vec<String>> {
        let mut conn = self.get_conn()?;
        let versions = schema_versions::table
            .order(schema_versions::id.asc())
            .select(schema_versions::version)
            .load::<String>(&mut conn)?;
        Ok(versions)
    }
}

/// Id of the row the last INSERT on this connection created
pub fn last_insert_id(conn: &mut SqliteConnection) -> QueryResult<i32> {
    diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
        .first(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_registered_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("helpdesk.db");
        let db = Database::open_at(&path, 2).unwrap();
        drop(db);
        let db = Database::open_at(&path, 2).unwrap();

        let versions = db.schema_versions().unwrap();
        assert_eq!(versions, vec![CURRENT_SCHEMA.version_string()]);

        let features: String = db
            .read(|conn| {
                schema_versions::table
                    .select(schema_versions::features)
                    .first(conn)
                    .map_err(DbError::from)
            })
            .unwrap();
        assert!(features.contains("\"evaluations\""));
    }

    #[test]
    fn test_db_time_round_trip() {
        let at = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 3, 9, 14, 30, 5).unwrap();
        let raw = to_db_time(&at);
        assert_eq!(raw, "2024-03-09T14:30:05.000000Z");
        assert_eq!(parse_db_time(&raw).unwrap(), at);
        assert!(matches!(parse_db_time("yesterday"), Err(DbError::Corrupt(_))));
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("h.db"), 2).unwrap();

        let result: std::result::Result<(), DbError> = db.write(|conn| {
            diesel::insert_into(skills::table)
                .values(&NewSkillRow { name: "Networking", description: None })
                .execute(conn)?;
            Err(DbError::Corrupt("abort".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .read(|conn| skills::table.count().get_result(conn).map_err(DbError::from))
            .unwrap();
        assert_eq!(count, 0);
    }
}
