//! Directory: users, skills and departments
//!
//! [`Directory`] is the read-only view the ticket workflow needs. It takes
//! the caller's connection so lookups see the same transaction as the
//! writes around them. [`UserRegistry`] owns the write side (registration,
//! login, reference data) and is only used by the presentation layer.

use crate::auth::CredentialVerifier;
use crate::clock::Clock;
use crate::db::{
    last_insert_id, to_db_time, Database, DepartmentRow, NewDepartmentRow, NewSkillRow,
    NewTechnicianSkill, NewUserRow, SkillRow, UserRow,
};
use crate::error::{HelpdeskError, Result};
use crate::model::{Department, Skill, User, UserId, UserStatus, UserType};
use crate::schema::{departments, skills, technician_skills, users};
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

pub trait Directory: Send + Sync {
    fn user_exists(&self, conn: &mut SqliteConnection, id: UserId) -> Result<bool>;

    fn get_user(&self, conn: &mut SqliteConnection, id: UserId) -> Result<Option<User>>;

    /// Technicians holding at least one skill whose name contains
    /// `category` (case-insensitive), ordered by name
    fn technicians_with_skill_match(&self, conn: &mut SqliteConnection, category: &str) -> Result<Vec<User>>;

    /// Whether any technician in the whole system has declared a skill
    fn any_technician_has_declared_skills(&self, conn: &mut SqliteConnection) -> Result<bool>;

    /// Every technician, ordered by name
    fn list_technicians(&self, conn: &mut SqliteConnection) -> Result<Vec<User>>;
}

/// [`Directory`] backed by the `users` / `skills` tables
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlDirectory;

impl Directory for SqlDirectory {
    fn user_exists(&self, conn: &mut SqliteConnection, id: UserId) -> Result<bool> {
        let count: i64 = users::table
            .filter(users::id.eq(id))
            .count()
            .get_result(conn)?;
        Ok(count > 0)
    }

    fn get_user(&self, conn: &mut SqliteConnection, id: UserId) -> Result<Option<User>> {
        let row = users::table
            .filter(users::id.eq(id))
            .select(UserRow::as_select())
            .first::<UserRow>(conn)
            .optional()?;
        Ok(row.map(User::try_from).transpose()?)
    }

    fn technicians_with_skill_match(&self, conn: &mut SqliteConnection, category: &str) -> Result<Vec<User>> {
        let needle = category.trim().to_lowercase();
        let pairs: Vec<(UserRow, String)> = users::table
            .inner_join(technician_skills::table.on(technician_skills::technician_id.eq(users::id)))
            .inner_join(skills::table.on(skills::id.eq(technician_skills::skill_id)))
            .filter(users::user_type.eq(UserType::Technician.as_str()))
            .select((UserRow::as_select(), skills::name))
            .load(conn)?;

        // distinct by id; BTreeMap keeps the (name, id) order stable
        let mut matched: BTreeMap<(String, i32), UserRow> = BTreeMap::new();
        for (row, skill_name) in pairs {
            if skill_name.to_lowercase().contains(&needle) {
                matched.entry((row.name.clone(), row.id)).or_insert(row);
            }
        }

        let technicians = matched
            .into_values()
            .map(User::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(technicians)
    }

    fn any_technician_has_declared_skills(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let count: i64 = technician_skills::table
            .inner_join(users::table.on(users::id.eq(technician_skills::technician_id)))
            .filter(users::user_type.eq(UserType::Technician.as_str()))
            .count()
            .get_result(conn)?;
        Ok(count > 0)
    }

    fn list_technicians(&self, conn: &mut SqliteConnection) -> Result<Vec<User>> {
        let rows = users::table
            .filter(users::user_type.eq(UserType::Technician.as_str()))
            .order((users::name.asc(), users::id.asc()))
            .select(UserRow::as_select())
            .load::<UserRow>(conn)?;
        let technicians = rows
            .into_iter()
            .map(User::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(technicians)
    }
}

pub fn is_valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .map(|re| re.is_match(email.trim()))
        .unwrap_or(false)
}

/// Department recorded for staff who do not pick one at registration
fn default_department(user_type: UserType) -> Option<&'static str> {
    match user_type {
        UserType::Regular => None,
        UserType::Technician => Some("IT Support"),
        UserType::Manager => Some("Management"),
        UserType::Hr => Some("Human Resources"),
    }
}

/// Registration form as handed over by the presentation layer
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub birth_date: Option<NaiveDate>,
    pub user_type: UserType,
    pub department: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub password: &'a str,
    /// Only accepted for technicians
    pub skill_ids: &'a [i32],
}

impl NewUser<'_> {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() || self.password.is_empty() {
            return Err(HelpdeskError::validation("name, email and password are required"));
        }
        if !is_valid_email(self.email) {
            return Err(HelpdeskError::validation(format!("invalid email address '{}'", self.email)));
        }
        if self.user_type == UserType::Regular
            && self.department.map_or(true, |d| d.trim().is_empty())
        {
            return Err(HelpdeskError::validation("department is required for regular users"));
        }
        if self.user_type != UserType::Technician && !self.skill_ids.is_empty() {
            return Err(HelpdeskError::validation("only technicians can declare skills"));
        }
        Ok(())
    }
}

/// Write side of the directory
#[derive(Clone)]
pub struct UserRegistry {
    db: Database,
    clock: Arc<dyn Clock>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl UserRegistry {
    pub fn new(db: Database, clock: Arc<dyn Clock>, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { db, clock, verifier }
    }

    /// Insert a user and their skill links in one transaction
    pub fn register(&self, new_user: &NewUser<'_>) -> Result<UserId> {
        new_user.validate()?;
        let credential = self.verifier.hash(new_user.password);
        let now = to_db_time(&self.clock.now());
        let birth_date = new_user.birth_date.map(|d| d.format("%Y-%m-%d").to_string());
        let department = new_user
            .department
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .or_else(|| default_department(new_user.user_type));

        let id = self.db.write(|conn| {
            let taken: i64 = users::table
                .filter(users::email.eq(new_user.email.trim()))
                .count()
                .get_result(conn)?;
            if taken > 0 {
                return Err(HelpdeskError::conflict(format!(
                    "email '{}' is already registered",
                    new_user.email.trim()
                )));
            }

            for skill_id in new_user.skill_ids {
                let known: i64 = skills::table.filter(skills::id.eq(skill_id)).count().get_result(conn)?;
                if known == 0 {
                    return Err(HelpdeskError::not_found(format!("skill {} does not exist", skill_id)));
                }
            }

            diesel::insert_into(users::table)
                .values(&NewUserRow {
                    name: new_user.name.trim(),
                    email: new_user.email.trim(),
                    birth_date: birth_date.as_deref(),
                    user_type: new_user.user_type.as_str(),
                    department,
                    phone: new_user.phone,
                    registered_at: &now,
                    status: UserStatus::Active.as_str(),
                    credential: &credential,
                })
                .execute(conn)?;
            let id = last_insert_id(conn)?;

            let mut skill_ids = new_user.skill_ids.to_vec();
            skill_ids.sort_unstable();
            skill_ids.dedup();
            for skill_id in skill_ids {
                diesel::insert_into(technician_skills::table)
                    .values(&NewTechnicianSkill { technician_id: id, skill_id })
                    .execute(conn)?;
            }
            Ok(id)
        })?;

        info!(user_id = id, user_type = %new_user.user_type, "user registered");
        Ok(id)
    }

    /// Check credentials. Every failure reads the same to the caller.
    pub fn login(
        &self,
        id: UserId,
        user_type: UserType,
        department: Option<&str>,
        password: &str,
    ) -> Result<User> {
        let invalid = || HelpdeskError::validation("invalid credentials");

        let row = self.db.read(|conn| {
            let mut query = users::table
                .filter(users::id.eq(id))
                .filter(users::user_type.eq(user_type.as_str()))
                .into_boxed();
            if user_type == UserType::Regular {
                query = query.filter(users::department.eq(department.unwrap_or_default()));
            }
            query
                .select(UserRow::as_select())
                .first::<UserRow>(conn)
                .optional()
                .map_err(HelpdeskError::from)
        })?;

        let Some(row) = row else {
            warn!(user_id = id, "login rejected: unknown user");
            return Err(invalid());
        };
        if !self.verifier.verify(password, &row.credential) {
            warn!(user_id = id, "login rejected: bad credential");
            return Err(invalid());
        }
        let user = User::try_from(row)?;
        if user.status == UserStatus::Inactive {
            warn!(user_id = id, "login rejected: inactive user");
            return Err(invalid());
        }
        Ok(user)
    }

    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.db.read(|conn| SqlDirectory.get_user(conn, id))
    }

    /// Skills a technician declared, ordered by name
    pub fn skills_of(&self, user_id: UserId) -> Result<Vec<Skill>> {
        let rows = self.db.read(|conn| {
            skills::table
                .inner_join(technician_skills::table.on(technician_skills::skill_id.eq(skills::id)))
                .filter(technician_skills::technician_id.eq(user_id))
                .order(skills::name.asc())
                .select(SkillRow::as_select())
                .load::<SkillRow>(conn)
                .map_err(HelpdeskError::from)
        })?;
        Ok(rows.into_iter().map(Skill::from).collect())
    }

    pub fn add_skill(&self, name: &str, description: Option<&str>) -> Result<i32> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HelpdeskError::validation("skill name is required"));
        }
        self.db.write(|conn| {
            let taken: i64 = skills::table.filter(skills::name.eq(name)).count().get_result(conn)?;
            if taken > 0 {
                return Err(HelpdeskError::conflict(format!("skill '{}' already exists", name)));
            }
            diesel::insert_into(skills::table)
                .values(&NewSkillRow { name, description })
                .execute(conn)?;
            Ok(last_insert_id(conn)?)
        })
    }

    pub fn list_skills(&self) -> Result<Vec<Skill>> {
        let rows = self.db.read(|conn| {
            skills::table
                .order(skills::name.asc())
                .select(SkillRow::as_select())
                .load::<SkillRow>(conn)
                .map_err(HelpdeskError::from)
        })?;
        Ok(rows.into_iter().map(Skill::from).collect())
    }

    pub fn add_department(&self, name: &str, description: Option<&str>) -> Result<i32> {
        let name = name.trim();
        if name.is_empty() {
            return Err(HelpdeskError::validation("department name is required"));
        }
        self.db.write(|conn| {
            let taken: i64 = departments::table
                .filter(departments::name.eq(name))
                .count()
                .get_result(conn)?;
            if taken > 0 {
                return Err(HelpdeskError::conflict(format!("department '{}' already exists", name)));
            }
            diesel::insert_into(departments::table)
                .values(&NewDepartmentRow { name, description })
                .execute(conn)?;
            Ok(last_insert_id(conn)?)
        })
    }

    pub fn list_departments(&self) -> Result<Vec<Department>> {
        let rows = self.db.read(|conn| {
            departments::table
                .order(departments::name.asc())
                .select(DepartmentRow::as_select())
                .load::<DepartmentRow>(conn)
                .map_err(HelpdeskError::from)
        })?;
        Ok(rows.into_iter().map(Department::from).collect())
    }
}
