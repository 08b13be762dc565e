//! Service-level table: (category, urgency) -> maximum resolution hours

use crate::db::{NewSlaRow, SlaRow};
use crate::error::{HelpdeskError, Result};
use crate::model::{SlaEntry, Urgency};
use crate::schema::sla_entries;
use crate::triage::SlaLookup;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

/// SQL-backed SLA table. Stateless; every call works on the caller's
/// connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct SlaRegistry;

impl SlaRegistry {
    /// All entries ordered by category, then urgency rank
    pub fn list(&self, conn: &mut SqliteConnection) -> Result<Vec<SlaEntry>> {
        let rows = sla_entries::table
            .order(sla_entries::category.asc())
            .select(SlaRow::as_select())
            .load::<SlaRow>(conn)?;
        let mut entries = rows
            .into_iter()
            .map(SlaEntry::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then(a.urgency.rank().cmp(&b.urgency.rank()))
        });
        Ok(entries)
    }

    /// Insert or replace the entry for `(category, urgency)`
    pub fn upsert(
        &self,
        conn: &mut SqliteConnection,
        category: &str,
        urgency: Urgency,
        max_resolution_hours: i32,
    ) -> Result<()> {
        let category = category.trim();
        if category.is_empty() {
            return Err(HelpdeskError::validation("SLA category is required"));
        }
        if max_resolution_hours <= 0 {
            return Err(HelpdeskError::validation(format!(
                "invalid SLA of {} hours: must be positive",
                max_resolution_hours
            )));
        }

        diesel::insert_into(sla_entries::table)
            .values(&NewSlaRow {
                category,
                urgency: urgency.as_str(),
                max_resolution_hours,
            })
            .on_conflict((sla_entries::category, sla_entries::urgency))
            .do_update()
            .set(sla_entries::max_resolution_hours.eq(max_resolution_hours))
            .execute(conn)?;
        Ok(())
    }

    /// Remove the entry; `false` when there was none
    pub fn delete(&self, conn: &mut SqliteConnection, category: &str, urgency: Urgency) -> Result<bool> {
        let removed = diesel::delete(
            sla_entries::table
                .filter(sla_entries::category.eq(category.trim()))
                .filter(sla_entries::urgency.eq(urgency.as_str())),
        )
        .execute(conn)?;
        Ok(removed > 0)
    }

    /// Distinct categories with at least one entry
    pub fn categories(&self, conn: &mut SqliteConnection) -> Result<Vec<String>> {
        let categories = sla_entries::table
            .select(sla_entries::category)
            .distinct()
            .order(sla_entries::category.asc())
            .load::<String>(conn)?;
        Ok(categories)
    }

    /// Hours allowed for `(category, urgency)`, if configured
    pub fn max_hours(&self, conn: &mut SqliteConnection, category: &str, urgency: Urgency) -> Result<Option<i32>> {
        let hours = sla_entries::table
            .filter(sla_entries::category.eq(category))
            .filter(sla_entries::urgency.eq(urgency.as_str()))
            .select(sla_entries::max_resolution_hours)
            .first::<i32>(conn)
            .optional()?;
        Ok(hours)
    }
}

impl SlaLookup for SlaRegistry {
    fn urgencies_for(&self, conn: &mut SqliteConnection, category: &str) -> Result<Vec<Urgency>> {
        let raw = sla_entries::table
            .filter(sla_entries::category.eq(category))
            .select(sla_entries::urgency)
            .load::<String>(conn)?;
        raw.iter()
            .map(|u| {
                u.parse::<Urgency>()
                    .map_err(|e| HelpdeskError::Infrastructure(crate::db::DbError::Corrupt(e)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture;

    #[test]
    fn test_upsert_replaces_hours() {
        let fx = fixture();
        fx.db
            .write(|conn| {
                SlaRegistry.upsert(conn, "Printer", Urgency::Low, 72)?;
                SlaRegistry.upsert(conn, "Printer", Urgency::Low, 24)
            })
            .unwrap();

        let hours = fx
            .db
            .read(|conn| SlaRegistry.max_hours(conn, "Printer", Urgency::Low))
            .unwrap();
        assert_eq!(hours, Some(24));
    }

    #[test]
    fn test_list_orders_by_category_then_rank() {
        let fx = fixture();
        let entries = fx.db.read(|conn| SlaRegistry.list(conn)).unwrap();
        let keys: Vec<_> = entries
            .iter()
            .map(|e| (e.category.as_str(), e.urgency))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Hardware", Urgency::Medium),
                ("Hardware", Urgency::Critical),
                ("Network", Urgency::High),
            ]
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        let fx = fixture();
        let err = fx
            .db
            .write(|conn| SlaRegistry.upsert(conn, "Printer", Urgency::Low, 0))
            .unwrap_err();
        assert!(matches!(err, HelpdeskError::Validation(_)));
        let err = fx
            .db
            .write(|conn| SlaRegistry.upsert(conn, "  ", Urgency::Low, 4))
            .unwrap_err();
        assert!(matches!(err, HelpdeskError::Validation(_)));
    }

    #[test]
    fn test_delete_and_categories() {
        let fx = fixture();
        let removed = fx
            .db
            .write(|conn| SlaRegistry.delete(conn, "Network", Urgency::High))
            .unwrap();
        assert!(removed);
        let again = fx
            .db
            .write(|conn| SlaRegistry.delete(conn, "Network", Urgency::High))
            .unwrap();
        assert!(!again);

        let categories = fx.db.read(|conn| SlaRegistry.categories(conn)).unwrap();
        assert_eq!(categories, vec!["Hardware".to_string()]);
    }
}
