//! Automatic triage of new tickets
//!
//! Urgency comes from the SLA table, the suggested solution from the
//! knowledge base. Both sit behind traits so tests can swap them out.

use crate::error::Result;
use crate::model::Urgency;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Urgency levels that carry an SLA entry for a category
pub trait SlaLookup: Send + Sync {
    fn urgencies_for(&self, conn: &mut SqliteConnection, category: &str) -> Result<Vec<Urgency>>;
}

/// Best stored solution for a ticket description within a category
pub trait SolutionLookup: Send + Sync {
    fn best_match(&self, conn: &mut SqliteConnection, description: &str, category: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Triage {
    pub urgency: Urgency,
    pub suggestion: Option<String>,
}

#[derive(Clone)]
pub struct TriageEngine {
    sla: Arc<dyn SlaLookup>,
    solutions: Arc<dyn SolutionLookup>,
}

impl TriageEngine {
    pub fn new(sla: Arc<dyn SlaLookup>, solutions: Arc<dyn SolutionLookup>) -> Self {
        Self { sla, solutions }
    }

    /// Most severe urgency configured for the category (LOW when none is),
    /// plus the first matching knowledge-base solution.
    ///
    /// Lookup failures are returned, never swallowed into defaults.
    pub fn triage(&self, conn: &mut SqliteConnection, description: &str, category: &str) -> Result<Triage> {
        let urgency = self
            .sla
            .urgencies_for(conn, category)?
            .into_iter()
            .max_by_key(|u| u.rank())
            .unwrap_or(Urgency::Low);
        let suggestion = self.solutions.best_match(conn, description, category)?;

        debug!(category, urgency = %urgency, has_suggestion = suggestion.is_some(), "ticket triaged");
        Ok(Triage { urgency, suggestion })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HelpdeskError;
    use crate::knowledge::KnowledgeBase;
    use crate::sla::SlaRegistry;
    use crate::test_support::fixture;

    struct FixedUrgencies(Vec<Urgency>);

    impl SlaLookup for FixedUrgencies {
        fn urgencies_for(&self, _: &mut SqliteConnection, _: &str) -> Result<Vec<Urgency>> {
            Ok(self.0.clone())
        }
    }

    struct NoSolutions;

    impl SolutionLookup for NoSolutions {
        fn best_match(&self, _: &mut SqliteConnection, _: &str, _: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    struct BrokenSolutions;

    impl SolutionLookup for BrokenSolutions {
        fn best_match(&self, _: &mut SqliteConnection, _: &str, _: &str) -> Result<Option<String>> {
            Err(HelpdeskError::Infrastructure(crate::db::DbError::Connection("kb offline".into())))
        }
    }

    #[test]
    fn test_picks_most_severe_sla_urgency() {
        let fx = fixture();
        let engine = TriageEngine::new(Arc::new(SlaRegistry), Arc::new(KnowledgeBase::default()));
        // Hardware carries MEDIUM (48h) and CRITICAL (4h)
        let triage = fx
            .db
            .read(|conn| engine.triage(conn, "Laptop will not boot", "Hardware"))
            .unwrap();
        assert_eq!(triage.urgency, Urgency::Critical);
        assert_eq!(triage.suggestion, None);
    }

    #[test]
    fn test_defaults_to_low_without_sla() {
        let fx = fixture();
        let engine = TriageEngine::new(Arc::new(FixedUrgencies(vec![])), Arc::new(NoSolutions));
        let triage = fx.db.read(|conn| engine.triage(conn, "anything", "Facilities")).unwrap();
        assert_eq!(triage.urgency, Urgency::Low);
    }

    #[test]
    fn test_order_of_entries_does_not_matter() {
        let fx = fixture();
        let engine = TriageEngine::new(
            Arc::new(FixedUrgencies(vec![Urgency::High, Urgency::Low, Urgency::Medium])),
            Arc::new(NoSolutions),
        );
        let triage = fx.db.read(|conn| engine.triage(conn, "x", "y")).unwrap();
        assert_eq!(triage.urgency, Urgency::High);
    }

    #[test]
    fn test_lookup_failure_propagates() {
        let fx = fixture();
        let engine = TriageEngine::new(Arc::new(SlaRegistry), Arc::new(BrokenSolutions));
        let err = fx
            .db
            .read(|conn| engine.triage(conn, "Laptop", "Hardware"))
            .unwrap_err();
        assert_eq!(err.kind(), "infrastructure");
    }
}
