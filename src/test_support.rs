//! Shared fixture for unit tests: a temporary database with a requester,
//! two technicians, a manager, two skills and three SLA rows.

use crate::auth::SaltedSha256;
use crate::clock::FixedClock;
use crate::config::TriageConfig;
use crate::db::Database;
use crate::directory::{NewUser, UserRegistry};
use crate::lifecycle::ServiceDesk;
use crate::model::{Urgency, UserId, UserType};
use crate::sla::SlaRegistry;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

pub(crate) fn new_user(
    name: &'static str,
    email: &'static str,
    user_type: UserType,
    password: &'static str,
) -> NewUser<'static> {
    NewUser {
        name,
        email,
        birth_date: None,
        user_type,
        department: None,
        phone: None,
        password,
        skill_ids: &[],
    }
}

pub(crate) struct Fixture {
    _dir: TempDir,
    pub db: Database,
    pub clock: Arc<FixedClock>,
    pub registry: UserRegistry,
    pub desk: ServiceDesk,
    /// Ana, REGULAR in Finance
    pub requester: UserId,
    /// Bruno, skill "Hardware Repair"
    pub tech_hw: UserId,
    /// Diego, skill "Networking"
    pub tech_net: UserId,
    /// Marta
    pub manager: UserId,
}

impl Fixture {
    /// A second desk on the same database, customised by `f`
    pub fn desk_with(&self, f: impl FnOnce(ServiceDesk) -> ServiceDesk) -> ServiceDesk {
        f(ServiceDesk::new(self.db.clone(), self.clock.clone(), &TriageConfig::default()))
    }
}

pub(crate) fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let db = Database::open_at(dir.path().join("helpdesk.db"), 2).unwrap();
    let clock = Arc::new(FixedClock::new(start_time()));
    let registry = UserRegistry::new(db.clone(), clock.clone(), Arc::new(SaltedSha256));

    let hardware = registry.add_skill("Hardware Repair", None).unwrap();
    let networking = registry.add_skill("Networking", Some("LAN, Wi-Fi and VPN")).unwrap();

    let requester = registry
        .register(&NewUser {
            department: Some("Finance"),
            ..new_user("Ana", "ana@example.com", UserType::Regular, "ana-pw")
        })
        .unwrap();
    let tech_hw = registry
        .register(&NewUser {
            skill_ids: &[hardware],
            ..new_user("Bruno", "bruno@example.com", UserType::Technician, "bruno-pw")
        })
        .unwrap();
    let tech_net = registry
        .register(&NewUser {
            skill_ids: &[networking],
            ..new_user("Diego", "diego@example.com", UserType::Technician, "diego-pw")
        })
        .unwrap();
    let manager = registry
        .register(&new_user("Marta", "marta@example.com", UserType::Manager, "marta-pw"))
        .unwrap();

    db.write(|conn| {
        SlaRegistry.upsert(conn, "Hardware", Urgency::Medium, 48)?;
        SlaRegistry.upsert(conn, "Hardware", Urgency::Critical, 4)?;
        SlaRegistry.upsert(conn, "Network", Urgency::High, 8)
    })
    .unwrap();

    let desk = ServiceDesk::new(db.clone(), clock.clone(), &TriageConfig::default());

    Fixture {
        _dir: dir,
        db,
        clock,
        registry,
        desk,
        requester,
        tech_hw,
        tech_net,
        manager,
    }
}
