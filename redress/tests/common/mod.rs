//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use redress::{
    ActionRequest, Actor, Authority, AuthorityDirectory, DeadlinePolicy, EngineConfig,
    EscalationRule, EventBus, GrievanceService, ManualClock, MemoryStore, NewGrievance, RuleSet,
    SharedClock, SharedNotifier, SharedStore, TransitionEngine,
};

pub const CITIZEN: &str = "citizen-1";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

pub fn days(n: i64) -> Duration {
    Duration::days(n)
}

fn office(id: &str, level: u32, parent: Option<&str>) -> Authority {
    Authority {
        id: id.to_string(),
        name: id.to_string(),
        level,
        department_id: "DPT-UTIL".to_string(),
        parent_id: parent.map(str::to_string),
        jurisdiction: None,
        admin_office_id: None,
    }
}

/// L0 and L0-EAST report to L1, which reports to the ombudsman
pub fn engine() -> Arc<TransitionEngine> {
    let directory = AuthorityDirectory::new(vec![
        office("L0", 0, Some("L1")),
        office("L0-EAST", 0, Some("L1")),
        office("L1", 1, Some("OMB")),
        office("OMB", 2, None),
    ])
    .unwrap()
    .shared();
    let rules = RuleSet::new(
        vec![EscalationRule {
            id: "R-UTIL".to_string(),
            category: "Utilities".to_string(),
            department_id: "DPT-UTIL".to_string(),
            levels: vec!["L0".to_string(), "L1".to_string(), "OMB".to_string()],
            sla_days_per_level: vec![7, 7, 10],
            citizen_response_days: 5,
        }],
        directory,
    )
    .unwrap()
    .shared();
    Arc::new(TransitionEngine::new(rules, DeadlinePolicy::default()))
}

pub struct Fixture {
    pub service: GrievanceService,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub bus: Arc<EventBus>,
}

pub fn fixture() -> Fixture {
    fixture_with(EngineConfig::default())
}

pub fn fixture_with(config: EngineConfig) -> Fixture {
    let clock = ManualClock::new(t0()).shared();
    let store = MemoryStore::new().shared();
    let bus = EventBus::new().shared();
    let service = GrievanceService::new(
        engine(),
        store.clone() as SharedStore,
        bus.clone() as SharedNotifier,
        clock.clone() as SharedClock,
    )
    .with_config(config);
    Fixture {
        service,
        clock,
        store,
        bus,
    }
}

pub fn utilities_filing() -> NewGrievance {
    NewGrievance::new(CITIZEN, "No water for a week", "Supply cut since Monday")
        .with_category("Utilities", "DPT-UTIL")
}

pub fn citizen() -> ActionRequest {
    ActionRequest::new(Actor::citizen(CITIZEN))
}

pub fn handler(office: &str) -> ActionRequest {
    ActionRequest::new(Actor::handler("officer-1", office))
}

pub fn admin(office: &str) -> ActionRequest {
    ActionRequest::new(Actor::admin("admin-1", office))
}
