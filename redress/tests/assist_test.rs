//! Integration tests for assisted categorization at filing time

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use redress::categorize::CategorizeError;
use redress::{
    Categorizer, CategorySuggestion, EventBus, GrievanceError, GrievanceService, ManualClock,
    MemoryStore, NewGrievance, SharedClock, SharedNotifier, SharedStore,
};

/// Categorizer returning a canned answer
struct Canned(Result<CategorySuggestion, String>);

#[async_trait]
impl Categorizer for Canned {
    async fn suggest(&self, _filing: &NewGrievance) -> Result<CategorySuggestion, CategorizeError> {
        self.0.clone().map_err(CategorizeError::Unavailable)
    }
}

fn suggestion(category: &str, department: &str, authority: Option<&str>) -> CategorySuggestion {
    CategorySuggestion {
        category: category.to_string(),
        department_id: department.to_string(),
        authority_id: authority.map(str::to_string),
        sla_days: Some(1),
        confidence: 0.92,
    }
}

fn service(answer: Result<CategorySuggestion, String>) -> GrievanceService {
    GrievanceService::new(
        engine(),
        MemoryStore::new().shared() as SharedStore,
        EventBus::new().shared() as SharedNotifier,
        Arc::new(ManualClock::new(t0())) as SharedClock,
    )
    .with_categorizer(Arc::new(Canned(answer)))
}

fn blank_filing() -> NewGrievance {
    NewGrievance::new(CITIZEN, "Water bill doubled", "Meter reading looks wrong")
}

/// Test: a valid suggestion routes the filing, with the rule's SLA
#[tokio::test]
async fn test_valid_suggestion_routes_filing() {
    let service = service(Ok(suggestion("Utilities", "DPT-UTIL", Some("L0"))));
    let g = service
        .file_grievance_with_assist(blank_filing(), citizen())
        .await
        .unwrap();
    assert_eq!(g.category, "Utilities");
    assert_eq!(g.authority_id, "L0");
    assert_eq!(g.sla_days, 7, "suggested SLA must not override the rule");
}

/// Test: unknown category is rejected
#[tokio::test]
async fn test_unknown_category_rejected() {
    let service = service(Ok(suggestion("Astrology", "DPT-UTIL", None)));
    let err = service
        .file_grievance_with_assist(blank_filing(), citizen())
        .await
        .unwrap_err();
    assert!(matches!(err, GrievanceError::RuleNotFound { .. }));
    assert!(service.list().await.is_empty());
}

/// Test: unknown authority is rejected
#[tokio::test]
async fn test_unknown_authority_rejected() {
    let service = service(Ok(suggestion("Utilities", "DPT-UTIL", Some("MOON-BASE"))));
    let err = service
        .file_grievance_with_assist(blank_filing(), citizen())
        .await
        .unwrap_err();
    assert!(matches!(err, GrievanceError::UnknownAuthority { .. }));
}

/// Test: categorizer outage fails the filing with a typed error
#[tokio::test]
async fn test_categorizer_failure() {
    let service = service(Err("model offline".to_string()));
    let err = service
        .file_grievance_with_assist(blank_filing(), citizen())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_SUGGESTION");
}

/// Test: explicit categories skip the categorizer
#[tokio::test]
async fn test_explicit_category_skips_categorizer() {
    let service = service(Err("should not be called".to_string()));
    let g = service
        .file_grievance_with_assist(utilities_filing(), citizen())
        .await
        .unwrap();
    assert_eq!(g.department_id, "DPT-UTIL");
}
