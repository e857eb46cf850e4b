//! Escalation Rule Resolver
//!
//! Maps (category, department) to an ordered chain of authorities with a
//! per-level SLA window. Index 0 of the chain is the initial owner.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::categorize::CategorySuggestion;
use crate::deadline::MAX_WINDOW_DAYS;
use crate::directory::{AuthorityDirectory, AuthorityId, DepartmentId, SharedDirectory};
use crate::error::{GrievanceError, GrievanceResult};
use crate::grievance::Grievance;

/// Escalation policy for one grievance category within a department
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub id: String,
    pub category: String,
    pub department_id: DepartmentId,
    /// Authority per escalation level (index = level)
    pub levels: Vec<AuthorityId>,
    /// SLA window in days, parallel to `levels`
    pub sla_days_per_level: Vec<u32>,
    /// Days the citizen has to act after an info request or a resolution
    pub citizen_response_days: u32,
}

impl EscalationRule {
    /// Highest escalation level this rule supports
    pub fn apex_level(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }
}

/// Owner and SLA for one escalation level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub authority_id: AuthorityId,
    pub sla_days: u32,
    pub level: usize,
}

/// Shared reference to RuleSet
pub type SharedRuleSet = Arc<RuleSet>;

/// Validated set of escalation rules, indexed by (category, department)
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: HashMap<(String, DepartmentId), EscalationRule>,
    directory: SharedDirectory,
}

impl RuleSet {
    /// Build a rule set, checking every rule against the directory
    pub fn new(
        rules: impl IntoIterator<Item = EscalationRule>,
        directory: SharedDirectory,
    ) -> GrievanceResult<Self> {
        let mut map = HashMap::new();
        for rule in rules {
            Self::validate_rule(&rule, &directory)?;
            let key = (rule.category.clone(), rule.department_id.clone());
            if let Some(existing) = map.insert(key, rule) {
                return Err(GrievanceError::config(format!(
                    "more than one rule for category '{}' in department {}",
                    existing.category, existing.department_id
                )));
            }
        }
        Ok(Self {
            rules: map,
            directory,
        })
    }

    /// Create a shared reference to this rule set
    pub fn shared(self) -> SharedRuleSet {
        Arc::new(self)
    }

    fn validate_rule(rule: &EscalationRule, directory: &AuthorityDirectory) -> GrievanceResult<()> {
        if rule.levels.is_empty() {
            return Err(GrievanceError::config(format!(
                "rule {} has no escalation levels",
                rule.id
            )));
        }
        if rule.levels.len() != rule.sla_days_per_level.len() {
            return Err(GrievanceError::config(format!(
                "rule {} has {} levels but {} SLA windows",
                rule.id,
                rule.levels.len(),
                rule.sla_days_per_level.len()
            )));
        }
        if rule.sla_days_per_level.contains(&0) {
            return Err(GrievanceError::config(format!(
                "rule {} has a zero-day SLA window",
                rule.id
            )));
        }
        if rule.citizen_response_days == 0 {
            return Err(GrievanceError::config(format!(
                "rule {} gives the citizen zero days to respond",
                rule.id
            )));
        }
        let longest = rule
            .sla_days_per_level
            .iter()
            .copied()
            .chain(std::iter::once(rule.citizen_response_days))
            .max()
            .unwrap_or_default();
        if longest > MAX_WINDOW_DAYS {
            return Err(GrievanceError::config(format!(
                "rule {} has a {}-day window, longer than the {}-day limit",
                rule.id, longest, MAX_WINDOW_DAYS
            )));
        }
        for authority_id in &rule.levels {
            if !directory.contains(authority_id) {
                return Err(GrievanceError::config(format!(
                    "rule {} names unknown authority {}",
                    rule.id, authority_id
                )));
            }
        }
        Ok(())
    }

    pub fn directory(&self) -> &SharedDirectory {
        &self.directory
    }

    /// Find the rule for a category within a department
    pub fn resolve(&self, category: &str, department_id: &str) -> GrievanceResult<&EscalationRule> {
        self.rules
            .get(&(category.to_string(), department_id.to_string()))
            .ok_or_else(|| GrievanceError::RuleNotFound {
                category: category.to_string(),
                department_id: department_id.to_string(),
            })
    }

    /// Rule governing an existing grievance
    pub fn rule_for(&self, grievance: &Grievance) -> GrievanceResult<&EscalationRule> {
        self.resolve(&grievance.category, &grievance.department_id)
    }

    /// Check an advisory categorization against the configured rules and
    /// directory. Returns the rule it maps to.
    ///
    /// The suggested SLA is ignored; the rule's SLA always applies.
    pub fn validate_suggestion(
        &self,
        suggestion: &CategorySuggestion,
    ) -> GrievanceResult<&EscalationRule> {
        let rule = self.resolve(&suggestion.category, &suggestion.department_id)?;
        if let Some(authority_id) = &suggestion.authority_id {
            let authority = self.directory.require(authority_id)?;
            if authority.department_id != rule.department_id {
                return Err(GrievanceError::invalid_suggestion(format!(
                    "authority {} belongs to department {}, not {}",
                    authority.id, authority.department_id, rule.department_id
                )));
            }
        }
        Ok(rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EscalationRule> {
        self.rules.values()
    }
}

/// Owner and SLA at level 0
pub fn initial_assignment(rule: &EscalationRule) -> Assignment {
    Assignment {
        authority_id: rule.levels[0].clone(),
        sla_days: rule.sla_days_per_level[0],
        level: 0,
    }
}

/// Owner and SLA one level above `current_level`.
///
/// Breaches at the apex are for manual handling and fail with
/// `NoFurtherEscalation`.
pub fn next_level_assignment(
    rule: &EscalationRule,
    grievance_id: &str,
    current_level: usize,
) -> GrievanceResult<Assignment> {
    let next = current_level + 1;
    if next >= rule.levels.len() {
        return Err(GrievanceError::NoFurtherEscalation {
            grievance_id: grievance_id.to_string(),
            rule_id: rule.id.clone(),
            level: current_level,
        });
    }
    Ok(Assignment {
        authority_id: rule.levels[next].clone(),
        sla_days: rule.sla_days_per_level[next],
        level: next,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Authority;

    fn directory() -> SharedDirectory {
        let office = |id: &str, level: u32, dept: &str, parent: Option<&str>| Authority {
            id: id.to_string(),
            name: id.to_string(),
            level,
            department_id: dept.to_string(),
            parent_id: parent.map(str::to_string),
            jurisdiction: None,
            admin_office_id: None,
        };
        AuthorityDirectory::new(vec![
            office("L0", 0, "DPT-UTIL", Some("L1")),
            office("L1", 1, "DPT-UTIL", Some("OMB")),
            office("OMB", 2, "DPT-UTIL", None),
            office("H0", 0, "DPT-HEALTH", None),
        ])
        .unwrap()
        .shared()
    }

    fn utilities_rule() -> EscalationRule {
        EscalationRule {
            id: "R-UTIL".to_string(),
            category: "Utilities".to_string(),
            department_id: "DPT-UTIL".to_string(),
            levels: vec!["L0".to_string(), "L1".to_string(), "OMB".to_string()],
            sla_days_per_level: vec![7, 7, 10],
            citizen_response_days: 5,
        }
    }

    #[test]
    fn test_resolve_and_initial_assignment() {
        let rules = RuleSet::new(vec![utilities_rule()], directory()).unwrap();
        let rule = rules.resolve("Utilities", "DPT-UTIL").unwrap();
        let first = initial_assignment(rule);
        assert_eq!(first.authority_id, "L0");
        assert_eq!(first.sla_days, 7);
        assert_eq!(first.level, 0);
    }

    #[test]
    fn test_rule_not_found() {
        let rules = RuleSet::new(vec![utilities_rule()], directory()).unwrap();
        let err = rules.resolve("Utilities", "DPT-HEALTH").unwrap_err();
        assert_eq!(err.code(), "RULE_NOT_FOUND");
    }

    #[test]
    fn test_next_level_until_apex() {
        let rule = utilities_rule();
        let l1 = next_level_assignment(&rule, "g-1", 0).unwrap();
        assert_eq!((l1.authority_id.as_str(), l1.sla_days, l1.level), ("L1", 7, 1));
        let omb = next_level_assignment(&rule, "g-1", 1).unwrap();
        assert_eq!((omb.authority_id.as_str(), omb.sla_days), ("OMB", 10));
        let err = next_level_assignment(&rule, "g-1", 2).unwrap_err();
        assert!(matches!(err, GrievanceError::NoFurtherEscalation { level: 2, .. }));
    }

    #[test]
    fn test_rejects_mismatched_sla_array() {
        let mut rule = utilities_rule();
        rule.sla_days_per_level.pop();
        assert!(RuleSet::new(vec![rule], directory()).is_err());
    }

    #[test]
    fn test_rejects_oversized_windows() {
        let mut rule = utilities_rule();
        rule.sla_days_per_level[2] = 4_000_000_000;
        let err = RuleSet::new(vec![rule], directory()).err().unwrap();
        assert_eq!(err.code(), "CONFIG_ERROR");

        let mut rule = utilities_rule();
        rule.citizen_response_days = u32::MAX;
        assert!(RuleSet::new(vec![rule], directory()).is_err());

        let mut rule = utilities_rule();
        rule.sla_days_per_level[0] = MAX_WINDOW_DAYS;
        assert!(RuleSet::new(vec![rule], directory()).is_ok());
    }

    #[test]
    fn test_rejects_unknown_authority_and_duplicates() {
        let mut rule = utilities_rule();
        rule.levels[1] = "NOWHERE".to_string();
        assert!(RuleSet::new(vec![rule], directory()).is_err());

        let dup = RuleSet::new(vec![utilities_rule(), utilities_rule()], directory());
        assert!(dup.is_err());
    }

    #[test]
    fn test_validate_suggestion() {
        let rules = RuleSet::new(vec![utilities_rule()], directory()).unwrap();
        let mut suggestion = CategorySuggestion {
            category: "Utilities".to_string(),
            department_id: "DPT-UTIL".to_string(),
            authority_id: Some("L0".to_string()),
            sla_days: Some(1),
            confidence: 0.9,
        };
        assert_eq!(rules.validate_suggestion(&suggestion).unwrap().id, "R-UTIL");

        suggestion.authority_id = Some("H0".to_string());
        assert!(matches!(
            rules.validate_suggestion(&suggestion),
            Err(GrievanceError::InvalidSuggestion { .. })
        ));

        suggestion.authority_id = Some("GHOST".to_string());
        assert!(matches!(
            rules.validate_suggestion(&suggestion),
            Err(GrievanceError::UnknownAuthority { .. })
        ));

        suggestion.category = "Potholes".to_string();
        assert!(matches!(
            rules.validate_suggestion(&suggestion),
            Err(GrievanceError::RuleNotFound { .. })
        ));
    }
}
