//! Role-based access control for lifecycle actions.
//!
//! Defines the permission table for the four actor roles and enforces the
//! queue partition between an office's handlers and its administrators.
//!
//! # Roles
//!
//! - **Citizen**: acts only on grievances they filed
//! - **AuthorityHandler**: works the general queue of their office
//! - **AuthorityAdmin**: works only the escalated queue of their office
//! - **System**: deadline-driven transitions and archival

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Action, Actor};
use crate::grievance::{Grievance, GrievanceStatus};

/// Actor role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Citizen,
    AuthorityHandler,
    AuthorityAdmin,
    System,
}

impl ActorRole {
    /// All defined roles.
    pub fn all() -> &'static [ActorRole] {
        &[
            Self::Citizen,
            Self::AuthorityHandler,
            Self::AuthorityAdmin,
            Self::System,
        ]
    }
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Citizen => write!(f, "CITIZEN"),
            Self::AuthorityHandler => write!(f, "AUTHORITY_HANDLER"),
            Self::AuthorityAdmin => write!(f, "AUTHORITY_ADMIN"),
            Self::System => write!(f, "SYSTEM"),
        }
    }
}

/// Scope within which a role may perform an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grant {
    /// Never permitted.
    Denied,
    /// Only on grievances the actor filed.
    OwnGrievance,
    /// Office members, on cases their office owns that are not escalated to
    /// the administrator.
    GeneralQueue,
    /// Office members, only on their office's AUTHORITY_ESCALATED cases.
    EscalationQueue,
    /// Office members, only on their office's closed cases.
    ClosedCases,
    /// No ownership restriction.
    Unrestricted,
}

/// Why an access check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub role: ActorRole,
    pub action: Action,
    pub reason: String,
}

/// The role × action permission table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionTable {
    grants: BTreeMap<ActorRole, BTreeMap<Action, Grant>>,
}

impl PermissionTable {
    /// Build the default permission table.
    pub fn default_table() -> Self {
        use Action::*;
        use Grant::*;

        let citizen = [
            (ProvideInfo, OwnGrievance),
            (Accept, OwnGrievance),
            (Dispute, OwnGrievance),
            (Withdraw, OwnGrievance),
        ];
        let handler = [
            (Acknowledge, GeneralQueue),
            (Assign, GeneralQueue),
            (RequestInfo, GeneralQueue),
            (Resolve, GeneralQueue),
            (Forward, GeneralQueue),
            (Escalate, GeneralQueue),
        ];
        let admin = [
            (Assign, EscalationQueue),
            (RequestInfo, EscalationQueue),
            (Resolve, EscalationQueue),
            (Forward, EscalationQueue),
            (Escalate, EscalationQueue),
            (Archive, ClosedCases),
        ];
        let system = [
            (Escalate, Unrestricted),
            (AuthorityEscalate, Unrestricted),
            (AutoClose, Unrestricted),
            (Archive, Unrestricted),
        ];

        let mut grants = BTreeMap::new();
        for (role, rules) in [
            (ActorRole::Citizen, &citizen[..]),
            (ActorRole::AuthorityHandler, &handler[..]),
            (ActorRole::AuthorityAdmin, &admin[..]),
            (ActorRole::System, &system[..]),
        ] {
            grants.insert(role, rules.iter().copied().collect());
        }
        Self { grants }
    }

    /// Grant for a role/action pair; unlisted pairs are denied.
    pub fn grant(&self, role: ActorRole, action: Action) -> Grant {
        self.grants
            .get(&role)
            .and_then(|actions| actions.get(&action))
            .copied()
            .unwrap_or(Grant::Denied)
    }

    /// Check whether `actor` may perform `action` on `grievance`.
    pub fn authorize(
        &self,
        actor: &Actor,
        action: Action,
        grievance: &Grievance,
    ) -> Result<(), AccessDenied> {
        let role = actor.role();
        let deny = |reason: String| AccessDenied {
            role,
            action,
            reason,
        };

        let office_member = |grievance: &Grievance| match actor.authority_id() {
            Some(office) if office == grievance.authority_id => Ok(()),
            Some(office) => Err(deny(format!(
                "case is owned by office {}, actor belongs to {}",
                grievance.authority_id, office
            ))),
            None => Err(deny("actor belongs to no office".to_string())),
        };

        match self.grant(role, action) {
            Grant::Denied => Err(deny(format!("{role} is never permitted to {action}"))),
            Grant::OwnGrievance => match actor.id() {
                Some(id) if id == grievance.citizen_id => Ok(()),
                _ => Err(deny("only the citizen who filed may act".to_string())),
            },
            Grant::GeneralQueue => {
                office_member(grievance)?;
                if grievance.status == GrievanceStatus::AuthorityEscalated {
                    return Err(deny(
                        "case is in the administrator's escalation queue".to_string(),
                    ));
                }
                Ok(())
            }
            Grant::EscalationQueue => {
                office_member(grievance)?;
                if grievance.status != GrievanceStatus::AuthorityEscalated {
                    return Err(deny(format!(
                        "administrators act only on AUTHORITY_ESCALATED cases, this one is {}",
                        grievance.status
                    )));
                }
                Ok(())
            }
            Grant::ClosedCases => {
                office_member(grievance)?;
                if !grievance.status.is_terminal() {
                    return Err(deny(format!("case is still open ({})", grievance.status)));
                }
                Ok(())
            }
            Grant::Unrestricted => Ok(()),
        }
    }

    /// Actions a role may ever perform.
    pub fn actions_for(&self, role: ActorRole) -> Vec<Action> {
        self.grants
            .get(&role)
            .map(|actions| {
                actions
                    .iter()
                    .filter(|(_, grant)| **grant != Grant::Denied)
                    .map(|(action, _)| *action)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for PermissionTable {
    fn default() -> Self {
        Self::default_table()
    }
}
