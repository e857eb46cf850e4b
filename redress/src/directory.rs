//! Authority Directory: the hierarchy of handling offices
//!
//! Read-only to the engine. Built once from configuration and shared as an
//! `Arc` so tests can substitute fixtures.
//!
//! ```text
//! Ombudsman (level 2, apex)
//!     ▲ parent
//! State Utilities Board (level 1)
//!     ▲ parent
//! District Utilities Office (level 0) ◄─ peer ─► District Water Office (level 0)
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{GrievanceError, GrievanceResult};

/// Identifier of an authority (office)
pub type AuthorityId = String;

/// Identifier of a department
pub type DepartmentId = String;

/// A government office capable of owning a grievance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub id: AuthorityId,
    pub name: String,
    /// 0 is the lowest tier; increases toward the apex
    pub level: u32,
    pub department_id: DepartmentId,
    /// Next office up the escalation chain; `None` at the apex
    #[serde(default)]
    pub parent_id: Option<AuthorityId>,
    /// Geographic scope, if any
    #[serde(default)]
    pub jurisdiction: Option<String>,
    /// Office whose administrator works this office's escalated cases.
    /// Defaults to the office itself.
    #[serde(default)]
    pub admin_office_id: Option<AuthorityId>,
}

impl Authority {
    pub fn is_apex(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Shared reference to AuthorityDirectory
pub type SharedDirectory = Arc<AuthorityDirectory>;

/// Validated, read-only lookup over all authorities
#[derive(Debug, Clone, Default)]
pub struct AuthorityDirectory {
    authorities: BTreeMap<AuthorityId, Authority>,
}

impl AuthorityDirectory {
    /// Build a directory, checking the hierarchy invariants.
    ///
    /// Every `parent_id` and `admin_office_id` must resolve, `level` must be
    /// non-decreasing along each parent chain, and every chain must end at an
    /// apex.
    pub fn new(authorities: impl IntoIterator<Item = Authority>) -> GrievanceResult<Self> {
        let mut map = BTreeMap::new();
        for authority in authorities {
            if authority.id.trim().is_empty() {
                return Err(GrievanceError::config("authority id must not be empty"));
            }
            if let Some(dup) = map.insert(authority.id.clone(), authority) {
                return Err(GrievanceError::config(format!(
                    "duplicate authority id {}",
                    dup.id
                )));
            }
        }

        let directory = Self { authorities: map };
        directory.validate()?;
        Ok(directory)
    }

    /// Create a shared reference to this directory
    pub fn shared(self) -> SharedDirectory {
        Arc::new(self)
    }

    fn validate(&self) -> GrievanceResult<()> {
        for authority in self.authorities.values() {
            if let Some(admin) = &authority.admin_office_id {
                let office = self.authorities.get(admin).ok_or_else(|| {
                    GrievanceError::config(format!(
                        "authority {} names unknown admin office {}",
                        authority.id, admin
                    ))
                })?;
                if office.department_id != authority.department_id {
                    return Err(GrievanceError::config(format!(
                        "admin office {} of {} is outside department {}",
                        admin, authority.id, authority.department_id
                    )));
                }
            }

            let mut seen = HashSet::new();
            let mut current = authority;
            seen.insert(current.id.as_str());
            while let Some(parent_id) = &current.parent_id {
                let parent = self.authorities.get(parent_id).ok_or_else(|| {
                    GrievanceError::config(format!(
                        "authority {} names unknown parent {}",
                        current.id, parent_id
                    ))
                })?;
                if parent.level < current.level {
                    return Err(GrievanceError::config(format!(
                        "parent {} (level {}) sits below {} (level {})",
                        parent.id, parent.level, current.id, current.level
                    )));
                }
                if !seen.insert(parent.id.as_str()) {
                    return Err(GrievanceError::config(format!(
                        "parent chain of {} loops back to {}",
                        authority.id, parent.id
                    )));
                }
                current = parent;
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Authority> {
        self.authorities.get(id)
    }

    /// Look up an authority, failing with `UnknownAuthority`
    pub fn require(&self, id: &str) -> GrievanceResult<&Authority> {
        self.get(id).ok_or_else(|| GrievanceError::UnknownAuthority {
            authority_id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.authorities.contains_key(id)
    }

    /// Offices in the same department (any level), excluding `id` itself
    pub fn peers_of(&self, id: &str) -> Vec<&Authority> {
        let Some(authority) = self.get(id) else {
            return Vec::new();
        };
        self.authorities
            .values()
            .filter(|a| a.department_id == authority.department_id && a.id != authority.id)
            .collect()
    }

    /// Whether `target` is a lateral forwarding destination for `from`
    pub fn is_peer(&self, from: &str, target: &str) -> bool {
        match (self.get(from), self.get(target)) {
            (Some(a), Some(b)) => a.id != b.id && a.department_id == b.department_id,
            _ => false,
        }
    }

    /// Next office up the chain
    pub fn parent_of(&self, id: &str) -> Option<&Authority> {
        self.get(id)
            .and_then(|a| a.parent_id.as_deref())
            .and_then(|parent| self.get(parent))
    }

    /// Office whose administrator receives authority-response escalations
    pub fn administrator_of(&self, id: &str) -> GrievanceResult<&Authority> {
        let authority = self.require(id)?;
        match &authority.admin_office_id {
            Some(admin) => self.require(admin),
            None => Ok(authority),
        }
    }

    /// All offices of a department, lowest level first
    pub fn in_department(&self, department_id: &str) -> Vec<&Authority> {
        let mut offices: Vec<&Authority> = self
            .authorities
            .values()
            .filter(|a| a.department_id == department_id)
            .collect();
        offices.sort_by_key(|a| a.level);
        offices
    }

    pub fn len(&self) -> usize {
        self.authorities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Authority> {
        self.authorities.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn office(id: &str, level: u32, dept: &str, parent: Option<&str>) -> Authority {
        Authority {
            id: id.to_string(),
            name: format!("{id} office"),
            level,
            department_id: dept.to_string(),
            parent_id: parent.map(str::to_string),
            jurisdiction: None,
            admin_office_id: None,
        }
    }

    fn utilities() -> AuthorityDirectory {
        AuthorityDirectory::new(vec![
            office("L0", 0, "DPT-UTIL", Some("L1")),
            office("L0-WATER", 0, "DPT-UTIL", Some("L1")),
            office("L1", 1, "DPT-UTIL", Some("OMB")),
            office("OMB", 2, "DPT-UTIL", None),
            office("H0", 0, "DPT-HEALTH", None),
        ])
        .unwrap()
    }

    #[test]
    fn test_peers_stay_in_department() {
        let dir = utilities();
        let peers: Vec<&str> = dir.peers_of("L0").iter().map(|a| a.id.as_str()).collect();
        assert_eq!(peers, vec!["L0-WATER", "L1", "OMB"]);
        assert!(dir.is_peer("L0", "L0-WATER"));
        assert!(!dir.is_peer("L0", "H0"));
        assert!(!dir.is_peer("L0", "L0"));
        assert!(!dir.is_peer("L0", "NOPE"));
    }

    #[test]
    fn test_parent_chain() {
        let dir = utilities();
        assert_eq!(dir.parent_of("L0").unwrap().id, "L1");
        assert_eq!(dir.parent_of("L1").unwrap().id, "OMB");
        assert!(dir.parent_of("OMB").is_none());
        assert!(dir.get("OMB").unwrap().is_apex());
    }

    #[test]
    fn test_administrator_defaults_to_self() {
        let mut offices = vec![
            office("L0", 0, "DPT-UTIL", None),
            office("L0-ADM", 0, "DPT-UTIL", None),
        ];
        offices[0].admin_office_id = Some("L0-ADM".to_string());
        let dir = AuthorityDirectory::new(offices).unwrap();
        assert_eq!(dir.administrator_of("L0").unwrap().id, "L0-ADM");
        assert_eq!(dir.administrator_of("L0-ADM").unwrap().id, "L0-ADM");
        assert!(matches!(
            dir.administrator_of("X"),
            Err(GrievanceError::UnknownAuthority { .. })
        ));
    }

    #[test]
    fn test_rejects_decreasing_level() {
        let result = AuthorityDirectory::new(vec![
            office("A", 2, "D", Some("B")),
            office("B", 1, "D", None),
        ]);
        assert!(matches!(result, Err(GrievanceError::Config { .. })));
    }

    #[test]
    fn test_rejects_cycles_and_dangling_parents() {
        let cycle = AuthorityDirectory::new(vec![
            office("A", 1, "D", Some("B")),
            office("B", 1, "D", Some("A")),
        ]);
        assert!(matches!(cycle, Err(GrievanceError::Config { .. })));

        let dangling = AuthorityDirectory::new(vec![office("A", 0, "D", Some("GONE"))]);
        assert!(matches!(dangling, Err(GrievanceError::Config { .. })));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let result = AuthorityDirectory::new(vec![
            office("A", 0, "D", None),
            office("A", 0, "D", None),
        ]);
        assert!(result.is_err());
    }
}
