//! Column family definitions for the RocksDB grievance store
//!
//! Current records and their audit trail live in separate column families
//! of one RocksDB instance.

/// Column family for current grievance records
pub const CF_GRIEVANCES: &str = "grievances";

/// Column family for history events, one key per event
pub const CF_HISTORY: &str = "history";

/// All column family names
pub const ALL_CFS: &[&str] = &[CF_GRIEVANCES, CF_HISTORY];

/// Key prefixes for compound keys
pub mod keys {
    /// Create a grievance key
    pub fn grievance(grievance_id: &str) -> String {
        format!("grv:{}", grievance_id)
    }

    /// Create a history key (index-based for ordering)
    pub fn history(grievance_id: &str, index: usize) -> String {
        format!("hist:{}:{:010}", grievance_id, index)
    }

    /// Prefix covering one grievance's history
    pub fn history_prefix(grievance_id: &str) -> String {
        format!("hist:{}:", grievance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_keys_sort_by_index() {
        let a = keys::history("g-1", 9);
        let b = keys::history("g-1", 10);
        assert!(a < b);
        assert!(a.starts_with(&keys::history_prefix("g-1")));
    }
}
