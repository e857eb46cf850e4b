//! Engine configuration
//!
//! Layered the usual way: `Default`, then a TOML file, then `REDRESS_*`
//! environment variables. The binary applies CLI flags last.
//!
//! The authority hierarchy and escalation rules live in their own TOML file
//! (`hierarchy_path`) so they can be versioned with the organisation chart:
//!
//! ```toml
//! [[authorities]]
//! id = "UTIL-DIST"
//! name = "District Utilities Office"
//! level = 0
//! department_id = "DPT-UTIL"
//! parent_id = "UTIL-STATE"
//!
//! [[rules]]
//! id = "R-UTIL"
//! category = "Utilities"
//! department_id = "DPT-UTIL"
//! levels = ["UTIL-DIST", "UTIL-STATE"]
//! sla_days_per_level = [7, 14]
//! citizen_response_days = 5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::deadline::DeadlinePolicy;
use crate::directory::{Authority, AuthorityDirectory, SharedDirectory};
use crate::error::GrievanceError;
use crate::rules::{EscalationRule, RuleSet, SharedRuleSet};

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Failed to parse TOML: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] GrievanceError),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Deadline sweep settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Seconds between scheduled sweeps
    pub interval_secs: u64,
    /// Grievances evaluated in parallel during one sweep
    pub max_concurrency: usize,
    /// Apply a due system transition before returning from `get`
    pub evaluate_on_read: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            max_concurrency: 16,
            evaluate_on_read: false,
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Post-commit side effect settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SideEffectConfig {
    /// Upper bound on a single persist or notify call
    pub timeout_ms: u64,
    /// Retries before a failure is dropped from the outbox
    pub max_attempts: u32,
}

impl Default for SideEffectConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_attempts: 5,
        }
    }
}

impl SideEffectConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub deadlines: DeadlinePolicy,
    pub sweep: SweepConfig,
    pub side_effects: SideEffectConfig,
    /// TOML file with `[[authorities]]` and `[[rules]]`
    pub hierarchy_path: PathBuf,
    /// RocksDB directory; used only with the `heavy-state` feature
    pub state_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deadlines: DeadlinePolicy::default(),
            sweep: SweepConfig::default(),
            side_effects: SideEffectConfig::default(),
            hierarchy_path: PathBuf::from("hierarchy.toml"),
            state_path: None,
        }
    }
}

impl EngineConfig {
    /// Parse from TOML text; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file; relative `hierarchy_path` and `state_path`
    /// resolve against the file's directory
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = read(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Create config from defaults and environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `REDRESS_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("REDRESS_HIERARCHY_PATH") {
            self.hierarchy_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("REDRESS_STATE_PATH") {
            self.state_path = Some(PathBuf::from(path));
        }
        if let Some(n) = env_parse("REDRESS_AUTHORITY_RESPONSE_DAYS") {
            self.deadlines.authority_response_days = n;
        }
        if let Some(n) = env_parse("REDRESS_CITIZEN_AUTO_CLOSE_GRACE_DAYS") {
            self.deadlines.citizen_auto_close_grace_days = n;
        }
        if let Some(n) = env_parse("REDRESS_SWEEP_INTERVAL_SECS") {
            self.sweep.interval_secs = n;
        }
        if let Some(n) = env_parse("REDRESS_SWEEP_MAX_CONCURRENCY") {
            self.sweep.max_concurrency = n;
        }
        if let Ok(val) = std::env::var("REDRESS_EVALUATE_ON_READ") {
            self.sweep.evaluate_on_read = val.to_lowercase() == "true" || val == "1";
        }
        if let Some(n) = env_parse("REDRESS_SIDE_EFFECT_TIMEOUT_MS") {
            self.side_effects.timeout_ms = n;
        }
        if let Some(n) = env_parse("REDRESS_SIDE_EFFECT_MAX_ATTEMPTS") {
            self.side_effects.max_attempts = n;
        }
    }

    /// Resolve relative paths against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.hierarchy_path.is_relative() {
            self.hierarchy_path = base.join(&self.hierarchy_path);
        }
        if let Some(state) = &self.state_path {
            if state.is_relative() {
                self.state_path = Some(base.join(state));
            }
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.deadlines.validate()?;
        if self.sweep.interval_secs == 0 {
            return Err(GrievanceError::config("sweep.interval_secs must be at least 1").into());
        }
        if self.sweep.max_concurrency == 0 {
            return Err(GrievanceError::config("sweep.max_concurrency must be at least 1").into());
        }
        if self.side_effects.timeout_ms == 0 {
            return Err(
                GrievanceError::config("side_effects.timeout_ms must be at least 1").into(),
            );
        }
        Ok(())
    }

    /// Load and validate the hierarchy file named by `hierarchy_path`
    pub fn load_hierarchy(&self) -> ConfigResult<(SharedDirectory, SharedRuleSet)> {
        HierarchyConfig::load(&self.hierarchy_path)?.build()
    }
}

/// Authorities and escalation rules as written in the hierarchy file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    #[serde(default)]
    pub authorities: Vec<Authority>,
    #[serde(default)]
    pub rules: Vec<EscalationRule>,
}

impl HierarchyConfig {
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::from_toml_str(&read(path.as_ref())?)
    }

    /// Validate into a directory and a rule set bound to it
    pub fn build(self) -> ConfigResult<(SharedDirectory, SharedRuleSet)> {
        let directory = AuthorityDirectory::new(self.authorities)?.shared();
        let rules = RuleSet::new(self.rules, directory.clone())?.shared();
        Ok((directory, rules))
    }
}

fn read(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}
