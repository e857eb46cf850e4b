//! Deadline Evaluator: pure window arithmetic
//!
//! Every window is anchored at a grievance's `status_since`. All comparisons
//! use `>=`: a grievance sitting exactly on its deadline is breached.
//!
//! ```text
//! status_since
//!     │── citizen_response_days ──┤ overdue (warning only)
//!     │── citizen_response_days + grace ──────────┤ auto-close
//!     │── authority_response_days ─┤ escalate to administrator
//!     │── sla_days ─────────────────────┤ escalate one level
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GrievanceError, GrievanceResult};
use crate::grievance::{Grievance, GrievanceStatus};
use crate::rules::EscalationRule;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Days an office has to act on a new or reviewed case
pub const DEFAULT_AUTHORITY_RESPONSE_DAYS: u32 = 3;

/// Grace period after the citizen response window before auto-close
pub const DEFAULT_CITIZEN_AUTO_CLOSE_GRACE_DAYS: u32 = 7;

/// Longest window any rule or policy may configure (about a century)
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Named deadline windows not carried by the escalation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadlinePolicy {
    /// Window for the office to act while SUBMITTED or UNDER_REVIEW
    pub authority_response_days: u32,
    /// Extra days after the citizen response window before SYSTEM closes
    pub citizen_auto_close_grace_days: u32,
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self {
            authority_response_days: DEFAULT_AUTHORITY_RESPONSE_DAYS,
            citizen_auto_close_grace_days: DEFAULT_CITIZEN_AUTO_CLOSE_GRACE_DAYS,
        }
    }
}

impl DeadlinePolicy {
    /// Reject policies that would collapse the two-stage citizen deadline
    pub fn validate(&self) -> GrievanceResult<()> {
        if self.authority_response_days == 0 {
            return Err(GrievanceError::config(
                "authority_response_days must be at least 1",
            ));
        }
        if self.citizen_auto_close_grace_days == 0 {
            return Err(GrievanceError::config(
                "citizen_auto_close_grace_days must be at least 1",
            ));
        }
        for (name, days) in [
            ("authority_response_days", self.authority_response_days),
            ("citizen_auto_close_grace_days", self.citizen_auto_close_grace_days),
        ] {
            if days > MAX_WINDOW_DAYS {
                return Err(GrievanceError::config(format!(
                    "{} must be at most {} days, got {}",
                    name, MAX_WINDOW_DAYS, days
                )));
            }
        }
        Ok(())
    }

    /// Total days from `status_since` until auto-close
    pub fn citizen_auto_close_days(&self, rule: &EscalationRule) -> u32 {
        rule.citizen_response_days
            .saturating_add(self.citizen_auto_close_grace_days)
    }
}

/// Instant at which a window of `window_days` starting at `since` lapses.
/// Saturates at the latest representable instant.
pub fn deadline(since: DateTime<Utc>, window_days: u32) -> DateTime<Utc> {
    since
        .checked_add_signed(Duration::days(i64::from(window_days)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `now >= since + window_days * 24h`
pub fn is_breached(since: DateTime<Utc>, window_days: u32, now: DateTime<Utc>) -> bool {
    now >= deadline(since, window_days)
}

/// `ceil((since + window_days * 24h - now) / 24h)`; negative once breached
pub fn days_remaining(since: DateTime<Utc>, window_days: u32, now: DateTime<Utc>) -> i64 {
    let millis = (deadline(since, window_days) - now).num_milliseconds();
    let whole = millis.div_euclid(MILLIS_PER_DAY);
    if millis.rem_euclid(MILLIS_PER_DAY) == 0 {
        whole
    } else {
        whole + 1
    }
}

/// Window predicates over a single grievance
#[derive(Debug, Clone, Copy)]
pub struct DeadlineEvaluator<'a> {
    policy: &'a DeadlinePolicy,
    rule: &'a EscalationRule,
}

impl<'a> DeadlineEvaluator<'a> {
    pub fn new(policy: &'a DeadlinePolicy, rule: &'a EscalationRule) -> Self {
        Self { policy, rule }
    }

    fn authority_response_applies(status: GrievanceStatus) -> bool {
        matches!(
            status,
            GrievanceStatus::Submitted | GrievanceStatus::UnderReview
        )
    }

    /// The current office has held the case past its SLA
    pub fn is_sla_breached(&self, grievance: &Grievance, now: DateTime<Utc>) -> bool {
        grievance.status.is_actionable()
            && is_breached(grievance.status_since, grievance.sla_days, now)
    }

    pub fn days_until_sla_breach(&self, grievance: &Grievance, now: DateTime<Utc>) -> Option<i64> {
        grievance
            .status
            .is_actionable()
            .then(|| days_remaining(grievance.status_since, grievance.sla_days, now))
    }

    /// The office failed to act on a SUBMITTED or UNDER_REVIEW case
    pub fn is_authority_response_deadline_breached(
        &self,
        grievance: &Grievance,
        now: DateTime<Utc>,
    ) -> bool {
        Self::authority_response_applies(grievance.status)
            && is_breached(
                grievance.status_since,
                self.policy.authority_response_days,
                now,
            )
    }

    pub fn days_until_authority_response_deadline(
        &self,
        grievance: &Grievance,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        Self::authority_response_applies(grievance.status).then(|| {
            days_remaining(
                grievance.status_since,
                self.policy.authority_response_days,
                now,
            )
        })
    }

    /// The citizen's nominal response window has lapsed
    pub fn is_citizen_response_overdue(&self, grievance: &Grievance, now: DateTime<Utc>) -> bool {
        grievance.status.awaits_citizen()
            && is_breached(grievance.status_since, self.rule.citizen_response_days, now)
    }

    pub fn days_until_citizen_response_deadline(
        &self,
        grievance: &Grievance,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        grievance.status.awaits_citizen().then(|| {
            days_remaining(grievance.status_since, self.rule.citizen_response_days, now)
        })
    }

    /// Both citizen windows have lapsed; SYSTEM closes the case
    pub fn is_citizen_auto_close_due(&self, grievance: &Grievance, now: DateTime<Utc>) -> bool {
        grievance.status.awaits_citizen()
            && is_breached(
                grievance.status_since,
                self.policy.citizen_auto_close_days(self.rule),
                now,
            )
    }

    pub fn days_until_citizen_auto_close(
        &self,
        grievance: &Grievance,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        grievance.status.awaits_citizen().then(|| {
            days_remaining(
                grievance.status_since,
                self.policy.citizen_auto_close_days(self.rule),
                now,
            )
        })
    }

    /// Snapshot of every window, for dashboards and logs
    pub fn report(&self, grievance: &Grievance, now: DateTime<Utc>) -> DeadlineReport {
        DeadlineReport {
            grievance_id: grievance.id.clone(),
            status: grievance.status,
            sla_days_remaining: self.days_until_sla_breach(grievance, now),
            authority_response_days_remaining: self
                .days_until_authority_response_deadline(grievance, now),
            citizen_response_days_remaining: self
                .days_until_citizen_response_deadline(grievance, now),
            citizen_auto_close_days_remaining: self.days_until_citizen_auto_close(grievance, now),
            citizen_response_overdue: self.is_citizen_response_overdue(grievance, now),
        }
    }
}

/// Remaining days per applicable window (`None` when a window does not apply)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineReport {
    pub grievance_id: String,
    pub status: GrievanceStatus,
    pub sla_days_remaining: Option<i64>,
    pub authority_response_days_remaining: Option<i64>,
    pub citizen_response_days_remaining: Option<i64>,
    pub citizen_auto_close_days_remaining: Option<i64>,
    pub citizen_response_overdue: bool,
}
