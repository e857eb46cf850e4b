//! Escalation Scheduler: deadline-driven system transitions
//!
//! [`evaluate`] is a pure function from (grievance, now) to the single system
//! transition that is due, if any. [`EscalationScheduler::tick`] applies it
//! through the same engine path actors use. The service runs ticks for every
//! open grievance under its per-record lock and folds the outcomes into a
//! [`SweepReport`].
//!
//! # Priority
//!
//! ```text
//! citizen auto-close  >  authority-response escalation  >  SLA escalation
//! ```
//!
//! At most one transition fires per grievance per sweep. Every system transition
//! restarts `status_since`, so a second sweep at the same instant finds
//! nothing due.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::deadline::{DeadlineEvaluator, DeadlinePolicy};
use crate::error::{GrievanceError, GrievanceResult};
use crate::grievance::{Grievance, GrievanceId, GrievanceStatus};
use crate::lifecycle::{Action, ActionRequest, Command, TransitionEngine, TransitionPlan};
use crate::rules::EscalationRule;

/// A transition the SYSTEM actor fires when a deadline lapses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemTransition {
    /// Citizen never responded within response window + grace
    AutoClose,
    /// Office failed to act within the authority response window
    AuthorityEscalate,
    /// Office held the case past its SLA
    Escalate,
}

impl SystemTransition {
    pub fn command(self) -> Command {
        match self {
            Self::AutoClose => Command::AutoClose,
            Self::AuthorityEscalate => Command::AuthorityEscalate,
            Self::Escalate => Command::Escalate,
        }
    }

    pub fn action(self) -> Action {
        self.command().action()
    }

    fn note(self) -> &'static str {
        match self {
            Self::AutoClose => "Closed automatically: no citizen response",
            Self::AuthorityEscalate => "Escalated to administrator: no response from office",
            Self::Escalate => "Escalated to next level: SLA window lapsed",
        }
    }
}

impl std::fmt::Display for SystemTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.action())
    }
}

/// Decide which system transition, if any, is due for `grievance` at `now`
pub fn evaluate(
    grievance: &Grievance,
    rule: &EscalationRule,
    policy: &DeadlinePolicy,
    now: DateTime<Utc>,
) -> Option<SystemTransition> {
    if grievance.is_terminal() {
        return None;
    }
    let evaluator = DeadlineEvaluator::new(policy, rule);

    if evaluator.is_citizen_auto_close_due(grievance, now) {
        return Some(SystemTransition::AutoClose);
    }
    if evaluator.is_authority_response_deadline_breached(grievance, now) {
        return Some(SystemTransition::AuthorityEscalate);
    }
    if evaluator.is_sla_breached(grievance, now) {
        return Some(SystemTransition::Escalate);
    }
    None
}

/// Result of evaluating one grievance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing due
    Idle,
    /// Citizen response window lapsed; auto-close not yet due
    CitizenOverdue { days_until_auto_close: i64 },
    /// A system transition was committed
    Transitioned {
        transition: SystemTransition,
        plan: TransitionPlan,
    },
}

/// Applies due system transitions to single grievances
#[derive(Debug, Clone)]
pub struct EscalationScheduler<'a> {
    engine: &'a TransitionEngine,
}

impl<'a> EscalationScheduler<'a> {
    pub fn new(engine: &'a TransitionEngine) -> Self {
        Self { engine }
    }

    /// Pure lookup of the due transition
    pub fn due(
        &self,
        grievance: &Grievance,
        now: DateTime<Utc>,
    ) -> GrievanceResult<Option<SystemTransition>> {
        if grievance.is_terminal() {
            return Ok(None);
        }
        let rule = self.engine.rules().rule_for(grievance)?;
        Ok(evaluate(grievance, rule, self.engine.policy(), now))
    }

    /// Evaluate and, if due, apply one system transition
    pub fn tick(&self, grievance: &mut Grievance, now: DateTime<Utc>) -> GrievanceResult<TickOutcome> {
        let Some(transition) = self.due(grievance, now)? else {
            return Ok(self.idle_outcome(grievance, now));
        };

        debug!(
            grievance_id = %grievance.id,
            status = %grievance.status,
            transition = %transition,
            "Deadline lapsed"
        );

        let request = ActionRequest::system().with_note(transition.note());
        let plan = self
            .engine
            .apply(grievance, &transition.command(), &request, now)?;
        Ok(TickOutcome::Transitioned { transition, plan })
    }

    fn idle_outcome(&self, grievance: &Grievance, now: DateTime<Utc>) -> TickOutcome {
        let Ok(rule) = self.engine.rules().rule_for(grievance) else {
            return TickOutcome::Idle;
        };
        let evaluator = self.engine.evaluator(rule);
        if evaluator.is_citizen_response_overdue(grievance, now) {
            if let Some(days) = evaluator.days_until_citizen_auto_close(grievance, now) {
                return TickOutcome::CitizenOverdue {
                    days_until_auto_close: days,
                };
            }
        }
        TickOutcome::Idle
    }
}

/// A committed system transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepTransition {
    pub grievance_id: GrievanceId,
    pub transition: SystemTransition,
    pub from: GrievanceStatus,
    pub to: GrievanceStatus,
}

/// A grievance the sweep could not move on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepIssue {
    pub grievance_id: GrievanceId,
    pub code: String,
    pub message: String,
}

/// Summary of one sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub now: DateTime<Utc>,
    pub evaluated: usize,
    pub transitions: Vec<SweepTransition>,
    /// Citizen response overdue; auto-close pending
    pub citizen_overdue: Vec<GrievanceId>,
    /// Needs administrative handling (e.g. SLA breach at the apex)
    pub manual_intervention: Vec<SweepIssue>,
    /// Unexpected per-record failures; retried next sweep
    pub failures: Vec<SweepIssue>,
}

impl SweepReport {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            evaluated: 0,
            transitions: Vec::new(),
            citizen_overdue: Vec::new(),
            manual_intervention: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Fold one grievance's result into the report
    pub fn record(&mut self, grievance_id: &str, result: GrievanceResult<TickOutcome>) {
        self.evaluated += 1;
        match result {
            Ok(TickOutcome::Idle) => {}
            Ok(TickOutcome::CitizenOverdue { .. }) => {
                self.citizen_overdue.push(grievance_id.to_string());
            }
            Ok(TickOutcome::Transitioned { transition, plan }) => {
                self.transitions.push(SweepTransition {
                    grievance_id: grievance_id.to_string(),
                    transition,
                    from: plan.from_status,
                    to: plan.to_status,
                });
            }
            Err(err) => self.record_error(grievance_id, &err),
        }
    }

    fn record_error(&mut self, grievance_id: &str, err: &GrievanceError) {
        let issue = SweepIssue {
            grievance_id: grievance_id.to_string(),
            code: err.code().to_string(),
            message: err.to_string(),
        };
        if err.needs_manual_intervention() {
            warn!(grievance_id, code = err.code(), "Needs manual intervention: {}", err);
            self.manual_intervention.push(issue);
        } else {
            warn!(grievance_id, code = err.code(), "Sweep failed for grievance: {}", err);
            self.failures.push(issue);
        }
    }

    /// Number of system transitions fired
    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_quiet(&self) -> bool {
        self.transitions.is_empty()
            && self.manual_intervention.is_empty()
            && self.failures.is_empty()
    }

    /// Get a summary for logging
    pub fn summary(&self) -> String {
        format!(
            "evaluated={} transitions={} overdue={} manual={} failures={}",
            self.evaluated,
            self.transitions.len(),
            self.citizen_overdue.len(),
            self.manual_intervention.len(),
            self.failures.len()
        )
    }
}
