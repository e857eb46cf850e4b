//! Transition Engine: validation and application of lifecycle transitions
//!
//! Every transition is computed as a [`TransitionPlan`] from an immutable
//! view of the grievance, then committed in one infallible step. A rejected
//! request therefore never leaves a partial write behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::access::PermissionTable;
use super::{Action, ActionRequest, Actor, Command};
use crate::deadline::{DeadlineEvaluator, DeadlinePolicy};
use crate::directory::{AuthorityId, SharedDirectory};
use crate::error::{GrievanceError, GrievanceResult};
use crate::grievance::{
    EventType, Grievance, GrievanceEvent, GrievanceId, GrievanceStatus, NewGrievance,
};
use crate::rules::{initial_assignment, next_level_assignment, EscalationRule, SharedRuleSet};

/// How a transition changes the assigned officer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssigneeChange {
    Keep,
    Set(String),
    Clear,
}

/// A validated transition, ready to commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPlan {
    pub action: Action,
    pub event_type: EventType,
    pub from_status: GrievanceStatus,
    pub to_status: GrievanceStatus,
    /// New owning office, when ownership moves
    pub authority_id: Option<AuthorityId>,
    pub escalation_level: Option<usize>,
    pub sla_days: Option<u32>,
    pub assignee: AssigneeChange,
    /// Whether `status_since` restarts at this transition
    pub resets_clock: bool,
}

impl TransitionPlan {
    fn new(
        action: Action,
        event_type: EventType,
        from_status: GrievanceStatus,
        to_status: GrievanceStatus,
    ) -> Self {
        Self {
            action,
            event_type,
            from_status,
            to_status,
            authority_id: None,
            escalation_level: None,
            sla_days: None,
            assignee: AssigneeChange::Keep,
            resets_clock: true,
        }
    }

    fn moving_to(mut self, authority_id: AuthorityId) -> Self {
        self.authority_id = Some(authority_id);
        self.assignee = AssigneeChange::Clear;
        self
    }

    /// Whether the owning office changes
    pub fn changes_owner(&self) -> bool {
        self.authority_id.is_some()
    }
}

/// The state machine core
#[derive(Debug, Clone)]
pub struct TransitionEngine {
    rules: SharedRuleSet,
    policy: DeadlinePolicy,
    permissions: PermissionTable,
}

impl TransitionEngine {
    /// Create an engine with the default permission table
    pub fn new(rules: SharedRuleSet, policy: DeadlinePolicy) -> Self {
        Self {
            rules,
            policy,
            permissions: PermissionTable::default_table(),
        }
    }

    pub fn rules(&self) -> &SharedRuleSet {
        &self.rules
    }

    pub fn directory(&self) -> &SharedDirectory {
        self.rules.directory()
    }

    pub fn policy(&self) -> &DeadlinePolicy {
        &self.policy
    }

    /// Deadline predicates for a grievance governed by `rule`
    pub fn evaluator<'a>(&'a self, rule: &'a EscalationRule) -> DeadlineEvaluator<'a> {
        DeadlineEvaluator::new(&self.policy, rule)
    }

    /// File a new grievance.
    ///
    /// Routing comes from the rule for (category, department): level 0 owner
    /// and its SLA.
    pub fn file(
        &self,
        id: GrievanceId,
        new: NewGrievance,
        request: &ActionRequest,
        now: DateTime<Utc>,
    ) -> GrievanceResult<Grievance> {
        match &request.actor {
            Actor::Citizen { id: citizen } if *citizen == new.citizen_id => {}
            Actor::System => {}
            other => {
                return Err(GrievanceError::Unauthorized {
                    grievance_id: id,
                    action: Action::File,
                    role: other.role(),
                    reason: "grievances are filed by the citizen they concern".to_string(),
                })
            }
        }

        let rule = self.rules.resolve(&new.category, &new.department_id)?;
        let assignment = initial_assignment(rule);

        let mut attachments = new.attachments;
        for reference in &request.attachments {
            if !attachments.contains(reference) {
                attachments.push(reference.clone());
            }
        }

        let submit = GrievanceEvent {
            event_type: EventType::Submit,
            at: now,
            by_role: request.actor.role(),
            by_id: request.actor.id().map(str::to_string),
            note: request.note.clone(),
            to_authority_id: Some(assignment.authority_id.clone()),
            attachments: request.attachments.clone(),
            from_status: None,
            to_status: GrievanceStatus::Submitted,
        };

        Ok(Grievance {
            id,
            citizen_id: new.citizen_id,
            category: new.category,
            department_id: new.department_id,
            authority_id: assignment.authority_id,
            escalation_level: assignment.level,
            assignee_id: None,
            subject: new.subject,
            description: new.description,
            desired_outcome: new.desired_outcome,
            attachments,
            privacy: new.privacy,
            created_at: now,
            updated_at: now,
            status_since: now,
            sla_days: assignment.sla_days,
            status: GrievanceStatus::Submitted,
            history: vec![submit],
            version: 0,
        })
    }

    /// Validate `command` against the grievance without touching it.
    ///
    /// Checks run in a fixed order: terminal state, permissions and
    /// ownership, status precondition and deadlines, then rule routing.
    pub fn plan(
        &self,
        grievance: &Grievance,
        command: &Command,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> GrievanceResult<TransitionPlan> {
        use GrievanceStatus::*;

        let action = command.action();
        let status = grievance.status;

        if status.is_terminal() && !(action == Action::Archive && status.is_archivable()) {
            return Err(GrievanceError::TerminalStateViolation {
                grievance_id: grievance.id.clone(),
                status,
            });
        }

        self.permissions
            .authorize(actor, action, grievance)
            .map_err(|denied| GrievanceError::Unauthorized {
                grievance_id: grievance.id.clone(),
                action,
                role: denied.role,
                reason: denied.reason,
            })?;

        let invalid = |reason: String| GrievanceError::InvalidTransition {
            grievance_id: grievance.id.clone(),
            action,
            status,
            reason,
        };
        let require = |allowed: &[GrievanceStatus]| {
            if allowed.contains(&status) {
                Ok(())
            } else {
                Err(invalid(format!("allowed only from {}", join_statuses(allowed))))
            }
        };
        let actionable = [Submitted, UnderReview, Escalated, AuthorityEscalated];

        let plan = match command {
            Command::Acknowledge => {
                require(&[Submitted, Escalated])?;
                TransitionPlan::new(action, EventType::Ack, status, UnderReview)
            }
            Command::Assign { assignee_id } => {
                if assignee_id.trim().is_empty() {
                    return Err(invalid("assignee id must not be empty".to_string()));
                }
                let mut plan = TransitionPlan::new(action, EventType::Assign, status, status);
                plan.assignee = AssigneeChange::Set(assignee_id.clone());
                plan.resets_clock = false;
                plan
            }
            Command::RequestInfo => {
                require(&actionable)?;
                TransitionPlan::new(action, EventType::RequestInfo, status, InfoRequested)
            }
            Command::ProvideInfo => {
                require(&[InfoRequested])?;
                TransitionPlan::new(action, EventType::InfoProvided, status, UnderReview)
            }
            Command::Resolve => {
                require(&actionable)?;
                TransitionPlan::new(action, EventType::Resolve, status, ResolvedPendingConfirm)
            }
            Command::Accept => {
                require(&[ResolvedPendingConfirm])?;
                TransitionPlan::new(action, EventType::Accept, status, ClosedAccepted)
            }
            Command::Dispute => {
                require(&[ResolvedPendingConfirm])?;
                TransitionPlan::new(action, EventType::Dispute, status, UnderReview)
            }
            Command::Forward { to_authority_id } => {
                let target = self.directory().require(to_authority_id)?;
                if !self.directory().is_peer(&grievance.authority_id, &target.id) {
                    return Err(invalid(format!(
                        "{} is not a peer office of {} in department {}",
                        target.id, grievance.authority_id, grievance.department_id
                    )));
                }
                TransitionPlan::new(action, EventType::Forward, status, status)
                    .moving_to(target.id.clone())
            }
            Command::Escalate => {
                require(&actionable)?;
                let rule = self.rules.rule_for(grievance)?;
                let evaluator = self.evaluator(rule);
                if !evaluator.is_sla_breached(grievance, now) {
                    let remaining = evaluator
                        .days_until_sla_breach(grievance, now)
                        .unwrap_or_default();
                    return Err(invalid(format!(
                        "SLA window not breached ({remaining} day(s) remaining)"
                    )));
                }
                let next = next_level_assignment(rule, &grievance.id, grievance.escalation_level)?;
                let mut plan = TransitionPlan::new(action, EventType::Escalate, status, Escalated)
                    .moving_to(next.authority_id);
                plan.escalation_level = Some(next.level);
                plan.sla_days = Some(next.sla_days);
                plan
            }
            Command::AuthorityEscalate => {
                require(&[Submitted, UnderReview])?;
                let rule = self.rules.rule_for(grievance)?;
                if !self
                    .evaluator(rule)
                    .is_authority_response_deadline_breached(grievance, now)
                {
                    return Err(invalid(format!(
                        "authority response window of {} day(s) not breached",
                        self.policy.authority_response_days
                    )));
                }
                let admin = self.directory().administrator_of(&grievance.authority_id)?;
                TransitionPlan::new(
                    action,
                    EventType::AuthorityEscalate,
                    status,
                    AuthorityEscalated,
                )
                .moving_to(admin.id.clone())
            }
            Command::AutoClose => {
                require(&[InfoRequested, ResolvedPendingConfirm])?;
                let rule = self.rules.rule_for(grievance)?;
                if !self
                    .evaluator(rule)
                    .is_citizen_auto_close_due(grievance, now)
                {
                    return Err(invalid(format!(
                        "citizen auto-close window of {} day(s) not breached",
                        self.policy.citizen_auto_close_days(rule)
                    )));
                }
                let closed = if status == InfoRequested {
                    ClosedNoResponse
                } else {
                    ClosedAuto
                };
                TransitionPlan::new(action, EventType::AutoClose, status, closed)
            }
            Command::Withdraw => TransitionPlan::new(action, EventType::Withdraw, status, Withdrawn),
            Command::Archive => {
                if !status.is_archivable() {
                    return Err(invalid("only closed cases can be archived".to_string()));
                }
                TransitionPlan::new(action, EventType::Archive, status, Archived)
            }
        };

        Ok(plan)
    }

    /// Validate and apply `command`. On error the grievance is untouched.
    pub fn apply(
        &self,
        grievance: &mut Grievance,
        command: &Command,
        request: &ActionRequest,
        now: DateTime<Utc>,
    ) -> GrievanceResult<TransitionPlan> {
        let plan = self.plan(grievance, command, &request.actor, now)?;
        commit(grievance, &plan, request, now);
        Ok(plan)
    }
}

/// Apply a validated plan. Appends exactly one history event.
fn commit(
    grievance: &mut Grievance,
    plan: &TransitionPlan,
    request: &ActionRequest,
    now: DateTime<Utc>,
) {
    let at = grievance.next_event_time(now);

    if let Some(authority_id) = &plan.authority_id {
        grievance.authority_id = authority_id.clone();
    }
    if let Some(level) = plan.escalation_level {
        grievance.escalation_level = grievance.escalation_level.max(level);
    }
    if let Some(sla_days) = plan.sla_days {
        grievance.sla_days = sla_days;
    }
    match &plan.assignee {
        AssigneeChange::Keep => {}
        AssigneeChange::Set(assignee) => grievance.assignee_id = Some(assignee.clone()),
        AssigneeChange::Clear => grievance.assignee_id = None,
    }
    for reference in &request.attachments {
        if !grievance.attachments.contains(reference) {
            grievance.attachments.push(reference.clone());
        }
    }

    grievance.status = plan.to_status;
    if plan.resets_clock {
        grievance.status_since = at;
    }
    grievance.updated_at = at;
    grievance.history.push(GrievanceEvent {
        event_type: plan.event_type,
        at,
        by_role: request.actor.role(),
        by_id: request.actor.id().map(str::to_string),
        note: request.note.clone(),
        to_authority_id: plan.authority_id.clone(),
        attachments: request.attachments.clone(),
        from_status: Some(plan.from_status),
        to_status: plan.to_status,
    });
    grievance.version += 1;
}

fn join_statuses(statuses: &[GrievanceStatus]) -> String {
    statuses
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
