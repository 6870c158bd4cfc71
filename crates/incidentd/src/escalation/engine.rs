//! Escalation engine: periodic evaluation of unacknowledged incidents
//! against their team's escalation policy.
//!
//! Evaluation is idempotent per step: a step that reached NOTIFIED is never
//! re-sent, and re-running a check only ever advances to the next step. A
//! PENDING record older than a grace window is treated as an abandoned
//! attempt (crash between row creation and dispatch) and is retried.
//!
//! Checks for one incident are serialized through a per-incident lock;
//! different incidents evaluate concurrently and independently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::incident::store::IncidentStore;
use crate::incident::{EventKind, Incident, IncidentStatus};
use crate::org::{Directory, Team};
use crate::routing::Router;

use super::{
    EscalationLog, EscalationPolicy, EscalationStep, EscalationStatus, EscalationTarget, NotifyKind,
    PolicySet,
};

/// Outcome of one escalation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationCheck {
    /// Incident not eligible (wrong status, no team, no policy, ...).
    Skipped(&'static str),
    /// The next step exists but its cumulative wait has not elapsed.
    NotDue { step: u32 },
    /// A PENDING record is in flight and still within the grace window.
    PendingInFlight,
    /// Every configured step has already been triggered.
    NoFurtherSteps,
    /// A step was dispatched (freshly, or as a retry of a stale PENDING row).
    Escalated {
        step: u32,
        notified: usize,
        targets: usize,
    },
}

/// Summary of one sweep pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub checked: usize,
    pub escalated: usize,
}

/// Walks escalation chains for open incidents.
#[derive(Clone)]
pub struct EscalationEngine {
    store: Arc<IncidentStore>,
    directory: Arc<Directory>,
    policies: Arc<PolicySet>,
    log: Arc<EscalationLog>,
    router: Arc<Router>,
    config: EngineConfig,
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl EscalationEngine {
    #[must_use]
    pub fn new(
        store: Arc<IncidentStore>,
        directory: Arc<Directory>,
        policies: Arc<PolicySet>,
        log: Arc<EscalationLog>,
        router: Arc<Router>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            directory,
            policies,
            log,
            router,
            config,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The escalation log (shared with the orchestrator for ack bookkeeping).
    #[must_use]
    pub fn log(&self) -> Arc<EscalationLog> {
        Arc::clone(&self.log)
    }

    /// Evaluate every TRIGGERED incident once. Failures for one incident
    /// never abort the sweep for the others.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let incidents = self.store.triggered_incidents().await;
        let checks = incidents
            .iter()
            .map(|incident| self.check_incident(incident.id, now));
        let results = join_all(checks).await;

        let report = SweepReport {
            checked: results.len(),
            escalated: results
                .iter()
                .filter(|r| matches!(r, EscalationCheck::Escalated { .. }))
                .count(),
        };
        info!(
            checked = report.checked,
            escalated = report.escalated,
            "Escalation sweep completed"
        );
        report
    }

    /// Check one incident and escalate if a step is due.
    pub async fn check_incident(&self, incident_id: Uuid, now: DateTime<Utc>) -> EscalationCheck {
        let lock = self.lock_for(incident_id).await;
        let _guard = lock.lock().await;

        let Some(incident) = self.store.get(incident_id).await else {
            return EscalationCheck::Skipped("incident not found");
        };

        // Only open, unacknowledged incidents escalate.
        if incident.status != IncidentStatus::Triggered || incident.is_archived {
            return EscalationCheck::Skipped("not in TRIGGERED status");
        }
        let Some(team) = incident
            .service
            .and_then(|service| self.directory.owning_team(service))
        else {
            return EscalationCheck::Skipped("no owning team");
        };
        let Some(policy) = self.policies.resolve(team.id, incident.severity) else {
            debug!(incident = %incident.short_id(), "No escalation policy found");
            return EscalationCheck::Skipped("no escalation policy");
        };

        // Reconcile a stale PENDING row before looking at the next step.
        let records = self.log.records(incident_id).await;
        if let Some(last) = records.last() {
            if last.status == EscalationStatus::Pending {
                if now - last.created_at < self.config.pending_grace() {
                    return EscalationCheck::PendingInFlight;
                }
                warn!(
                    incident = %incident.short_id(),
                    step = last.step_number,
                    "Stale PENDING escalation record, retrying dispatch"
                );
                return self
                    .dispatch_step(&incident, team, policy, last.step_number, now)
                    .await;
            }
        }

        let current_level = records.last().map_or(0, |r| r.step_number);
        let next_level = current_level + 1;
        let Some(step) = policy.step(next_level) else {
            debug!(incident = %incident.short_id(), "No more escalation steps");
            return EscalationCheck::NoFurtherSteps;
        };

        let wait = policy.cumulative_wait(step.order);
        if now - incident.detected_at < wait {
            return EscalationCheck::NotDue { step: next_level };
        }

        if !self.log.begin_step(incident_id, next_level, now).await {
            // Another evaluation recorded this step first.
            return EscalationCheck::PendingInFlight;
        }

        self.dispatch_step(&incident, team, policy, next_level, now).await
    }

    /// Resolve targets for a step, notify them, and finish the record.
    async fn dispatch_step(
        &self,
        incident: &Incident,
        team: &Team,
        policy: &EscalationPolicy,
        level: u32,
        now: DateTime<Utc>,
    ) -> EscalationCheck {
        let Some(step) = policy.step(level) else {
            self.log
                .complete_step(
                    incident.id,
                    level,
                    Vec::new(),
                    Some("escalation step no longer exists".to_string()),
                    now,
                )
                .await;
            return EscalationCheck::Skipped("step no longer configured");
        };

        let targets = self.resolve_targets(step, policy, team, now);
        let mut notified = Vec::new();

        for target in &targets {
            let report = self.router.send_escalation_alert(incident, target, level).await;
            if report.delivered_count() > 0 {
                notified.push(target.name.clone());
            } else {
                warn!(
                    incident = %incident.short_id(),
                    target = %target.name,
                    "Failed to notify escalation target"
                );
            }
        }

        let notified_count = notified.len();
        self.log
            .complete_step(incident.id, level, notified.clone(), None, now)
            .await;

        let message = if notified.is_empty() {
            format!("Escalation level {level} failed: no targets reachable")
        } else {
            format!("Escalated to level {level}. Notified: {}", notified.join(", "))
        };
        self.store
            .append_event(incident.id, EventKind::Escalated, message, None)
            .await;

        info!(
            incident = %incident.short_id(),
            level,
            notified = notified_count,
            targets = targets.len(),
            "Escalation triggered"
        );

        EscalationCheck::Escalated {
            step: level,
            notified: notified_count,
            targets: targets.len(),
        }
    }

    /// Resolve who a step notifies.
    fn resolve_targets(
        &self,
        step: &EscalationStep,
        policy: &EscalationPolicy,
        team: &Team,
        now: DateTime<Utc>,
    ) -> Vec<EscalationTarget> {
        let mut targets = Vec::new();
        let target_of = |kind: &'static str, responder: &crate::org::Responder| EscalationTarget {
            kind,
            name: responder.name.clone(),
            email: responder.email.clone(),
            phone: responder.phone.clone(),
            chat_user_id: responder.chat_user_id.clone(),
        };

        match step.notify {
            NotifyKind::User => {
                if let Some(responder) = step.target_user.and_then(|id| self.directory.responder(id))
                {
                    targets.push(target_of("user", responder));
                }
            }
            NotifyKind::Oncall => {
                if let Some(on_call) = self.directory.current_on_call(team.id, now) {
                    targets.push(target_of("oncall", on_call));
                }
            }
            NotifyKind::Team => {
                let team_id = step.target_team.unwrap_or(policy.team);
                for member in self.directory.team_members(team_id) {
                    targets.push(target_of("team_member", member));
                }
            }
            NotifyKind::Manager => {
                if let Some(manager) = self.directory.team_manager(team.id) {
                    targets.push(target_of("manager", manager));
                }
            }
        }

        targets
    }

    async fn lock_for(&self, incident_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(incident_id).or_default())
    }
}
