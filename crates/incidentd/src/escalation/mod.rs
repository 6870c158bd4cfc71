//! Escalation policies, per-incident escalation records, and the engine that
//! walks the chain.

pub mod engine;

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::incident::Severity;

/// Who an escalation step notifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    /// A specific user.
    User,
    /// The team's current on-call.
    Oncall,
    /// Every team member.
    Team,
    /// The team's manager.
    Manager,
}

/// One tier of an escalation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationStep {
    /// Position in the chain, starting at 1.
    pub order: u32,
    /// Additional wait relative to the previous step, in minutes.
    #[serde(default)]
    pub delay_minutes: i64,
    pub notify: NotifyKind,
    /// Target user when `notify` is `user`.
    #[serde(default)]
    pub target_user: Option<Uuid>,
    /// Target team when `notify` is `team`; defaults to the policy's team.
    #[serde(default)]
    pub target_team: Option<Uuid>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Escalation rules for a team, optionally scoped to one severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub id: Uuid,
    pub name: String,
    pub team: Uuid,
    /// Only apply to this severity; `None` makes this the team default.
    #[serde(default)]
    pub severity_filter: Option<Severity>,
    /// Minutes before the first step if not acknowledged.
    #[serde(default)]
    pub initial_delay_minutes: i64,
    pub steps: Vec<EscalationStep>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl EscalationPolicy {
    /// The active step at a given order.
    #[must_use]
    pub fn step(&self, order: u32) -> Option<&EscalationStep> {
        self.steps.iter().find(|s| s.order == order && s.is_active)
    }

    /// Cumulative wait before a step fires, measured from detection:
    /// the policy's initial delay plus the delays of every active step up to
    /// and including this one.
    ///
    /// For initial delay 0 and steps [5, 10, 15] the chain fires at
    /// T+5, T+15, T+30.
    #[must_use]
    pub fn cumulative_wait(&self, order: u32) -> Duration {
        let minutes: i64 = self.initial_delay_minutes
            + self
                .steps
                .iter()
                .filter(|s| s.is_active && s.order <= order)
                .map(|s| s.delay_minutes)
                .sum::<i64>();
        Duration::minutes(minutes)
    }
}

/// All configured policies.
///
/// Resolution prefers a policy scoped to the incident's exact severity, then
/// falls back to the team's severity-agnostic default.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: Vec<EscalationPolicy>,
}

impl PolicySet {
    #[must_use]
    pub fn new(policies: Vec<EscalationPolicy>) -> Self {
        Self { policies }
    }

    /// The applicable policy for a team and severity, if any.
    #[must_use]
    pub fn resolve(&self, team: Uuid, severity: Severity) -> Option<&EscalationPolicy> {
        self.policies
            .iter()
            .filter(|p| p.is_active && p.team == team)
            .find(|p| p.severity_filter == Some(severity))
            .or_else(|| {
                self.policies
                    .iter()
                    .filter(|p| p.is_active && p.team == team)
                    .find(|p| p.severity_filter.is_none())
            })
    }
}

/// Lifecycle of one triggered escalation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationStatus {
    Pending,
    Notified,
    Acknowledged,
    Failed,
}

/// One row per triggered step per incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub incident_id: Uuid,
    pub step_number: u32,
    pub status: EscalationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub notified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub acknowledged_by: Option<Uuid>,
    /// Display names of the targets that were reached.
    #[serde(default)]
    pub notified: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A resolved notification target for one escalation step.
#[derive(Debug, Clone)]
pub struct EscalationTarget {
    pub kind: &'static str,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub chat_user_id: Option<String>,
}

/// Per-incident escalation history.
///
/// Step numbers are strictly increasing per incident, and a step that reached
/// NOTIFIED or later is never re-created — re-running a check only ever
/// advances to the next step.
#[derive(Default)]
pub struct EscalationLog {
    inner: RwLock<HashMap<Uuid, Vec<EscalationRecord>>>,
}

impl EscalationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All records for an incident, in step order.
    pub async fn records(&self, incident_id: Uuid) -> Vec<EscalationRecord> {
        self.inner
            .read()
            .await
            .get(&incident_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Highest step number recorded for an incident (0 if none).
    pub async fn current_level(&self, incident_id: Uuid) -> u32 {
        self.inner
            .read()
            .await
            .get(&incident_id)
            .and_then(|records| records.last())
            .map_or(0, |r| r.step_number)
    }

    /// Create a PENDING record for a step. Returns `false` (and records
    /// nothing) if a record for this or a later step already exists.
    pub async fn begin_step(&self, incident_id: Uuid, step_number: u32, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.write().await;
        let records = inner.entry(incident_id).or_default();
        if records.last().is_some_and(|r| r.step_number >= step_number) {
            return false;
        }
        records.push(EscalationRecord {
            incident_id,
            step_number,
            status: EscalationStatus::Pending,
            created_at: now,
            notified_at: None,
            acknowledged_at: None,
            acknowledged_by: None,
            notified: Vec::new(),
            error: None,
        });
        true
    }

    /// Finish a PENDING step: NOTIFIED when at least one target was reached,
    /// FAILED otherwise.
    pub async fn complete_step(
        &self,
        incident_id: Uuid,
        step_number: u32,
        notified: Vec<String>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) {
        let mut inner = self.inner.write().await;
        let Some(record) = inner
            .get_mut(&incident_id)
            .and_then(|records| records.iter_mut().find(|r| r.step_number == step_number))
        else {
            return;
        };
        if notified.is_empty() {
            record.status = EscalationStatus::Failed;
            record.error = error.or_else(|| Some("failed to notify any targets".to_string()));
        } else {
            record.status = EscalationStatus::Notified;
            record.notified_at = Some(now);
            record.notified = notified;
        }
    }

    /// Mark the newest NOTIFIED record acknowledged.
    pub async fn acknowledge_latest(
        &self,
        incident_id: Uuid,
        by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.get_mut(&incident_id).and_then(|records| {
            records
                .iter_mut()
                .rev()
                .find(|r| r.status == EscalationStatus::Notified)
        }) else {
            return false;
        };
        record.status = EscalationStatus::Acknowledged;
        record.acknowledged_at = Some(now);
        record.acknowledged_by = by;
        true
    }
}
