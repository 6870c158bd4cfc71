//! Incident model and timeline events.

pub mod orchestrator;
pub mod store;
pub mod warroom;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::org::HasLead;

/// Incident severity levels.
///
/// SEV1 and SEV2 are "critical" and trigger war-room creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Sev1Critical,
    Sev2High,
    Sev3Medium,
    Sev4Low,
}

impl Severity {
    /// Display label, e.g. `SEV1 - Critical`.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Sev1Critical => "SEV1 - Critical",
            Self::Sev2High => "SEV2 - High",
            Self::Sev3Medium => "SEV3 - Medium",
            Self::Sev4Low => "SEV4 - Low",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Incident lifecycle status.
///
/// Transitions:
/// - TRIGGERED -> ACKNOWLEDGED (sets `acknowledged_at`)
/// - ACKNOWLEDGED -> MITIGATED
/// - any non-RESOLVED -> RESOLVED (sets `resolved_at`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    Triggered,
    Acknowledged,
    Mitigated,
    Resolved,
}

impl IncidentStatus {
    /// Display label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Triggered => "Triggered",
            Self::Acknowledged => "Acknowledged",
            Self::Mitigated => "Mitigated",
            Self::Resolved => "Resolved",
        }
    }
}

/// A technical incident, from detection to resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Primary affected service. Alert-driven incidents may lack one when no
    /// rule or label identified a service.
    #[serde(default)]
    pub service: Option<Uuid>,
    pub severity: Severity,
    pub status: IncidentStatus,
    /// Person leading the response.
    #[serde(default)]
    pub lead: Option<Uuid>,
    /// Functional domains impacted (Legal, Security, PR, ...).
    #[serde(default)]
    pub impacted_scopes: Vec<Uuid>,
    /// War-room channel, when one was created.
    #[serde(default)]
    pub war_room_id: Option<String>,
    #[serde(default)]
    pub war_room_url: Option<String>,
    /// When monitoring detected the problem.
    pub detected_at: DateTime<Utc>,
    /// When the incident row was created here.
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_reminder_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_archived: bool,
}

impl Incident {
    /// Create a new TRIGGERED incident.
    #[must_use]
    pub fn new(
        title: String,
        description: String,
        service: Option<Uuid>,
        severity: Severity,
        detected_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            description,
            service,
            severity,
            status: IncidentStatus::Triggered,
            lead: None,
            impacted_scopes: Vec::new(),
            war_room_id: None,
            war_room_url: None,
            detected_at: detected_at.unwrap_or(now),
            created_at: now,
            acknowledged_at: None,
            resolved_at: None,
            last_reminder_at: None,
            is_archived: false,
        }
    }

    /// Short identifier for display (first 8 hex chars, uppercase).
    #[must_use]
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_uppercase()
    }

    /// Whether the incident is not yet resolved.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status != IncidentStatus::Resolved
    }

    /// Whether this incident warrants a war room (SEV1/SEV2).
    #[must_use]
    pub fn is_critical(&self) -> bool {
        matches!(self.severity, Severity::Sev1Critical | Severity::Sev2High)
    }

    /// Time between creation and first acknowledgment.
    #[must_use]
    pub fn mtta(&self) -> Option<Duration> {
        self.acknowledged_at.map(|t| t - self.created_at)
    }

    /// Time between creation and resolution.
    #[must_use]
    pub fn mttr(&self) -> Option<Duration> {
        self.resolved_at.map(|t| t - self.created_at)
    }
}

impl HasLead for Incident {
    fn lead(&self) -> Option<Uuid> {
        self.lead
    }
}

/// Timeline event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    StatusChange,
    Note,
    AlertSent,
    Escalated,
    Reminder,
    WarRoomCreated,
    Archived,
}

/// Audit log entry for the incident timeline.
///
/// Written explicitly by the orchestrator's transition methods and by the
/// escalation/reminder paths; there are no implicit save hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentEvent {
    pub incident_id: Uuid,
    pub kind: EventKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub actor: Option<String>,
}
