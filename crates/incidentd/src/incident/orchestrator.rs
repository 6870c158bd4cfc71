//! Incident orchestration: creation, acknowledgment, resolution.
//!
//! This is the only component that mutates incidents. Status transitions set
//! their timestamps directly and append timeline events explicitly — there
//! are no implicit save hooks. Invalid transitions are warn-and-no-op; the
//! incident is returned unchanged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::escalation::EscalationLog;
use crate::org::{Directory, Service};
use crate::routing::Router;

use super::store::{IncidentStore, InsertOutcome};
use super::warroom::WarRoomHub;
use super::{EventKind, Incident, IncidentStatus, Severity};

/// A reference to a service: by id, by unique name, or already resolved.
#[derive(Debug, Clone)]
pub enum ServiceRef {
    Id(Uuid),
    Name(String),
    Resolved(Service),
}

/// Input for incident creation.
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub title: String,
    pub description: String,
    /// Alert-driven incidents may carry no service when nothing identified
    /// one; directly created incidents should always name a service.
    pub service: Option<ServiceRef>,
    pub severity: Severity,
    /// When monitoring detected the problem; defaults to now.
    pub detected_at: Option<DateTime<Utc>>,
    pub impacted_scopes: Vec<Uuid>,
}

/// Orchestrates the incident lifecycle.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<IncidentStore>,
    directory: Arc<Directory>,
    router: Arc<Router>,
    war_room: Arc<dyn WarRoomHub>,
    escalations: Arc<EscalationLog>,
    config: EngineConfig,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        store: Arc<IncidentStore>,
        directory: Arc<Directory>,
        router: Arc<Router>,
        war_room: Arc<dyn WarRoomHub>,
        escalations: Arc<EscalationLog>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            directory,
            router,
            war_room,
            escalations,
            config,
        }
    }

    /// Create a new incident.
    ///
    /// The open-incident check and the insert run atomically per service, so
    /// concurrent creations for one service yield exactly one open incident;
    /// the existing one is returned for duplicates.
    ///
    /// With `trigger_orchestration`, war-room creation and the initial
    /// broadcast run on a background task — fire-and-continue, the caller is
    /// not blocked.
    ///
    /// # Errors
    ///
    /// `EngineError::Validation` when the title is blank or a named service
    /// cannot be resolved.
    pub async fn create_incident(
        &self,
        data: NewIncident,
        actor: Option<Uuid>,
        trigger_orchestration: bool,
    ) -> EngineResult<Incident> {
        let title = data.title.trim();
        if title.is_empty() {
            return Err(EngineError::Validation("title must not be empty".to_string()));
        }

        let service = match data.service {
            Some(service_ref) => Some(self.resolve_service(service_ref)?.id),
            None => None,
        };

        let mut incident = Incident::new(
            title.to_string(),
            data.description,
            service,
            data.severity,
            data.detected_at,
        );
        incident.lead = actor;
        incident.impacted_scopes = data.impacted_scopes;

        let incident = match self.store.insert_deduplicated(incident).await {
            InsertOutcome::Created(incident) => incident,
            InsertOutcome::Deduplicated(existing) => {
                warn!(
                    incident = %existing.short_id(),
                    "Open incident already exists for service, returning existing"
                );
                return Ok(existing);
            }
        };

        info!(incident = %incident.short_id(), title = %incident.title, "Created incident");
        self.store
            .append_event(
                incident.id,
                EventKind::StatusChange,
                format!("Incident created: {}", incident.title),
                self.actor_name(actor),
            )
            .await;

        if trigger_orchestration {
            let this = self.clone();
            let incident = incident.clone();
            tokio::spawn(async move {
                this.run_orchestration(incident).await;
            });
        }

        Ok(incident)
    }

    /// First open incident for a service, optionally severity-filtered.
    ///
    /// Best-effort guard used by the webhook path and direct creation APIs;
    /// the hard guarantee lives in the store's atomic dedup-insert.
    pub async fn deduplicate_check(
        &self,
        service: Uuid,
        severity: Option<Severity>,
    ) -> Option<Incident> {
        self.store.open_incident_for(service, severity).await
    }

    /// Acknowledge a TRIGGERED incident.
    ///
    /// Not-TRIGGERED incidents are returned unchanged with a warning.
    /// The actor becomes lead if none is set, and the newest NOTIFIED
    /// escalation record is marked acknowledged.
    pub async fn acknowledge_incident(&self, id: Uuid, actor: Option<Uuid>) -> Option<Incident> {
        let now = Utc::now();
        let (incident, changed) = self
            .store
            .update(id, |incident| {
                if incident.status != IncidentStatus::Triggered {
                    warn!(
                        incident = %incident.short_id(),
                        status = incident.status.label(),
                        "Incident is not in TRIGGERED status, acknowledge is a no-op"
                    );
                    return false;
                }
                incident.status = IncidentStatus::Acknowledged;
                incident.acknowledged_at = Some(now);
                if incident.lead.is_none() {
                    incident.lead = actor;
                }
                true
            })
            .await?;

        if changed {
            let actor_name = self.actor_name(actor);
            self.store
                .append_event(
                    id,
                    EventKind::StatusChange,
                    format!(
                        "Incident acknowledged by {}",
                        actor_name.as_deref().unwrap_or("system")
                    ),
                    actor_name,
                )
                .await;
            self.escalations.acknowledge_latest(id, actor, now).await;
            info!(incident = %incident.short_id(), "Incident acknowledged");
        }

        Some(incident)
    }

    /// Resolve an incident.
    ///
    /// Already-RESOLVED incidents are returned unchanged with a warning;
    /// `resolved_at` is never overwritten. Resolution schedules the delayed
    /// war-room archive.
    pub async fn resolve_incident(
        &self,
        id: Uuid,
        actor: Option<Uuid>,
        resolution_note: &str,
    ) -> Option<Incident> {
        let now = Utc::now();
        let (incident, changed) = self
            .store
            .update(id, |incident| {
                if incident.status == IncidentStatus::Resolved {
                    warn!(
                        incident = %incident.short_id(),
                        "Incident already resolved, resolve is a no-op"
                    );
                    return false;
                }
                incident.status = IncidentStatus::Resolved;
                incident.resolved_at = Some(now);
                true
            })
            .await?;

        if changed {
            let actor_name = self.actor_name(actor);
            let mut message = format!(
                "Incident resolved by {}",
                actor_name.as_deref().unwrap_or("system")
            );
            if !resolution_note.is_empty() {
                message.push_str(": ");
                message.push_str(resolution_note);
            }
            self.store
                .append_event(id, EventKind::StatusChange, message, actor_name)
                .await;
            info!(incident = %incident.short_id(), "Incident resolved");

            if let Some(war_room_id) = incident.war_room_id.clone() {
                self.schedule_war_room_archive(incident.short_id(), war_room_id);
            }
        }

        Some(incident)
    }

    /// Background setup after creation: war room for critical incidents,
    /// then the initial broadcast.
    async fn run_orchestration(&self, incident: Incident) {
        let mut incident = incident;

        if incident.is_critical() {
            match self.war_room.create_war_room(&incident).await {
                Some((room_id, room_url)) => {
                    if let Some((updated, _)) = self
                        .store
                        .update(incident.id, |i| {
                            i.war_room_id = Some(room_id.clone());
                            i.war_room_url = Some(room_url.clone());
                            true
                        })
                        .await
                    {
                        incident = updated;
                    }
                    self.store
                        .append_event(
                            incident.id,
                            EventKind::WarRoomCreated,
                            format!("War Room created: {room_url}"),
                            None,
                        )
                        .await;
                }
                None => {
                    warn!(incident = %incident.short_id(), "War Room creation failed or disabled");
                }
            }
        }

        let report = self.router.broadcast(&incident).await;
        if !report.is_empty() {
            self.store
                .append_event(
                    incident.id,
                    EventKind::AlertSent,
                    format!(
                        "Notifications broadcast: {} delivered, {} failed",
                        report.delivered_count(),
                        report.failed_count()
                    ),
                    None,
                )
                .await;
        }
    }

    /// Archive the war room a fixed interval after resolution, giving time
    /// for post-incident discussion. Best-effort.
    fn schedule_war_room_archive(&self, short_id: String, war_room_id: String) {
        let hub = Arc::clone(&self.war_room);
        let delay = self.config.war_room_archive_delay;
        info!(
            incident = %short_id,
            delay_secs = delay.as_secs(),
            "Scheduled War Room archive"
        );
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if hub.archive_war_room(&war_room_id).await {
                info!(incident = %short_id, war_room_id = %war_room_id, "War Room archived");
            } else {
                warn!(incident = %short_id, war_room_id = %war_room_id, "War Room archive failed");
            }
        });
    }

    fn resolve_service(&self, service_ref: ServiceRef) -> EngineResult<Service> {
        match service_ref {
            ServiceRef::Resolved(service) => Ok(service),
            ServiceRef::Id(id) => self.directory.service(id).cloned().ok_or_else(|| {
                EngineError::Validation(format!("Service not found: {id}"))
            }),
            ServiceRef::Name(name) => {
                if let Some(service) = self.directory.service_by_name(&name) {
                    return Ok(service.clone());
                }
                // API callers sometimes pass the id as a string.
                if let Ok(id) = name.parse::<Uuid>() {
                    if let Some(service) = self.directory.service(id) {
                        return Ok(service.clone());
                    }
                }
                Err(EngineError::Validation(format!("Service not found: {name}")))
            }
        }
    }

    fn actor_name(&self, actor: Option<Uuid>) -> Option<String> {
        actor.map(|id| {
            self.directory
                .responder(id)
                .map_or_else(|| id.to_string(), |r| r.name.clone())
        })
    }
}
