//! In-memory incident store.
//!
//! Incidents and their timeline events are the engine's shared mutable
//! state. All mutation goes through this store; the per-service dedup check
//! and the insert happen inside a single write-lock critical section so two
//! concurrent alert deliveries cannot both create an open incident for the
//! same service.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{EventKind, Incident, IncidentEvent, IncidentStatus, Severity};

/// Result of an insert attempt.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// The incident was inserted.
    Created(Incident),
    /// An open incident already existed for the service; nothing inserted.
    Deduplicated(Incident),
}

impl InsertOutcome {
    /// The stored incident, whether new or pre-existing.
    #[must_use]
    pub fn incident(&self) -> &Incident {
        match self {
            Self::Created(i) | Self::Deduplicated(i) => i,
        }
    }

    #[must_use]
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[derive(Default)]
struct StoreInner {
    incidents: HashMap<Uuid, Incident>,
    events: HashMap<Uuid, Vec<IncidentEvent>>,
}

/// Shared incident state.
#[derive(Default)]
pub struct IncidentStore {
    inner: RwLock<StoreInner>,
}

impl IncidentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an incident unless the service already has one open.
    ///
    /// "Open" means TRIGGERED or ACKNOWLEDGED. Incidents without a service
    /// are always inserted; there is nothing to dedup against.
    pub async fn insert_deduplicated(&self, incident: Incident) -> InsertOutcome {
        let mut inner = self.inner.write().await;

        if let Some(service) = incident.service {
            let existing = inner
                .incidents
                .values()
                .filter(|i| i.service == Some(service))
                .filter(|i| {
                    matches!(
                        i.status,
                        IncidentStatus::Triggered | IncidentStatus::Acknowledged
                    )
                })
                .min_by_key(|i| i.created_at);

            if let Some(existing) = existing {
                debug!(
                    incident = %existing.short_id(),
                    service = %service,
                    "Open incident already exists for service"
                );
                return InsertOutcome::Deduplicated(existing.clone());
            }
        }

        let stored = incident.clone();
        inner.incidents.insert(incident.id, incident);
        InsertOutcome::Created(stored)
    }

    /// First open incident for a service, optionally filtered by severity.
    pub async fn open_incident_for(
        &self,
        service: Uuid,
        severity: Option<Severity>,
    ) -> Option<Incident> {
        let inner = self.inner.read().await;
        inner
            .incidents
            .values()
            .filter(|i| i.service == Some(service))
            .filter(|i| {
                matches!(
                    i.status,
                    IncidentStatus::Triggered | IncidentStatus::Acknowledged
                )
            })
            .filter(|i| severity.is_none_or(|s| i.severity == s))
            .min_by_key(|i| i.created_at)
            .cloned()
    }

    /// Fetch an incident by id.
    pub async fn get(&self, id: Uuid) -> Option<Incident> {
        let inner = self.inner.read().await;
        inner.incidents.get(&id).cloned()
    }

    /// Apply a mutation to one incident.
    ///
    /// The closure returns whether it changed anything; the (possibly
    /// updated) incident and that flag are handed back.
    pub async fn update<F>(&self, id: Uuid, mutate: F) -> Option<(Incident, bool)>
    where
        F: FnOnce(&mut Incident) -> bool,
    {
        let mut inner = self.inner.write().await;
        let incident = inner.incidents.get_mut(&id)?;
        let changed = mutate(incident);
        Some((incident.clone(), changed))
    }

    /// All incidents currently in TRIGGERED status and not archived.
    pub async fn triggered_incidents(&self) -> Vec<Incident> {
        let inner = self.inner.read().await;
        inner
            .incidents
            .values()
            .filter(|i| i.status == IncidentStatus::Triggered && !i.is_archived)
            .cloned()
            .collect()
    }

    /// Resolved, unarchived incidents whose resolution is older than `cutoff`.
    pub async fn resolved_before(&self, cutoff: DateTime<Utc>) -> Vec<Incident> {
        let inner = self.inner.read().await;
        inner
            .incidents
            .values()
            .filter(|i| i.status == IncidentStatus::Resolved && !i.is_archived)
            .filter(|i| i.resolved_at.is_some_and(|t| t < cutoff))
            .cloned()
            .collect()
    }

    /// Append a timeline event.
    pub async fn append_event(
        &self,
        incident_id: Uuid,
        kind: EventKind,
        message: impl Into<String>,
        actor: Option<String>,
    ) {
        let mut inner = self.inner.write().await;
        inner.events.entry(incident_id).or_default().push(IncidentEvent {
            incident_id,
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            actor,
        });
    }

    /// Timeline events for an incident, oldest first.
    pub async fn events_for(&self, incident_id: Uuid) -> Vec<IncidentEvent> {
        let inner = self.inner.read().await;
        inner.events.get(&incident_id).cloned().unwrap_or_default()
    }

    /// Number of stored incidents.
    pub async fn len(&self) -> usize {
        self.inner.read().await.incidents.len()
    }

    /// Whether the store holds no incidents.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn incident_for(service: Option<Uuid>, severity: Severity) -> Incident {
        Incident::new(
            "High latency".to_string(),
            String::new(),
            service,
            severity,
            None,
        )
    }

    #[tokio::test]
    async fn test_insert_dedups_open_incident_per_service() {
        let store = IncidentStore::new();
        let service = Uuid::new_v4();

        let first = store
            .insert_deduplicated(incident_for(Some(service), Severity::Sev2High))
            .await;
        assert!(first.is_created());

        let second = store
            .insert_deduplicated(incident_for(Some(service), Severity::Sev2High))
            .await;
        assert!(!second.is_created());
        assert_eq!(second.incident().id, first.incident().id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_resolved_incident_does_not_block_new_one() {
        let store = IncidentStore::new();
        let service = Uuid::new_v4();

        let first = store
            .insert_deduplicated(incident_for(Some(service), Severity::Sev2High))
            .await;
        store
            .update(first.incident().id, |i| {
                i.status = IncidentStatus::Resolved;
                i.resolved_at = Some(Utc::now());
                true
            })
            .await
            .unwrap();

        let second = store
            .insert_deduplicated(incident_for(Some(service), Severity::Sev2High))
            .await;
        assert!(second.is_created());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_create_exactly_one() {
        let store = Arc::new(IncidentStore::new());
        let service = Uuid::new_v4();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .insert_deduplicated(incident_for(Some(service), Severity::Sev1Critical))
                        .await
                        .is_created()
                })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            if task.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_open_incident_severity_filter() {
        let store = IncidentStore::new();
        let service = Uuid::new_v4();
        store
            .insert_deduplicated(incident_for(Some(service), Severity::Sev3Medium))
            .await;

        assert!(store.open_incident_for(service, None).await.is_some());
        assert!(store
            .open_incident_for(service, Some(Severity::Sev3Medium))
            .await
            .is_some());
        assert!(store
            .open_incident_for(service, Some(Severity::Sev1Critical))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_events_append_in_order() {
        let store = IncidentStore::new();
        let id = Uuid::new_v4();
        store
            .append_event(id, EventKind::StatusChange, "created", None)
            .await;
        store
            .append_event(id, EventKind::Escalated, "level 1", None)
            .await;

        let events = store.events_for(id).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::StatusChange);
        assert_eq!(events[1].kind, EventKind::Escalated);
    }
}
