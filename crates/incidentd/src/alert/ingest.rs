//! Alert ingestion: dedup, rule matching, and incident creation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::incident::orchestrator::{NewIncident, Orchestrator, ServiceRef};
use crate::org::Directory;

use super::fingerprint::{FiringDisposition, FingerprintStore};
use super::rules::{service_name_from_labels, severity_from_label, CompiledRule, RuleSet};
use super::{AlertPayload, AlertState};

/// What happened to a processed alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestAction {
    /// First firing of this identity.
    Created,
    /// Repeat firing outside the suppression window.
    Updated,
    /// Repeat firing inside the suppression window.
    Suppressed,
    /// Resolution of a known identity.
    Resolved,
    /// Resolution of an unknown identity (logged, not fatal).
    Ignored,
}

/// Per-alert processing report, returned to the webhook layer.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub action: IngestAction,
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fire_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// Ingests normalized alerts.
#[derive(Clone)]
pub struct AlertIngestor {
    fingerprints: Arc<FingerprintStore>,
    rules: Arc<RuleSet>,
    orchestrator: Arc<Orchestrator>,
    directory: Arc<Directory>,
    config: EngineConfig,
}

impl AlertIngestor {
    #[must_use]
    pub fn new(
        fingerprints: Arc<FingerprintStore>,
        rules: Arc<RuleSet>,
        orchestrator: Arc<Orchestrator>,
        directory: Arc<Directory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            fingerprints,
            rules,
            orchestrator,
            directory,
            config,
        }
    }

    /// Process one normalized alert.
    pub async fn process(&self, payload: &AlertPayload) -> IngestReport {
        self.process_at(payload, Utc::now()).await
    }

    /// Process with an explicit clock (tests drive synthetic time).
    pub async fn process_at(&self, payload: &AlertPayload, now: DateTime<Utc>) -> IngestReport {
        match payload.status {
            AlertState::Resolved => self.handle_resolved(payload, now).await,
            AlertState::Firing => self.handle_firing(payload, now).await,
        }
    }

    async fn handle_firing(&self, payload: &AlertPayload, now: DateTime<Utc>) -> IngestReport {
        let rule = self
            .rules
            .first_match(&payload.alert_name, &payload.labels, payload.source);

        let suppress_window = rule
            .and_then(|r| r.rule.suppress_duplicates_minutes)
            .map_or_else(
                || self.config.suppress_window(),
                |minutes| Duration::minutes(minutes as i64),
            );
        let auto_create = rule.is_none_or(|r| r.rule.auto_create);

        let observation = self
            .fingerprints
            .observe_firing(payload, suppress_window, auto_create, now)
            .await;

        if observation.disposition == FiringDisposition::Suppressed {
            info!(alert = %payload.alert_name, "Alert suppressed (duplicate)");
            return IngestReport {
                action: IngestAction::Suppressed,
                fingerprint: observation.record.fingerprint,
                fire_count: None,
                incident_id: observation.record.incident_id,
                reason: None,
            };
        }

        let mut incident_id = observation.record.incident_id;
        if observation.record.auto_create_incident && incident_id.is_none() {
            match self.create_incident_from_alert(payload, rule).await {
                Some(id) => {
                    self.fingerprints
                        .attach_incident(&observation.record.fingerprint, id)
                        .await;
                    incident_id = Some(id);
                }
                None => {
                    warn!(alert = %payload.alert_name, "No incident created for firing alert");
                }
            }
        }

        IngestReport {
            action: if observation.disposition == FiringDisposition::New {
                IngestAction::Created
            } else {
                IngestAction::Updated
            },
            fingerprint: observation.record.fingerprint,
            fire_count: Some(observation.record.fire_count),
            incident_id,
            reason: None,
        }
    }

    async fn handle_resolved(&self, payload: &AlertPayload, now: DateTime<Utc>) -> IngestReport {
        let Some(record) = self.fingerprints.observe_resolved(payload, now).await else {
            // Defensive: a resolve without a prior fire is logged, not fatal.
            warn!(alert = %payload.alert_name, "Resolved alert without prior firing");
            return IngestReport {
                action: IngestAction::Ignored,
                fingerprint: super::fingerprint::compute_fingerprint(
                    payload.source,
                    &payload.alert_name,
                    &payload.labels,
                ),
                fire_count: None,
                incident_id: None,
                reason: Some("no_matching_alert"),
            };
        };

        if let Some(incident_id) = record.incident_id {
            let rule = self
                .rules
                .first_match(&payload.alert_name, &payload.labels, payload.source);
            if rule.is_some_and(|r| r.rule.auto_resolve) {
                info!(alert = %payload.alert_name, "Auto-resolving incident: source alert resolved");
                let _ = self
                    .orchestrator
                    .resolve_incident(incident_id, None, "source alert resolved")
                    .await;
            }
        }

        IngestReport {
            action: IngestAction::Resolved,
            fingerprint: record.fingerprint,
            fire_count: Some(record.fire_count),
            incident_id: record.incident_id,
            reason: None,
        }
    }

    /// Create an incident from a firing alert, applying the matched rule or
    /// the built-in label heuristics.
    async fn create_incident_from_alert(
        &self,
        payload: &AlertPayload,
        rule: Option<&CompiledRule>,
    ) -> Option<Uuid> {
        let severity = rule.map_or_else(
            || severity_from_label(payload.severity_label()),
            |r| r.rule.severity_for(&payload.labels),
        );

        let service = rule
            .and_then(|r| r.rule.target_service)
            .map(ServiceRef::Id)
            .or_else(|| {
                service_name_from_labels(&payload.labels)
                    .and_then(|name| self.directory.service_by_name_ci(name))
                    .map(|s| ServiceRef::Id(s.id))
            });
        if service.is_none() {
            warn!(alert = %payload.alert_name, "No service found for alert");
        }

        let data = NewIncident {
            title: payload.title().to_string(),
            description: build_description(payload),
            service,
            severity,
            detected_at: payload.starts_at,
            impacted_scopes: Vec::new(),
        };

        match self.orchestrator.create_incident(data, None, true).await {
            Ok(incident) => {
                info!(
                    incident = %incident.short_id(),
                    alert = %payload.alert_name,
                    "Incident created from alert"
                );
                Some(incident.id)
            }
            Err(e) => {
                warn!(alert = %payload.alert_name, error = %e, "Failed to create incident from alert");
                None
            }
        }
    }
}

/// Render the incident description from the alert payload.
fn build_description(payload: &AlertPayload) -> String {
    let mut lines = Vec::new();

    if !payload.description().is_empty() {
        lines.push(payload.description().to_string());
        lines.push(String::new());
    }

    lines.push("**Alert Details:**".to_string());
    lines.push(format!("- Source: {}", payload.source));
    lines.push(format!("- Alert Name: {}", payload.alert_name));

    if !payload.labels.is_empty() {
        lines.push(String::new());
        lines.push("**Labels:**".to_string());
        let mut labels: Vec<_> = payload.labels.iter().collect();
        labels.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in labels {
            lines.push(format!("- {key}: {value}"));
        }
    }

    if let Some(url) = &payload.generator_url {
        lines.push(String::new());
        lines.push(format!("[View in monitoring]({url})"));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::rules::AlertRule;
    use crate::alert::AlertSource;
    use crate::escalation::EscalationLog;
    use crate::incident::store::IncidentStore;
    use crate::incident::warroom::DisabledWarRoom;
    use crate::incident::{IncidentStatus, Severity};
    use crate::org::{Service, Team};
    use crate::routing::Router;
    use notify::{ChannelSet, Dispatcher};
    use std::collections::HashMap;

    struct Harness {
        ingestor: AlertIngestor,
        store: Arc<IncidentStore>,
        service_id: Uuid,
    }

    fn harness(rules: Vec<AlertRule>) -> Harness {
        let mut dir = Directory::new();
        let team_id = Uuid::new_v4();
        let service_id = Uuid::new_v4();
        dir.add_team(Team {
            id: team_id,
            name: "sre".to_string(),
            chat_channel_id: None,
            email: None,
            members: vec![],
            manager: None,
            current_on_call: None,
        });
        dir.add_service(Service {
            id: service_id,
            name: "api-gateway".to_string(),
            owner_team: Some(team_id),
            runbook_url: None,
        });

        let store = Arc::new(IncidentStore::new());
        let directory = Arc::new(dir);
        let router = Arc::new(Router::new(
            ChannelSet::new(),
            Dispatcher::default(),
            Arc::clone(&directory),
            Arc::clone(&store),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            router,
            Arc::new(DisabledWarRoom),
            Arc::new(EscalationLog::new()),
            EngineConfig::default(),
        ));
        let ingestor = AlertIngestor::new(
            Arc::new(FingerprintStore::new()),
            Arc::new(RuleSet::new(rules).unwrap()),
            orchestrator,
            directory,
            EngineConfig::default(),
        );

        Harness {
            ingestor,
            store,
            service_id,
        }
    }

    fn firing_alert(name: &str, labels: &[(&str, &str)]) -> AlertPayload {
        AlertPayload {
            source: AlertSource::Alertmanager,
            alert_name: name.to_string(),
            status: AlertState::Firing,
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            annotations: [("summary".to_string(), format!("{name} is firing"))]
                .into_iter()
                .collect(),
            starts_at: None,
            ends_at: None,
            generator_url: None,
        }
    }

    fn resolved(mut payload: AlertPayload) -> AlertPayload {
        payload.status = AlertState::Resolved;
        payload
    }

    fn auto_resolve_rule() -> AlertRule {
        AlertRule {
            name: "auto".to_string(),
            source: None,
            alert_name_pattern: None,
            label_matchers: HashMap::new(),
            target_service: None,
            severity_mapping: HashMap::new(),
            default_severity: Severity::Sev2High,
            auto_create: true,
            auto_resolve: true,
            suppress_duplicates_minutes: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_first_firing_creates_incident() {
        let h = harness(Vec::new());
        let alert = firing_alert("HighLatency", &[("service", "api-gateway"), ("severity", "critical")]);

        let report = h.ingestor.process(&alert).await;
        assert_eq!(report.action, IngestAction::Created);
        assert_eq!(report.fire_count, Some(1));

        let incident = h.store.get(report.incident_id.unwrap()).await.unwrap();
        assert_eq!(incident.title, "HighLatency is firing");
        assert_eq!(incident.service, Some(h.service_id));
        // Heuristic severity from the "critical" label.
        assert_eq!(incident.severity, Severity::Sev1Critical);
        assert!(incident.description.contains("Alert Details"));
    }

    #[tokio::test]
    async fn test_duplicate_within_window_is_suppressed() {
        let h = harness(Vec::new());
        let alert = firing_alert("HighLatency", &[("service", "api-gateway")]);
        let t0 = Utc::now();

        let first = h.ingestor.process_at(&alert, t0).await;
        assert_eq!(first.action, IngestAction::Created);

        let second = h
            .ingestor
            .process_at(&alert, t0 + Duration::minutes(2))
            .await;
        assert_eq!(second.action, IngestAction::Suppressed);
        assert_eq!(second.incident_id, first.incident_id);
        assert_eq!(h.store.len().await, 1);

        let third = h
            .ingestor
            .process_at(&alert, t0 + Duration::minutes(6))
            .await;
        assert_eq!(third.action, IngestAction::Updated);
        assert_eq!(third.fire_count, Some(2));
        // Still linked to the same open incident; no second incident.
        assert_eq!(third.incident_id, first.incident_id);
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_resolve_without_fire_is_ignored() {
        let h = harness(Vec::new());
        let alert = resolved(firing_alert("NeverFired", &[]));

        let report = h.ingestor.process(&alert).await;
        assert_eq!(report.action, IngestAction::Ignored);
        assert_eq!(report.reason, Some("no_matching_alert"));
    }

    #[tokio::test]
    async fn test_auto_resolve_closes_incident() {
        let h = harness(vec![auto_resolve_rule()]);
        let alert = firing_alert("HighLatency", &[("service", "api-gateway")]);
        let t0 = Utc::now();

        let report = h.ingestor.process_at(&alert, t0).await;
        let incident_id = report.incident_id.unwrap();

        let report = h
            .ingestor
            .process_at(&resolved(alert), t0 + Duration::minutes(1))
            .await;
        assert_eq!(report.action, IngestAction::Resolved);

        let incident = h.store.get(incident_id).await.unwrap();
        assert_eq!(incident.status, IncidentStatus::Resolved);
    }

    #[tokio::test]
    async fn test_without_auto_resolve_incident_stays_open() {
        let h = harness(Vec::new());
        let alert = firing_alert("HighLatency", &[("service", "api-gateway")]);
        let t0 = Utc::now();

        let report = h.ingestor.process_at(&alert, t0).await;
        let incident_id = report.incident_id.unwrap();

        h.ingestor
            .process_at(&resolved(alert), t0 + Duration::minutes(1))
            .await;
        let incident = h.store.get(incident_id).await.unwrap();
        assert_eq!(incident.status, IncidentStatus::Triggered);
    }

    #[tokio::test]
    async fn test_rule_auto_create_false_skips_incident() {
        let mut rule = auto_resolve_rule();
        rule.auto_create = false;
        let h = harness(vec![rule]);

        let report = h
            .ingestor
            .process(&firing_alert("HighLatency", &[("service", "api-gateway")]))
            .await;
        assert_eq!(report.action, IngestAction::Created);
        assert!(report.incident_id.is_none());
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_refire_after_resolve_keeps_incident_link() {
        let h = harness(vec![auto_resolve_rule()]);
        let alert = firing_alert("HighLatency", &[("service", "api-gateway")]);
        let t0 = Utc::now();

        let first = h.ingestor.process_at(&alert, t0).await;
        h.ingestor
            .process_at(&resolved(alert.clone()), t0 + Duration::minutes(1))
            .await;

        // Refire outside the suppression window. The fingerprint still holds
        // the old (now resolved) incident id, so no new incident appears,
        // but the dedup-insert path is exercised end to end.
        let refire = h
            .ingestor
            .process_at(&alert, t0 + Duration::minutes(10))
            .await;
        assert_eq!(refire.action, IngestAction::Updated);
        assert_eq!(refire.incident_id, first.incident_id);
    }

    #[tokio::test]
    async fn test_concurrent_firing_creates_one_incident() {
        let h = harness(Vec::new());
        let ingestor = h.ingestor.clone();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let ingestor = ingestor.clone();
                tokio::spawn(async move {
                    let alert =
                        firing_alert("HighLatency", &[("service", "api-gateway")]);
                    ingestor.process(&alert).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(h.store.len().await, 1);
    }
}
