//! Alert intake: canonical payload, normalizers, fingerprinting, rules, and
//! the ingestion service.

pub mod fingerprint;
pub mod ingest;
pub mod normalize;
pub mod rules;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported alerting sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSource {
    Alertmanager,
    Datadog,
    Grafana,
    Custom,
}

impl AlertSource {
    /// Stable wire name, also used in fingerprints.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Alertmanager => "ALERTMANAGER",
            Self::Datadog => "DATADOG",
            Self::Grafana => "GRAFANA",
            Self::Custom => "CUSTOM",
        }
    }
}

impl std::fmt::Display for AlertSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an alert is currently firing or has resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Firing,
    Resolved,
}

impl AlertState {
    /// Lenient parse: anything that is not "resolved" counts as firing,
    /// matching how monitoring sources report intermediate states.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("resolved") {
            Self::Resolved
        } else {
            Self::Firing
        }
    }
}

/// Normalized alert payload from any source.
///
/// Ephemeral: produced per webhook delivery, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub source: AlertSource,
    pub alert_name: String,
    pub status: AlertState,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub generator_url: Option<String>,
}

impl AlertPayload {
    /// Alert title, from annotations with the alert name as fallback.
    #[must_use]
    pub fn title(&self) -> &str {
        self.annotations
            .get("summary")
            .or_else(|| self.annotations.get("title"))
            .or_else(|| self.annotations.get("message"))
            .map_or(self.alert_name.as_str(), String::as_str)
    }

    /// Alert description from annotations, empty when absent.
    #[must_use]
    pub fn description(&self) -> &str {
        self.annotations
            .get("description")
            .or_else(|| self.annotations.get("message"))
            .map_or("", String::as_str)
    }

    /// Severity label, from labels with "warning" as fallback.
    #[must_use]
    pub fn severity_label(&self) -> &str {
        self.labels
            .get("severity")
            .or_else(|| self.labels.get("priority"))
            .or_else(|| self.labels.get("level"))
            .map_or("warning", String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_with(annotations: &[(&str, &str)], labels: &[(&str, &str)]) -> AlertPayload {
        AlertPayload {
            source: AlertSource::Custom,
            alert_name: "HighLatency".to_string(),
            status: AlertState::Firing,
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            annotations: annotations
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            starts_at: None,
            ends_at: None,
            generator_url: None,
        }
    }

    #[test]
    fn test_title_fallback_order() {
        let p = payload_with(&[("summary", "s"), ("title", "t"), ("message", "m")], &[]);
        assert_eq!(p.title(), "s");

        let p = payload_with(&[("title", "t"), ("message", "m")], &[]);
        assert_eq!(p.title(), "t");

        let p = payload_with(&[("message", "m")], &[]);
        assert_eq!(p.title(), "m");

        let p = payload_with(&[], &[]);
        assert_eq!(p.title(), "HighLatency");
    }

    #[test]
    fn test_severity_label_fallback_order() {
        let p = payload_with(&[], &[("severity", "critical"), ("priority", "p2")]);
        assert_eq!(p.severity_label(), "critical");

        let p = payload_with(&[], &[("priority", "p2")]);
        assert_eq!(p.severity_label(), "p2");

        let p = payload_with(&[], &[("level", "warn")]);
        assert_eq!(p.severity_label(), "warn");

        let p = payload_with(&[], &[]);
        assert_eq!(p.severity_label(), "warning");
    }

    #[test]
    fn test_state_parse_is_lenient() {
        assert_eq!(AlertState::parse("resolved"), AlertState::Resolved);
        assert_eq!(AlertState::parse("RESOLVED"), AlertState::Resolved);
        assert_eq!(AlertState::parse("firing"), AlertState::Firing);
        assert_eq!(AlertState::parse("pending"), AlertState::Firing);
    }
}
