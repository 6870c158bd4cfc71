//! Source-specific payload normalization.
//!
//! The webhook layer parses each monitoring tool's JSON into the typed
//! structs here; these functions turn them into canonical [`AlertPayload`]s.
//! Raw HTTP handling stays out of the core.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{AlertPayload, AlertSource, AlertState};

// ============================================================================
// Prometheus Alertmanager (webhook format v4)
// ============================================================================

/// Alertmanager webhook payload.
///
/// Reference: <https://prometheus.io/docs/alerting/latest/configuration/#webhook_config>
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerPayload {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub group_key: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub group_labels: HashMap<String, String>,
    #[serde(default)]
    pub common_labels: HashMap<String, String>,
    #[serde(default)]
    pub common_annotations: HashMap<String, String>,
    #[serde(default)]
    pub external_url: String,
    pub alerts: Vec<AlertmanagerAlert>,
}

/// Individual alert from Alertmanager.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    pub status: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "generatorURL")]
    pub generator_url: Option<String>,
}

/// Normalize an Alertmanager payload. Each grouped alert is processed
/// independently.
#[must_use]
pub fn from_alertmanager(payload: &AlertmanagerPayload) -> Vec<AlertPayload> {
    let alerts: Vec<AlertPayload> = payload
        .alerts
        .iter()
        .map(|alert| AlertPayload {
            source: AlertSource::Alertmanager,
            alert_name: alert
                .labels
                .get("alertname")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            status: AlertState::parse(&alert.status),
            labels: alert.labels.clone(),
            annotations: alert.annotations.clone(),
            starts_at: alert.starts_at,
            ends_at: alert.ends_at,
            generator_url: alert.generator_url.clone(),
        })
        .collect();

    info!(count = alerts.len(), "Parsed alerts from Alertmanager");
    alerts
}

// ============================================================================
// Datadog (single-alert webhook)
// ============================================================================

/// Datadog webhook event. One alert per delivery.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatadogEvent {
    #[serde(default)]
    pub alert_status: Option<String>,
    #[serde(default)]
    pub alert_title: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub alert_type: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    /// Comma-separated `key:value` tags.
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub alert_scope: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Normalize a Datadog event.
#[must_use]
pub fn from_datadog(event: &DatadogEvent) -> AlertPayload {
    let status = match event.alert_status.as_deref() {
        Some("Recovered") => AlertState::Resolved,
        // Triggered, Re-Triggered, Warn, No Data, ... all count as firing.
        _ => AlertState::Firing,
    };

    let alert_name = event
        .alert_title
        .clone()
        .or_else(|| event.title.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let mut labels = HashMap::new();
    labels.insert("alertname".to_string(), alert_name.clone());
    labels.insert(
        "alert_type".to_string(),
        event.alert_type.clone().unwrap_or_else(|| "error".to_string()),
    );
    labels.insert(
        "priority".to_string(),
        event.priority.clone().unwrap_or_else(|| "normal".to_string()),
    );
    if let Some(hostname) = &event.hostname {
        labels.insert("hostname".to_string(), hostname.clone());
    }

    for blob in [&event.tags, &event.alert_scope] {
        if let Some(blob) = blob {
            for part in blob.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                match part.split_once(':') {
                    Some((key, value)) => {
                        labels.insert(key.trim().to_string(), value.trim().to_string());
                    }
                    None => {
                        labels.insert(part.to_string(), "true".to_string());
                    }
                }
            }
        }
    }

    // Map Datadog alert type onto a severity label the rules understand.
    let severity = match event.alert_type.as_deref() {
        Some("error") | None => "critical",
        Some("warning") => "warning",
        Some("info" | "success") => "info",
        Some(_) => "warning",
    };
    labels.insert("severity".to_string(), severity.to_string());

    let annotations = [
        ("summary".to_string(), event.title.clone().unwrap_or_default()),
        (
            "description".to_string(),
            event.body.clone().unwrap_or_default(),
        ),
    ]
    .into_iter()
    .filter(|(_, v)| !v.is_empty())
    .collect();

    info!(alert = %alert_name, "Parsed Datadog alert");
    AlertPayload {
        source: AlertSource::Datadog,
        alert_name,
        status,
        labels,
        annotations,
        starts_at: None,
        ends_at: None,
        generator_url: event.url.clone(),
    }
}

// ============================================================================
// Grafana (unified and legacy alerting)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrafanaUnifiedPayload {
    #[serde(default)]
    common_labels: HashMap<String, String>,
    #[serde(default)]
    common_annotations: HashMap<String, String>,
    alerts: Vec<GrafanaUnifiedAlert>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrafanaUnifiedAlert {
    #[serde(default)]
    status: String,
    #[serde(default)]
    labels: HashMap<String, String>,
    #[serde(default)]
    annotations: HashMap<String, String>,
    #[serde(default)]
    starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    ends_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "generatorURL")]
    generator_url: Option<String>,
    #[serde(default, rename = "dashboardURL")]
    dashboard_url: Option<String>,
}

/// Normalize a Grafana payload, auto-detecting unified vs legacy format.
#[must_use]
pub fn from_grafana(value: &Value) -> Vec<AlertPayload> {
    if value.get("alerts").is_some() {
        from_grafana_unified(value)
    } else {
        from_grafana_legacy(value)
    }
}

fn from_grafana_unified(value: &Value) -> Vec<AlertPayload> {
    let Ok(payload) = serde_json::from_value::<GrafanaUnifiedPayload>(value.clone()) else {
        return Vec::new();
    };

    let alerts: Vec<AlertPayload> = payload
        .alerts
        .into_iter()
        .map(|alert| {
            // Merge common and alert-specific labels/annotations; the
            // specific ones win.
            let mut labels = payload.common_labels.clone();
            labels.extend(alert.labels);
            let mut annotations = payload.common_annotations.clone();
            annotations.extend(alert.annotations);

            AlertPayload {
                source: AlertSource::Grafana,
                alert_name: labels
                    .get("alertname")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                status: AlertState::parse(&alert.status),
                labels,
                annotations,
                starts_at: alert.starts_at,
                ends_at: alert.ends_at,
                generator_url: alert.generator_url.or(alert.dashboard_url),
            }
        })
        .collect();

    info!(count = alerts.len(), "Parsed alerts from Grafana (unified)");
    alerts
}

fn from_grafana_legacy(value: &Value) -> Vec<AlertPayload> {
    let state = value.get("state").and_then(Value::as_str).unwrap_or("alerting");
    let status = match state {
        "ok" | "paused" => AlertState::Resolved,
        // alerting, pending, no_data, ...
        _ => AlertState::Firing,
    };

    let alert_name = value
        .get("ruleName")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let mut labels = HashMap::new();
    labels.insert("alertname".to_string(), alert_name.clone());
    if let Some(rule_id) = value.get("ruleId") {
        labels.insert("rule_id".to_string(), rule_id.to_string());
    }
    if let Some(matches) = value.get("evalMatches").and_then(Value::as_array) {
        for eval_match in matches {
            let metric = eval_match
                .get("metric")
                .and_then(Value::as_str)
                .unwrap_or("value");
            let metric_value = eval_match.get("value").map(Value::to_string).unwrap_or_default();
            labels.insert(metric.to_string(), metric_value);
        }
    }

    let annotations = [
        (
            "summary".to_string(),
            value
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        (
            "description".to_string(),
            value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
    ]
    .into_iter()
    .filter(|(_, v)| !v.is_empty())
    .collect();

    info!(alert = %alert_name, "Parsed Grafana legacy alert");
    vec![AlertPayload {
        source: AlertSource::Grafana,
        alert_name,
        status,
        labels,
        annotations,
        starts_at: None,
        ends_at: None,
        generator_url: value
            .get("ruleUrl")
            .and_then(Value::as_str)
            .map(ToString::to_string),
    }]
}

// ============================================================================
// Custom webhooks
// ============================================================================

/// Normalize a custom webhook body: a single alert object, an array, or an
/// `{"alerts": [...]}` wrapper. Field names are forgiving.
#[must_use]
pub fn from_custom(value: &Value) -> Vec<AlertPayload> {
    let items: Vec<&Value> = if let Some(list) = value.as_array() {
        list.iter().collect()
    } else if let Some(list) = value.get("alerts").and_then(Value::as_array) {
        list.iter().collect()
    } else {
        vec![value]
    };

    let alerts: Vec<AlertPayload> = items.into_iter().map(custom_alert).collect();
    info!(count = alerts.len(), "Parsed custom alerts");
    alerts
}

fn custom_alert(value: &Value) -> AlertPayload {
    let mut labels: HashMap<String, String> = value
        .get("labels")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    if let Some(severity) = value.get("severity").and_then(Value::as_str) {
        labels
            .entry("severity".to_string())
            .or_insert_with(|| severity.to_string());
    }

    let alert_name = value
        .get("alert_name")
        .or_else(|| value.get("name"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .or_else(|| labels.get("alertname").cloned())
        .unwrap_or_else(|| "custom_alert".to_string());
    labels.insert("alertname".to_string(), alert_name.clone());

    if let Some(service) = value.get("service").and_then(Value::as_str) {
        labels
            .entry("service".to_string())
            .or_insert_with(|| service.to_string());
    }

    let text_field = |keys: &[&str]| -> String {
        keys.iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string()
    };

    let annotations = [
        ("summary".to_string(), text_field(&["title", "summary"])),
        (
            "description".to_string(),
            text_field(&["description", "message"]),
        ),
    ]
    .into_iter()
    .filter(|(_, v)| !v.is_empty())
    .collect();

    AlertPayload {
        source: AlertSource::Custom,
        alert_name,
        status: AlertState::parse(value.get("status").and_then(Value::as_str).unwrap_or("firing")),
        labels,
        annotations,
        starts_at: None,
        ends_at: None,
        generator_url: value
            .get("url")
            .or_else(|| value.get("link"))
            .and_then(Value::as_str)
            .map(ToString::to_string),
    }
}
