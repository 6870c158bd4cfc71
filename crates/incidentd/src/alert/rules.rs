//! Alert rules: matching, severity mapping, and the built-in fallbacks.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::incident::Severity;

use super::AlertSource;

/// Common label names that identify the affected service.
const SERVICE_LABELS: &[&str] = &["service", "job", "app", "application", "component"];

/// Operator-configured rule mapping alerts to incident behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub name: String,
    /// Match a specific source; `None` matches all.
    #[serde(default)]
    pub source: Option<AlertSource>,
    /// Case-insensitive regex over the alert name; `None` matches all.
    #[serde(default)]
    pub alert_name_pattern: Option<String>,
    /// Label key/value pairs that must all equal the alert's labels.
    #[serde(default)]
    pub label_matchers: HashMap<String, String>,
    /// Service to assign to created incidents.
    #[serde(default)]
    pub target_service: Option<Uuid>,
    /// label-key -> (label-value -> severity)
    #[serde(default)]
    pub severity_mapping: HashMap<String, HashMap<String, Severity>>,
    #[serde(default = "default_severity")]
    pub default_severity: Severity,
    /// Automatically create incidents for matching alerts.
    #[serde(default = "default_true")]
    pub auto_create: bool,
    /// Auto-resolve the incident when the source alert resolves.
    #[serde(default)]
    pub auto_resolve: bool,
    /// Suppression window override, in minutes.
    #[serde(default)]
    pub suppress_duplicates_minutes: Option<u64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_severity() -> Severity {
    Severity::Sev3Medium
}

fn default_true() -> bool {
    true
}

impl AlertRule {
    /// Incident severity for an alert's labels.
    ///
    /// Walks the severity mapping and returns the first hit, falling back to
    /// the rule's default severity.
    #[must_use]
    pub fn severity_for(&self, labels: &HashMap<String, String>) -> Severity {
        for (label_key, mapping) in &self.severity_mapping {
            if let Some(label_value) = labels.get(label_key) {
                if let Some(severity) = mapping.get(label_value) {
                    return *severity;
                }
            }
        }
        self.default_severity
    }
}

/// A rule with its name pattern compiled once.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: AlertRule,
    pattern: Option<Regex>,
}

impl CompiledRule {
    /// Whether this rule matches an incoming alert.
    #[must_use]
    pub fn matches(
        &self,
        alert_name: &str,
        labels: &HashMap<String, String>,
        source: AlertSource,
    ) -> bool {
        if let Some(rule_source) = self.rule.source {
            if rule_source != source {
                return false;
            }
        }

        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(alert_name) {
                return false;
            }
        }

        self.rule
            .label_matchers
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

/// Active rules in stable configured order; the first match wins.
///
/// Linear scan — fine for the rule-set sizes this domain sees.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile a rule list, validating every name pattern up front.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Configuration` for an invalid regex.
    pub fn new(rules: Vec<AlertRule>) -> EngineResult<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let pattern = match &rule.alert_name_pattern {
                Some(raw) if !raw.is_empty() => {
                    Some(Regex::new(&format!("(?i){raw}")).map_err(|e| {
                        EngineError::Configuration(format!(
                            "rule '{}': invalid alert_name_pattern: {e}",
                            rule.name
                        ))
                    })?)
                }
                _ => None,
            };
            compiled.push(CompiledRule { rule, pattern });
        }
        Ok(Self { rules: compiled })
    }

    /// First active rule matching the alert, in configured order.
    #[must_use]
    pub fn first_match(
        &self,
        alert_name: &str,
        labels: &HashMap<String, String>,
        source: AlertSource,
    ) -> Option<&CompiledRule> {
        self.rules
            .iter()
            .filter(|r| r.rule.is_active)
            .find(|r| r.matches(alert_name, labels, source))
    }

    /// Number of configured rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Built-in severity heuristic used when no rule matches.
#[must_use]
pub fn severity_from_label(label: &str) -> Severity {
    match label.to_ascii_lowercase().as_str() {
        "critical" | "fatal" | "emergency" | "p1" => Severity::Sev1Critical,
        "high" | "error" | "p2" => Severity::Sev2High,
        "medium" | "warning" | "warn" | "p3" => Severity::Sev3Medium,
        _ => Severity::Sev4Low,
    }
}

/// Candidate service name from common alert labels.
#[must_use]
pub fn service_name_from_labels(labels: &HashMap<String, String>) -> Option<&str> {
    SERVICE_LABELS
        .iter()
        .find_map(|key| labels.get(*key))
        .map(String::as_str)
}
