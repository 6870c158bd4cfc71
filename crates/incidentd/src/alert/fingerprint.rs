//! Alert fingerprinting and the dedup store.
//!
//! A fingerprint identifies the same logical alert across repeated
//! deliveries: SHA-256 over source, alert name, and the label pairs sorted
//! by key, so label ordering never changes the identity.
//!
//! The store keeps exactly one record per identity. Both observation paths
//! run entirely inside one write-lock critical section — an upsert, never a
//! separate read followed by a write — so concurrent deliveries of the same
//! alert create the record exactly once.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AlertPayload, AlertSource};

/// Compute the stable fingerprint for an alert identity.
#[must_use]
pub fn compute_fingerprint(
    source: AlertSource,
    alert_name: &str,
    labels: &HashMap<String, String>,
) -> String {
    let mut pairs: Vec<(&String, &String)> = labels.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(alert_name.as_bytes());
    for (key, value) in pairs {
        hasher.update(b":");
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Fingerprint lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FingerprintStatus {
    Firing,
    Resolved,
    Suppressed,
}

/// One tracked alert identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub fingerprint: String,
    pub source: AlertSource,
    pub alert_name: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub status: FingerprintStatus,
    /// Number of times this alert has fired. Monotonic, at least 1.
    pub fire_count: u64,
    pub first_fired_at: DateTime<Utc>,
    pub last_fired_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Weak reference to the incident this alert created, if any.
    pub incident_id: Option<Uuid>,
    /// Whether a matching rule allows incident auto-creation.
    pub auto_create_incident: bool,
}

/// How a firing observation was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiringDisposition {
    /// First time this identity fired.
    New,
    /// Known identity fired again outside the suppression window.
    Refired,
    /// Known identity fired inside the suppression window.
    Suppressed,
}

/// Snapshot returned by a firing observation.
#[derive(Debug, Clone)]
pub struct FiringObservation {
    pub record: FingerprintRecord,
    pub disposition: FiringDisposition,
}

/// Dedup store: one record per alert identity.
#[derive(Default)]
pub struct FingerprintStore {
    inner: RwLock<HashMap<String, FingerprintRecord>>,
}

impl FingerprintStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a firing delivery.
    ///
    /// - unknown identity: create the record (`fire_count = 1`)
    /// - known identity inside `suppress_window` of the last counted firing:
    ///   mark suppressed without touching `fire_count` or `last_fired_at`
    /// - known identity outside the window: increment `fire_count`, refresh
    ///   `last_fired_at`, clear any resolution
    pub async fn observe_firing(
        &self,
        payload: &AlertPayload,
        suppress_window: Duration,
        auto_create_incident: bool,
        now: DateTime<Utc>,
    ) -> FiringObservation {
        let fingerprint = compute_fingerprint(payload.source, &payload.alert_name, &payload.labels);
        let mut inner = self.inner.write().await;

        match inner.entry(fingerprint.clone()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if now - record.last_fired_at < suppress_window {
                    record.status = FingerprintStatus::Suppressed;
                    FiringObservation {
                        record: record.clone(),
                        disposition: FiringDisposition::Suppressed,
                    }
                } else {
                    record.fire_count += 1;
                    record.last_fired_at = now;
                    record.resolved_at = None;
                    record.status = FingerprintStatus::Firing;
                    FiringObservation {
                        record: record.clone(),
                        disposition: FiringDisposition::Refired,
                    }
                }
            }
            Entry::Vacant(entry) => {
                let record = FingerprintRecord {
                    fingerprint,
                    source: payload.source,
                    alert_name: payload.alert_name.clone(),
                    labels: payload.labels.clone(),
                    annotations: payload.annotations.clone(),
                    status: FingerprintStatus::Firing,
                    fire_count: 1,
                    first_fired_at: now,
                    last_fired_at: now,
                    resolved_at: None,
                    incident_id: None,
                    auto_create_incident,
                };
                let snapshot = record.clone();
                entry.insert(record);
                FiringObservation {
                    record: snapshot,
                    disposition: FiringDisposition::New,
                }
            }
        }
    }

    /// Record a resolved delivery. Returns the updated record, or `None` if
    /// this identity was never seen firing.
    pub async fn observe_resolved(
        &self,
        payload: &AlertPayload,
        now: DateTime<Utc>,
    ) -> Option<FingerprintRecord> {
        let fingerprint = compute_fingerprint(payload.source, &payload.alert_name, &payload.labels);
        let mut inner = self.inner.write().await;
        let record = inner.get_mut(&fingerprint)?;
        record.status = FingerprintStatus::Resolved;
        record.resolved_at = Some(now);
        Some(record.clone())
    }

    /// Attach a created incident to its source fingerprint (weak reference).
    pub async fn attach_incident(&self, fingerprint: &str, incident_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.get_mut(fingerprint) {
            record.incident_id = Some(incident_id);
        }
    }

    /// Fetch a record by fingerprint.
    pub async fn get(&self, fingerprint: &str) -> Option<FingerprintRecord> {
        self.inner.read().await.get(fingerprint).cloned()
    }

    /// Number of tracked identities.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertState;
    use std::sync::Arc;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn payload(name: &str, label_pairs: &[(&str, &str)]) -> AlertPayload {
        AlertPayload {
            source: AlertSource::Alertmanager,
            alert_name: name.to_string(),
            status: AlertState::Firing,
            labels: labels(label_pairs),
            annotations: HashMap::new(),
            starts_at: None,
            ends_at: None,
            generator_url: None,
        }
    }

    #[test]
    fn test_fingerprint_ignores_label_order() {
        let a = labels(&[("severity", "critical"), ("service", "api"), ("zone", "eu")]);
        let b = labels(&[("zone", "eu"), ("severity", "critical"), ("service", "api")]);
        assert_eq!(
            compute_fingerprint(AlertSource::Alertmanager, "HighLatency", &a),
            compute_fingerprint(AlertSource::Alertmanager, "HighLatency", &b),
        );
    }

    #[test]
    fn test_fingerprint_changes_with_any_input() {
        let base = labels(&[("severity", "critical")]);
        let fp = compute_fingerprint(AlertSource::Alertmanager, "HighLatency", &base);

        let changed_value = labels(&[("severity", "warning")]);
        assert_ne!(
            fp,
            compute_fingerprint(AlertSource::Alertmanager, "HighLatency", &changed_value)
        );
        assert_ne!(
            fp,
            compute_fingerprint(AlertSource::Alertmanager, "HighErrors", &base)
        );
        assert_ne!(
            fp,
            compute_fingerprint(AlertSource::Grafana, "HighLatency", &base)
        );
    }

    #[tokio::test]
    async fn test_suppression_window_behavior() {
        let store = FingerprintStore::new();
        let p = payload("HighLatency", &[("service", "api")]);
        let window = Duration::minutes(5);
        let t0 = Utc::now();

        let first = store.observe_firing(&p, window, true, t0).await;
        assert_eq!(first.disposition, FiringDisposition::New);
        assert_eq!(first.record.fire_count, 1);

        // Second firing inside the window is suppressed and counts nothing.
        let t1 = t0 + Duration::minutes(2);
        let second = store.observe_firing(&p, window, true, t1).await;
        assert_eq!(second.disposition, FiringDisposition::Suppressed);
        assert_eq!(second.record.fire_count, 1);
        assert_eq!(second.record.status, FingerprintStatus::Suppressed);
        assert_eq!(second.record.last_fired_at, t0);

        // Outside the window the firing counts again.
        let t2 = t0 + Duration::minutes(6);
        let third = store.observe_firing(&p, window, true, t2).await;
        assert_eq!(third.disposition, FiringDisposition::Refired);
        assert_eq!(third.record.fire_count, 2);
        assert_eq!(third.record.last_fired_at, t2);
        assert_eq!(third.record.status, FingerprintStatus::Firing);
    }

    #[tokio::test]
    async fn test_refiring_clears_resolution() {
        let store = FingerprintStore::new();
        let p = payload("DiskFull", &[]);
        let t0 = Utc::now();

        store.observe_firing(&p, Duration::minutes(5), true, t0).await;
        let resolved = store
            .observe_resolved(&p, t0 + Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(resolved.status, FingerprintStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        let refired = store
            .observe_firing(&p, Duration::minutes(5), true, t0 + Duration::minutes(20))
            .await;
        assert_eq!(refired.disposition, FiringDisposition::Refired);
        assert_eq!(refired.record.status, FingerprintStatus::Firing);
        assert!(refired.record.resolved_at.is_none());
    }

    #[tokio::test]
    async fn test_resolve_without_fire_is_none() {
        let store = FingerprintStore::new();
        let p = payload("NeverFired", &[]);
        assert!(store.observe_resolved(&p, Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_delivery_creates_one_record() {
        let store = Arc::new(FingerprintStore::new());
        let now = Utc::now();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let p = payload("HighLatency", &[("service", "api")]);
                    store
                        .observe_firing(&p, Duration::minutes(5), true, now)
                        .await
                        .disposition
                })
            })
            .collect();

        let mut new_count = 0;
        for task in tasks {
            if task.await.unwrap() == FiringDisposition::New {
                new_count += 1;
            }
        }
        assert_eq!(new_count, 1);
        assert_eq!(store.len().await, 1);
    }
}
