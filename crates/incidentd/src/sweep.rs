//! Periodic background sweep: escalations, reminders, and archival.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::escalation::engine::EscalationEngine;
use crate::incident::store::IncidentStore;
use crate::incident::warroom::WarRoomHub;
use crate::incident::{EventKind, Incident};
use crate::routing::Router;

/// Summary of one sweep pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepSummary {
    pub checked: usize,
    pub escalated: usize,
    pub reminded: usize,
    pub archived: usize,
}

/// Runs the periodic engine maintenance loop.
#[derive(Clone)]
pub struct Sweeper {
    engine: EscalationEngine,
    router: Arc<Router>,
    store: Arc<IncidentStore>,
    war_room: Arc<dyn WarRoomHub>,
    config: EngineConfig,
}

impl Sweeper {
    #[must_use]
    pub fn new(
        engine: EscalationEngine,
        router: Arc<Router>,
        store: Arc<IncidentStore>,
        war_room: Arc<dyn WarRoomHub>,
        config: EngineConfig,
    ) -> Self {
        Self {
            engine,
            router,
            store,
            war_room,
            config,
        }
    }

    /// Run forever at the configured interval.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.escalation_sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.escalation_sweep_interval.as_secs(),
            "Sweeper started"
        );
        loop {
            ticker.tick().await;
            self.pass(Utc::now()).await;
        }
    }

    /// One full pass with an explicit clock.
    pub async fn pass(&self, now: DateTime<Utc>) -> SweepSummary {
        let escalation = self.engine.sweep(now).await;
        let reminded = self.remind_unacknowledged(now).await;
        let archived = self.archive_resolved(now).await;

        let summary = SweepSummary {
            checked: escalation.checked,
            escalated: escalation.escalated,
            reminded,
            archived,
        };
        debug!(?summary, "Sweep pass complete");
        summary
    }

    /// Remind on-call responders about stale TRIGGERED incidents.
    ///
    /// An incident qualifies once it is older than the reminder threshold,
    /// and reminders repeat no faster than `reminder_repeat_minutes`.
    async fn remind_unacknowledged(&self, now: DateTime<Utc>) -> usize {
        let threshold = Duration::minutes(self.config.reminder_threshold_minutes);
        let repeat = Duration::minutes(self.config.reminder_repeat_minutes);

        let mut reminded = 0;
        for incident in self.store.triggered_incidents().await {
            if now - incident.created_at < threshold {
                continue;
            }
            if incident
                .last_reminder_at
                .is_some_and(|last| now - last < repeat)
            {
                continue;
            }

            let report = self.router.send_reminder(&incident).await;
            if report.is_empty() {
                debug!(incident = %incident.short_id(), "No reminder recipients");
                continue;
            }

            let _ = self
                .store
                .update(incident.id, |i| {
                    i.last_reminder_at = Some(now);
                    true
                })
                .await;
            self.store
                .append_event(
                    incident.id,
                    EventKind::Reminder,
                    "Reminder sent: incident not yet acknowledged",
                    None,
                )
                .await;
            reminded += 1;
            info!(incident = %incident.short_id(), "Reminder sent");
        }
        reminded
    }

    /// Archive incidents that have been resolved longer than the retention
    /// period, and archive their war rooms.
    async fn archive_resolved(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(self.config.archive_retention_days);

        let mut archived = 0;
        for incident in self.store.resolved_before(cutoff).await {
            let _ = self
                .store
                .update(incident.id, |i| {
                    i.is_archived = true;
                    true
                })
                .await;
            self.store
                .append_event(incident.id, EventKind::Archived, "Incident archived", None)
                .await;

            self.archive_war_room(&incident).await;
            archived += 1;
            info!(incident = %incident.short_id(), "Incident archived");
        }
        archived
    }

    async fn archive_war_room(&self, incident: &Incident) {
        let Some(war_room_id) = &incident.war_room_id else {
            return;
        };
        if !self.war_room.archive_war_room(war_room_id).await {
            warn!(
                incident = %incident.short_id(),
                war_room_id = %war_room_id,
                "War Room archive failed"
            );
        }
    }
}
