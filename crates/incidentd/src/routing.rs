//! Notification routing: who gets told about an incident, and through which
//! channels.
//!
//! The router aggregates recipients (owning team's chat channel, current
//! on-call, impact-scope mandatory contacts), renders one channel-agnostic
//! message, and fans out through the configured channels. Channel-specific
//! formatting stays in the channels; per-recipient failures stay isolated in
//! the dispatcher.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use notify::{ChannelKind, ChannelSet, DispatchJob, DispatchReport, Dispatcher, RenderedMessage};
use tracing::{debug, info, warn};

use crate::escalation::EscalationTarget;
use crate::incident::store::IncidentStore;
use crate::incident::Incident;
use crate::org::Directory;

/// Aggregated recipients for one dispatch. Ephemeral, never persisted.
#[derive(Debug, Clone, Default)]
pub struct NotificationRecipients {
    pub chat_channels: Vec<String>,
    pub chat_user_ids: Vec<String>,
    pub sms_numbers: Vec<String>,
    pub emails: Vec<String>,
    pub webhook_urls: Vec<String>,
}

impl NotificationRecipients {
    /// Whether there is anyone to notify.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chat_channels.is_empty()
            && self.chat_user_ids.is_empty()
            && self.sms_numbers.is_empty()
            && self.emails.is_empty()
            && self.webhook_urls.is_empty()
    }

    fn push_unique(list: &mut Vec<String>, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() && !list.contains(&value) {
            list.push(value);
        }
    }
}

/// Routes notifications for incidents.
#[derive(Clone)]
pub struct Router {
    channels: ChannelSet,
    dispatcher: Dispatcher,
    directory: Arc<Directory>,
    store: Arc<IncidentStore>,
}

impl Router {
    #[must_use]
    pub fn new(
        channels: ChannelSet,
        dispatcher: Dispatcher,
        directory: Arc<Directory>,
        store: Arc<IncidentStore>,
    ) -> Self {
        Self {
            channels,
            dispatcher,
            directory,
            store,
        }
    }

    /// Aggregate all recipients for an incident.
    #[must_use]
    pub fn get_recipients(&self, incident: &Incident, now: DateTime<Utc>) -> NotificationRecipients {
        let mut recipients = NotificationRecipients::default();

        // Technical recipients: the owning team's channel and on-call.
        if let Some(service) = incident.service {
            if let Some(team) = self.directory.owning_team(service) {
                if let Some(channel) = &team.chat_channel_id {
                    NotificationRecipients::push_unique(&mut recipients.chat_channels, channel);
                }
                if let Some(on_call) = self.directory.current_on_call(team.id, now) {
                    if let Some(email) = &on_call.email {
                        NotificationRecipients::push_unique(&mut recipients.emails, email);
                    }
                    if incident.severity == crate::incident::Severity::Sev1Critical {
                        if let Some(phone) = &on_call.phone {
                            NotificationRecipients::push_unique(&mut recipients.sms_numbers, phone);
                        }
                    }
                }
            }
        }

        // Functional recipients: impacted scopes with mandatory contacts.
        for scope in self.directory.active_scopes(&incident.impacted_scopes) {
            if let Some(email) = &scope.mandatory_notify_email {
                NotificationRecipients::push_unique(&mut recipients.emails, email);
            }
        }

        info!(
            incident = %incident.short_id(),
            chat_channels = recipients.chat_channels.len(),
            emails = recipients.emails.len(),
            sms = recipients.sms_numbers.len(),
            "Recipients aggregated"
        );

        recipients
    }

    /// Render the channel-agnostic notification message.
    #[must_use]
    pub fn build_message(&self, incident: &Incident) -> RenderedMessage {
        RenderedMessage {
            title: format!("🚨 [{}] {}", incident.severity.label(), incident.title),
            body: if incident.description.is_empty() {
                "No description provided.".to_string()
            } else {
                incident.description.clone()
            },
            severity: incident.severity.label().to_string(),
            status: incident.status.label().to_string(),
            service: self.service_name(incident),
            links: self.build_links(incident),
        }
    }

    /// Notify every recipient across every populated channel category.
    pub async fn broadcast(&self, incident: &Incident) -> DispatchReport {
        if self.incident_archived(incident.id).await {
            debug!(incident = %incident.short_id(), "Incident archived, skipping broadcast");
            return DispatchReport::default();
        }

        let recipients = self.get_recipients(incident, Utc::now());
        if recipients.is_empty() {
            warn!(incident = %incident.short_id(), "No recipients found for incident");
            return DispatchReport::default();
        }

        let message = self.build_message(incident);
        let jobs = self.jobs_for(&recipients);
        let report = self.dispatcher.fan_out(jobs, &message).await;

        info!(
            incident = %incident.short_id(),
            delivered = report.delivered_count(),
            failed = report.failed_count(),
            "Broadcast complete"
        );
        report
    }

    /// Send an escalation notification to one resolved target.
    ///
    /// Escalations are more urgent than broadcasts: the target is contacted
    /// on every channel we have an address for, with SMS added for critical
    /// incidents.
    pub async fn send_escalation_alert(
        &self,
        incident: &Incident,
        target: &EscalationTarget,
        level: u32,
    ) -> DispatchReport {
        if self.incident_archived(incident.id).await {
            debug!(incident = %incident.short_id(), "Incident archived, skipping escalation alert");
            return DispatchReport::default();
        }

        info!(
            incident = %incident.short_id(),
            target = %target.name,
            level,
            "Sending escalation alert"
        );

        let message = RenderedMessage {
            title: format!(
                "⚠️ ESCALATION [{}] {}",
                incident.severity.label(),
                incident.title
            ),
            body: format!(
                "This incident has not been acknowledged and has been escalated to you.\n\n\
                 Service: {}\n\
                 Created: {}\n\
                 Escalation Level: {}",
                self.service_name(incident),
                incident.created_at.format("%Y-%m-%d %H:%M UTC"),
                level,
            ),
            severity: incident.severity.label().to_string(),
            status: incident.status.label().to_string(),
            service: self.service_name(incident),
            links: self.build_links(incident),
        };

        let mut recipients = NotificationRecipients::default();
        if let Some(email) = &target.email {
            NotificationRecipients::push_unique(&mut recipients.emails, email);
        }
        if let Some(chat_id) = &target.chat_user_id {
            NotificationRecipients::push_unique(&mut recipients.chat_user_ids, chat_id);
        }
        if incident.is_critical() {
            if let Some(phone) = &target.phone {
                NotificationRecipients::push_unique(&mut recipients.sms_numbers, phone);
            }
        }

        let jobs = self.jobs_for(&recipients);
        self.dispatcher.fan_out(jobs, &message).await
    }

    /// Send a reminder for an unacknowledged incident to the on-call
    /// responders.
    pub async fn send_reminder(&self, incident: &Incident) -> DispatchReport {
        if self.incident_archived(incident.id).await {
            debug!(incident = %incident.short_id(), "Incident archived, skipping reminder");
            return DispatchReport::default();
        }

        let now = Utc::now();
        info!(incident = %incident.short_id(), "Sending reminder for unacknowledged incident");

        let message = RenderedMessage {
            title: format!(
                "⏰ REMINDER [{}] {}",
                incident.severity.label(),
                incident.title
            ),
            body: format!(
                "This incident has not been acknowledged.\n\n\
                 Service: {}\n\
                 Created: {}\n\
                 Time since creation: {}",
                self.service_name(incident),
                incident.created_at.format("%Y-%m-%d %H:%M UTC"),
                format_duration_since(incident.created_at, now),
            ),
            severity: incident.severity.label().to_string(),
            status: incident.status.label().to_string(),
            service: self.service_name(incident),
            links: self.build_links(incident),
        };

        // Reminders go to the team channel and on-call email only.
        let all = self.get_recipients(incident, now);
        let recipients = NotificationRecipients {
            chat_channels: all.chat_channels,
            emails: all.emails,
            ..Default::default()
        };

        let jobs = self.jobs_for(&recipients);
        self.dispatcher.fan_out(jobs, &message).await
    }

    /// Build dispatch jobs for every `(recipient, channel)` pair we can
    /// actually address.
    fn jobs_for(&self, recipients: &NotificationRecipients) -> Vec<DispatchJob> {
        let mut jobs = Vec::new();

        if let Some(chat) = self.channels.get(ChannelKind::Chat) {
            for channel in recipients
                .chat_channels
                .iter()
                .chain(recipients.chat_user_ids.iter())
            {
                jobs.push(DispatchJob::new(Arc::clone(chat), channel.clone()));
            }
        }
        if let Some(email) = self.channels.get(ChannelKind::Email) {
            for address in &recipients.emails {
                jobs.push(DispatchJob::new(Arc::clone(email), address.clone()));
            }
        }
        if let Some(sms) = self.channels.get(ChannelKind::Sms) {
            for number in &recipients.sms_numbers {
                jobs.push(DispatchJob::new(Arc::clone(sms), number.clone()));
            }
        }
        if let Some(webhook) = self.channels.get(ChannelKind::Webhook) {
            if recipients.webhook_urls.is_empty() {
                if let Some(url) = webhook.default_recipient() {
                    jobs.push(DispatchJob::new(Arc::clone(webhook), url));
                }
            } else {
                for url in &recipients.webhook_urls {
                    jobs.push(DispatchJob::new(Arc::clone(webhook), url.clone()));
                }
            }
        }

        jobs
    }

    fn service_name(&self, incident: &Incident) -> String {
        incident
            .service
            .and_then(|id| self.directory.service(id))
            .map_or_else(|| "unknown".to_string(), |s| s.name.clone())
    }

    fn build_links(&self, incident: &Incident) -> String {
        let mut links = Vec::new();
        if let Some(url) = &incident.war_room_url {
            links.push(format!("💬 War Room: {url}"));
        }
        if let Some(runbook) = incident
            .service
            .and_then(|id| self.directory.service(id))
            .and_then(|s| s.runbook_url.as_ref())
        {
            links.push(format!("📖 Runbook: {runbook}"));
        }
        if links.is_empty() {
            "No links available yet.".to_string()
        } else {
            links.join("\n")
        }
    }

    async fn incident_archived(&self, id: uuid::Uuid) -> bool {
        self.store.get(id).await.is_some_and(|i| i.is_archived)
    }
}

/// Human-readable duration since a timestamp.
fn format_duration_since(start: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - start).num_minutes().max(0);
    if minutes < 60 {
        return format!("{minutes} minutes");
    }
    let hours = minutes / 60;
    let remaining_minutes = minutes % 60;
    if hours < 24 {
        return format!("{hours}h {remaining_minutes}min");
    }
    let days = hours / 24;
    let remaining_hours = hours % 24;
    format!("{days}d {remaining_hours}h")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::Severity;
    use crate::org::{ImpactScope, Responder, Service, Team};
    use chrono::Duration;
    use uuid::Uuid;

    fn directory_with_team() -> (Directory, Uuid, Uuid) {
        let mut dir = Directory::new();
        let on_call = Responder {
            id: Uuid::new_v4(),
            name: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            phone: Some("+33612345678".to_string()),
            chat_user_id: Some("U01ALICE".to_string()),
        };
        let team_id = Uuid::new_v4();
        let service_id = Uuid::new_v4();
        dir.add_responder(on_call.clone());
        dir.add_team(Team {
            id: team_id,
            name: "sre".to_string(),
            chat_channel_id: Some("C0INCIDENTS".to_string()),
            email: None,
            members: vec![on_call.id],
            manager: None,
            current_on_call: Some(on_call.id),
        });
        dir.add_service(Service {
            id: service_id,
            name: "checkout-api".to_string(),
            owner_team: Some(team_id),
            runbook_url: Some("https://runbooks.example.com/checkout".to_string()),
        });
        (dir, team_id, service_id)
    }

    fn router_for(dir: Directory) -> Router {
        Router::new(
            ChannelSet::new(),
            Dispatcher::default(),
            Arc::new(dir),
            Arc::new(IncidentStore::new()),
        )
    }

    #[test]
    fn test_recipients_merge_team_and_scopes() {
        let (mut dir, _, service_id) = directory_with_team();
        let scope_id = Uuid::new_v4();
        dir.add_scope(ImpactScope {
            id: scope_id,
            name: "GDPR".to_string(),
            mandatory_notify_email: Some("dpo@example.com".to_string()),
            is_active: true,
        });

        let router = router_for(dir);
        let mut incident = Incident::new(
            "Checkout down".to_string(),
            String::new(),
            Some(service_id),
            Severity::Sev1Critical,
            None,
        );
        incident.impacted_scopes.push(scope_id);

        let recipients = router.get_recipients(&incident, Utc::now());
        assert_eq!(recipients.chat_channels, vec!["C0INCIDENTS"]);
        assert_eq!(recipients.emails, vec!["alice@example.com", "dpo@example.com"]);
        // SEV1 adds the on-call's phone.
        assert_eq!(recipients.sms_numbers, vec!["+33612345678"]);
    }

    #[test]
    fn test_sms_only_for_sev1_broadcasts() {
        let (dir, _, service_id) = directory_with_team();
        let router = router_for(dir);
        let incident = Incident::new(
            "Elevated errors".to_string(),
            String::new(),
            Some(service_id),
            Severity::Sev2High,
            None,
        );

        let recipients = router.get_recipients(&incident, Utc::now());
        assert!(recipients.sms_numbers.is_empty());
        assert!(!recipients.emails.is_empty());
    }

    #[test]
    fn test_recipient_emails_are_deduplicated() {
        let (mut dir, _, service_id) = directory_with_team();
        let scope_id = Uuid::new_v4();
        // Scope contact that duplicates the on-call address.
        dir.add_scope(ImpactScope {
            id: scope_id,
            name: "Ops".to_string(),
            mandatory_notify_email: Some("alice@example.com".to_string()),
            is_active: true,
        });

        let router = router_for(dir);
        let mut incident = Incident::new(
            "t".to_string(),
            String::new(),
            Some(service_id),
            Severity::Sev3Medium,
            None,
        );
        incident.impacted_scopes.push(scope_id);

        let recipients = router.get_recipients(&incident, Utc::now());
        assert_eq!(recipients.emails, vec!["alice@example.com"]);
    }

    #[test]
    fn test_message_includes_links_and_labels() {
        let (dir, _, service_id) = directory_with_team();
        let router = router_for(dir);
        let mut incident = Incident::new(
            "Checkout down".to_string(),
            "p99 above 5s".to_string(),
            Some(service_id),
            Severity::Sev1Critical,
            None,
        );
        incident.war_room_url = Some("https://chat.example.com/inc-123".to_string());

        let message = router.build_message(&incident);
        assert_eq!(message.title, "🚨 [SEV1 - Critical] Checkout down");
        assert_eq!(message.service, "checkout-api");
        assert!(message.links.contains("War Room"));
        assert!(message.links.contains("Runbook"));
    }

    #[test]
    fn test_message_without_links_has_placeholder() {
        let router = router_for(Directory::new());
        let incident = Incident::new(
            "t".to_string(),
            String::new(),
            None,
            Severity::Sev4Low,
            None,
        );
        let message = router.build_message(&incident);
        assert_eq!(message.links, "No links available yet.");
        assert_eq!(message.service, "unknown");
        assert_eq!(message.body, "No description provided.");
    }

    #[test]
    fn test_format_duration_since() {
        let now = Utc::now();
        assert_eq!(format_duration_since(now - Duration::minutes(5), now), "5 minutes");
        assert_eq!(
            format_duration_since(now - Duration::minutes(95), now),
            "1h 35min"
        );
        assert_eq!(
            format_duration_since(now - Duration::hours(50), now),
            "2d 2h"
        );
    }

    #[tokio::test]
    async fn test_broadcast_without_recipients_is_empty() {
        let router = router_for(Directory::new());
        let incident = Incident::new(
            "t".to_string(),
            String::new(),
            None,
            Severity::Sev4Low,
            None,
        );
        let report = router.broadcast(&incident).await;
        assert!(report.is_empty());
    }
}
