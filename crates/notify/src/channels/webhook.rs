//! Generic outbound webhook channel.
//!
//! Posts incident notifications as JSON to an arbitrary HTTP endpoint, for
//! integrating with external alerting systems (PagerDuty-style receivers,
//! Teams connectors, internal tooling). The recipient may be a URL, which
//! overrides the configured default.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::message::RenderedMessage;

use super::{ChannelKind, NotifyChannel};

/// Generic webhook channel.
///
/// Required configuration:
/// - `url` — default endpoint to POST to
///
/// Optional configuration:
/// - `authorization` — value for the `Authorization` header
pub struct WebhookChannel {
    url: String,
    authorization: Option<String>,
    client: reqwest::Client,
}

impl WebhookChannel {
    /// Create a webhook channel from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::NotConfigured` if `url` is missing.
    pub fn new(config: &ChannelConfig) -> Result<Self, ChannelError> {
        Ok(Self {
            url: config.require("webhook", "url")?.to_string(),
            authorization: config.get("authorization").map(ToString::to_string),
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl NotifyChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    fn default_recipient(&self) -> Option<String> {
        Some(self.url.clone())
    }

    async fn send(&self, recipient: &str, message: &RenderedMessage) -> Result<(), ChannelError> {
        let url = if recipient.starts_with("http") {
            recipient
        } else {
            self.url.as_str()
        };

        let payload = WebhookPayload {
            source: "incidentd",
            event_type: "incident",
            title: &message.title,
            description: &message.body,
            severity: &message.severity,
            status: &message.status,
            service: &message.service,
            links: &message.links,
            timestamp: Utc::now().to_rfc3339(),
        };

        let mut request = self.client.post(url).json(&payload);
        if let Some(auth) = &self.authorization {
            request = request.header("Authorization", auth);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            debug!(channel = "webhook", url, "Notification sent");
            return Ok(());
        }

        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);
            return Err(ChannelError::RateLimited { retry_after_secs });
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            channel = "webhook",
            url,
            status = status.as_u16(),
            "Webhook request failed"
        );
        Err(ChannelError::Status {
            service: "webhook",
            status: status.as_u16(),
            body,
        })
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    source: &'static str,
    event_type: &'static str,
    title: &'a str,
    description: &'a str,
    severity: &'a str,
    status: &'a str,
    service: &'a str,
    links: &'a str,
    timestamp: String,
}
