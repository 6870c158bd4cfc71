//! Notification channel implementations.

pub mod email;
pub mod slack;
pub mod sms;
pub mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::message::RenderedMessage;

/// Categories of delivery channels the router can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Chat channels and direct messages (Slack API)
    Chat,
    /// Email (SMTP)
    Email,
    /// SMS (OVH SMS API)
    Sms,
    /// Generic outbound webhooks
    Webhook,
}

impl ChannelKind {
    /// Display name for logs and reports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Webhook => "webhook",
        }
    }
}

/// Trait for notification channels (chat, email, SMS, webhooks).
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Get the name of this channel.
    fn name(&self) -> &'static str;

    /// Which delivery category this channel serves.
    fn kind(&self) -> ChannelKind;

    /// Default recipient to use when the caller has none, if the channel
    /// configuration provides one (e.g. a webhook's configured URL).
    fn default_recipient(&self) -> Option<String> {
        None
    }

    /// Send a message to a single recipient.
    async fn send(&self, recipient: &str, message: &RenderedMessage) -> Result<(), ChannelError>;

    /// Send a message to multiple recipients.
    ///
    /// The default implementation sends sequentially and reports per-recipient
    /// success; channels with native batch APIs override this.
    async fn send_batch(
        &self,
        recipients: &[String],
        message: &RenderedMessage,
    ) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for recipient in recipients {
            let ok = self.send(recipient, message).await.is_ok();
            results.insert(recipient.clone(), ok);
        }
        results
    }
}

/// The channels available to the router, built once at startup.
///
/// There is no process-wide registry: the set is constructed explicitly from
/// configuration and passed by reference into whatever needs to dispatch.
#[derive(Default, Clone)]
pub struct ChannelSet {
    channels: HashMap<ChannelKind, Arc<dyn NotifyChannel>>,
}

impl ChannelSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel, replacing any previous channel of the same kind.
    pub fn insert(&mut self, channel: Arc<dyn NotifyChannel>) {
        self.channels.insert(channel.kind(), channel);
    }

    /// Get the channel for a delivery category.
    #[must_use]
    pub fn get(&self, kind: ChannelKind) -> Option<&Arc<dyn NotifyChannel>> {
        self.channels.get(&kind)
    }

    /// Whether no channels are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of configured channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }
}

/// Build a channel from its type name and configuration.
///
/// # Errors
///
/// Returns `ChannelError::NotConfigured` if required keys are missing, or if
/// the type name is unknown.
pub fn build_channel(
    kind: &str,
    config: &ChannelConfig,
) -> Result<Arc<dyn NotifyChannel>, ChannelError> {
    match kind.to_ascii_lowercase().as_str() {
        "slack" | "chat" => Ok(Arc::new(slack::SlackChannel::new(config)?)),
        "smtp" | "email" => Ok(Arc::new(email::EmailChannel::new(config)?)),
        "ovh_sms" | "sms" => Ok(Arc::new(sms::SmsChannel::new(config)?)),
        "webhook" => Ok(Arc::new(webhook::WebhookChannel::new(config)?)),
        other => Err(ChannelError::NotConfigured(format!(
            "unknown channel type '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_set_replaces_same_kind() {
        let mut set = ChannelSet::new();
        assert!(set.is_empty());

        let config = ChannelConfig::from_pairs([("url", "https://hooks.example.com/a")]);
        set.insert(build_channel("webhook", &config).unwrap());
        let config = ChannelConfig::from_pairs([("url", "https://hooks.example.com/b")]);
        set.insert(build_channel("webhook", &config).unwrap());

        assert_eq!(set.len(), 1);
        assert!(set.get(ChannelKind::Webhook).is_some());
        assert!(set.get(ChannelKind::Chat).is_none());
    }

    #[test]
    fn test_build_channel_unknown_type() {
        let err = build_channel("pigeon", &ChannelConfig::default()).err().unwrap();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }

    #[test]
    fn test_build_channel_fails_fast_on_missing_config() {
        let err = build_channel("slack", &ChannelConfig::default()).err().unwrap();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }
}
