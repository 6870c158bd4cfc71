//! Slack chat notification channel.
//!
//! Sends incident notifications to channels and users via the Slack Web API
//! (`chat.postMessage`) using a bot token. Recipients are channel IDs
//! (`C0123456789`) or user IDs (`U0123456789`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::message::RenderedMessage;

use super::{ChannelKind, NotifyChannel};

const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// Slack chat channel.
///
/// Required configuration:
/// - `bot_token` — Bot User OAuth token (`xoxb-...`)
///
/// Optional configuration:
/// - `api_base` — API base URL override (used by tests)
pub struct SlackChannel {
    bot_token: String,
    api_base: String,
    client: reqwest::Client,
}

impl SlackChannel {
    /// Create a Slack channel from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::NotConfigured` if `bot_token` is missing.
    pub fn new(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let bot_token = config.require("slack", "bot_token")?.to_string();
        let api_base = config.get_or("api_base", DEFAULT_API_BASE).to_string();

        Ok(Self {
            bot_token,
            api_base,
            client: reqwest::Client::new(),
        })
    }

    /// Format a message as Slack Block Kit blocks.
    fn format_blocks(message: &RenderedMessage) -> Vec<Value> {
        let mut blocks = vec![json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": message.title,
                "emoji": true,
            }
        })];

        let mut fields = vec![];
        if !message.severity.is_empty() {
            fields.push(json!({"type": "mrkdwn", "text": format!("*Severity:*\n{}", message.severity)}));
        }
        if !message.status.is_empty() {
            fields.push(json!({"type": "mrkdwn", "text": format!("*Status:*\n{}", message.status)}));
        }
        if !message.service.is_empty() {
            fields.push(json!({"type": "mrkdwn", "text": format!("*Service:*\n{}", message.service)}));
        }
        if !fields.is_empty() {
            blocks.push(json!({"type": "section", "fields": fields}));
        }

        if !message.body.is_empty() {
            blocks.push(json!({
                "type": "section",
                "text": {"type": "mrkdwn", "text": message.body}
            }));
        }

        if !message.links.is_empty() {
            blocks.push(json!({
                "type": "context",
                "elements": [{"type": "mrkdwn", "text": message.links}]
            }));
        }

        blocks
    }
}

#[async_trait]
impl NotifyChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Chat
    }

    async fn send(&self, recipient: &str, message: &RenderedMessage) -> Result<(), ChannelError> {
        let payload = PostMessageRequest {
            channel: recipient.to_string(),
            text: message.title.clone(),
            blocks: Self::format_blocks(message),
            unfurl_links: false,
            unfurl_media: false,
        };

        debug!(channel = "slack", recipient, "Sending notification");

        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(&self.bot_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);
            return Err(ChannelError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Status {
                service: "slack",
                status: status.as_u16(),
                body,
            });
        }

        let api: PostMessageResponse = response.json().await?;
        if api.ok {
            debug!(channel = "slack", recipient, "Notification sent");
            Ok(())
        } else {
            let error = api.error.unwrap_or_else(|| "unknown_error".to_string());
            warn!(channel = "slack", recipient, error = %error, "Slack API rejected message");
            Err(ChannelError::Rejected(error))
        }
    }
}

#[derive(Debug, Serialize)]
struct PostMessageRequest {
    channel: String,
    text: String,
    blocks: Vec<Value>,
    unfurl_links: bool,
    unfurl_media: bool,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_message() -> RenderedMessage {
        RenderedMessage {
            title: "🚨 [SEV1 - Critical] Redis cluster down".to_string(),
            body: "All nodes unreachable".to_string(),
            severity: "SEV1 - Critical".to_string(),
            status: "Triggered".to_string(),
            service: "redis-cluster".to_string(),
            links: String::new(),
        }
    }

    fn channel_for(server: &MockServer) -> SlackChannel {
        let config = ChannelConfig::from_pairs([
            ("bot_token", "xoxb-test".to_string()),
            ("api_base", server.uri()),
        ]);
        SlackChannel::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_send_posts_to_chat_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(bearer_token("xoxb-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let channel = channel_for(&server);
        channel.send("C0123456789", &test_message()).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_level_error_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"ok": false, "error": "channel_not_found"}),
            ))
            .mount(&server)
            .await;

        let channel = channel_for(&server);
        let err = channel.send("C0MISSING", &test_message()).await.unwrap_err();
        assert!(matches!(err, ChannelError::Rejected(ref e) if e == "channel_not_found"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let channel = channel_for(&server);
        let err = channel.send("C0123456789", &test_message()).await.unwrap_err();
        assert!(matches!(
            err,
            ChannelError::RateLimited { retry_after_secs: 7 }
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn test_blocks_include_fields() {
        let blocks = SlackChannel::format_blocks(&test_message());
        let rendered = serde_json::to_string(&blocks).unwrap();
        assert!(rendered.contains("Redis cluster down"));
        assert!(rendered.contains("SEV1 - Critical"));
        assert!(rendered.contains("redis-cluster"));
    }
}
