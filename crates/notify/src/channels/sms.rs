//! OVH SMS notification channel.
//!
//! Sends SMS through the OVH API v1 (`POST /sms/{serviceName}/jobs`) with
//! per-request signatures. Used for critical incidents where chat and email
//! are too slow.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::message::RenderedMessage;

use super::{ChannelKind, NotifyChannel};

const DEFAULT_ENDPOINT: &str = "https://eu.api.ovh.com/1.0";

/// Single-segment SMS length limit.
const SMS_MAX_LEN: usize = 160;

/// OVH SMS channel.
///
/// Required configuration:
/// - `application_key` / `application_secret` / `consumer_key` — OVH API
///   credentials (create at <https://api.ovh.com/createToken/> with
///   `POST /sms/*/jobs` rights)
/// - `service_name` — SMS service (e.g. `sms-xx12345-1`)
///
/// Optional configuration:
/// - `sender` — sender name, defaults to the service short code
/// - `endpoint` — API endpoint override (used by tests)
pub struct SmsChannel {
    application_key: String,
    application_secret: String,
    consumer_key: String,
    service_name: String,
    sender: Option<String>,
    endpoint: String,
    client: reqwest::Client,
}

impl SmsChannel {
    /// Create an SMS channel from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::NotConfigured` if any credential is missing.
    pub fn new(config: &ChannelConfig) -> Result<Self, ChannelError> {
        Ok(Self {
            application_key: config.require("sms", "application_key")?.to_string(),
            application_secret: config.require("sms", "application_secret")?.to_string(),
            consumer_key: config.require("sms", "consumer_key")?.to_string(),
            service_name: config.require("sms", "service_name")?.to_string(),
            sender: config.get("sender").map(ToString::to_string),
            endpoint: config.get_or("endpoint", DEFAULT_ENDPOINT).to_string(),
            client: reqwest::Client::new(),
        })
    }

    /// Compute the OVH request signature:
    /// `"$1$" + SHA1(AS + "+" + CK + "+" + METHOD + "+" + URL + "+" + BODY + "+" + TS)`
    fn signature(&self, method: &str, url: &str, body: &str, timestamp: &str) -> String {
        let to_sign = [
            self.application_secret.as_str(),
            self.consumer_key.as_str(),
            method,
            url,
            body,
            timestamp,
        ]
        .join("+");

        let mut hasher = Sha1::new();
        hasher.update(to_sign.as_bytes());
        format!("$1${}", hex::encode(hasher.finalize()))
    }

    /// Normalize a phone number to international form.
    fn normalize_phone(phone: &str) -> String {
        let cleaned: String = phone
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect();
        if let Some(rest) = cleaned.strip_prefix("00") {
            format!("+{rest}")
        } else {
            cleaned
        }
    }

    async fn post_job(&self, receivers: Vec<String>, text: String) -> Result<SmsJobResponse, ChannelError> {
        let url = format!("{}/sms/{}/jobs", self.endpoint, self.service_name);
        let payload = SmsJobRequest {
            receivers,
            message: text,
            no_stop_clause: true,
            priority: "high".to_string(),
            sender: self.sender.clone(),
        };
        let body = serde_json::to_string(&payload)?;
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.signature("POST", &url, &body, &timestamp);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-Ovh-Application", &self.application_key)
            .header("X-Ovh-Consumer", &self.consumer_key)
            .header("X-Ovh-Timestamp", &timestamp)
            .header("X-Ovh-Signature", &signature)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Status {
                service: "ovh-sms",
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl NotifyChannel for SmsChannel {
    fn name(&self) -> &'static str {
        "ovh-sms"
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn send(&self, recipient: &str, message: &RenderedMessage) -> Result<(), ChannelError> {
        let phone = Self::normalize_phone(recipient);
        let text = message.compact(SMS_MAX_LEN);

        let result = self.post_job(vec![phone.clone()], text).await?;
        debug!(
            channel = "ovh-sms",
            recipient = %phone,
            job_ids = ?result.ids,
            "SMS sent"
        );
        Ok(())
    }

    /// OVH supports batch sending in a single API call.
    async fn send_batch(
        &self,
        recipients: &[String],
        message: &RenderedMessage,
    ) -> HashMap<String, bool> {
        let phones: Vec<String> = recipients.iter().map(|p| Self::normalize_phone(p)).collect();
        let text = message.compact(SMS_MAX_LEN);

        match self.post_job(phones, text).await {
            Ok(result) => {
                debug!(
                    channel = "ovh-sms",
                    count = recipients.len(),
                    job_ids = ?result.ids,
                    "Batch SMS sent"
                );
                recipients.iter().map(|r| (r.clone(), true)).collect()
            }
            Err(e) => {
                warn!(channel = "ovh-sms", error = %e, "Batch SMS failed");
                recipients.iter().map(|r| (r.clone(), false)).collect()
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SmsJobRequest {
    receivers: Vec<String>,
    message: String,
    no_stop_clause: bool,
    priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SmsJobResponse {
    #[serde(default)]
    ids: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel_for(server: &MockServer) -> SmsChannel {
        let config = ChannelConfig::from_pairs([
            ("application_key", "ak".to_string()),
            ("application_secret", "as".to_string()),
            ("consumer_key", "ck".to_string()),
            ("service_name", "sms-xx12345-1".to_string()),
            ("sender", "Alerts".to_string()),
            ("endpoint", server.uri()),
        ]);
        SmsChannel::new(&config).unwrap()
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(SmsChannel::normalize_phone("+33 6 12 34 56 78"), "+33612345678");
        assert_eq!(SmsChannel::normalize_phone("0033612345678"), "+33612345678");
        assert_eq!(SmsChannel::normalize_phone("06-12-34-56-78"), "0612345678");
    }

    #[test]
    fn test_signature_is_stable() {
        let config = ChannelConfig::from_pairs([
            ("application_key", "ak"),
            ("application_secret", "as"),
            ("consumer_key", "ck"),
            ("service_name", "svc"),
        ]);
        let channel = SmsChannel::new(&config).unwrap();

        let a = channel.signature("POST", "https://x/sms/svc/jobs", "{}", "1700000000");
        let b = channel.signature("POST", "https://x/sms/svc/jobs", "{}", "1700000000");
        assert_eq!(a, b);
        assert!(a.starts_with("$1$"));

        let c = channel.signature("POST", "https://x/sms/svc/jobs", "{}", "1700000001");
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_send_posts_signed_job() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sms/sms-xx12345-1/jobs"))
            .and(header_exists("X-Ovh-Signature"))
            .and(header_exists("X-Ovh-Timestamp"))
            .and(header_exists("X-Ovh-Application"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ids": [1]})))
            .expect(1)
            .mount(&server)
            .await;

        let channel = channel_for(&server);
        let message = RenderedMessage {
            title: "Redis cluster down".to_string(),
            severity: "SEV1 - Critical".to_string(),
            ..Default::default()
        };
        channel.send("+33612345678", &message).await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let channel = channel_for(&server);
        let err = channel
            .send("+33612345678", &RenderedMessage::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
