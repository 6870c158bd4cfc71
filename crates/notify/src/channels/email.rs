//! SMTP email notification channel.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::message::RenderedMessage;

use super::{ChannelKind, NotifyChannel};

/// SMTP email channel.
///
/// Required configuration:
/// - `host` — SMTP relay host
/// - `username` / `password` — SMTP credentials
/// - `from_email` — sender address
///
/// Optional configuration:
/// - `port` — SMTP port (default 587, STARTTLS)
/// - `from_name` — sender display name (default "Incident Alerts")
pub struct EmailChannel {
    host: String,
    port: u16,
    credentials: Credentials,
    from: Mailbox,
}

impl EmailChannel {
    /// Create an email channel from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::NotConfigured` if required keys are missing or
    /// the sender address is invalid.
    pub fn new(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let host = config.require("email", "host")?.to_string();
        let username = config.require("email", "username")?.to_string();
        let password = config.require("email", "password")?.to_string();
        let from_email = config.require("email", "from_email")?;
        let from_name = config.get_or("from_name", "Incident Alerts");

        let port = config
            .get_or("port", "587")
            .parse()
            .map_err(|_| ChannelError::NotConfigured("email: invalid 'port'".to_string()))?;

        let from: Mailbox = format!("{from_name} <{from_email}>").parse().map_err(|_| {
            ChannelError::NotConfigured(format!("email: invalid 'from_email' {from_email}"))
        })?;

        Ok(Self {
            host,
            port,
            credentials: Credentials::new(username, password),
            from,
        })
    }

    fn format_text_body(message: &RenderedMessage) -> String {
        let mut body = String::new();
        body.push_str(&message.body);
        body.push_str("\n\n");
        if !message.service.is_empty() {
            body.push_str(&format!("Service: {}\n", message.service));
        }
        if !message.severity.is_empty() {
            body.push_str(&format!("Severity: {}\n", message.severity));
        }
        if !message.status.is_empty() {
            body.push_str(&format!("Status: {}\n", message.status));
        }
        if !message.links.is_empty() {
            body.push('\n');
            body.push_str(&message.links);
            body.push('\n');
        }
        body
    }

    fn format_html_body(message: &RenderedMessage) -> String {
        let body = message.body.replace('\n', "<br>");
        let links = message.links.replace('\n', "<br>");
        format!(
            r#"<html>
<body style="font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; padding: 20px;">
  <h2>{title}</h2>
  <p>{body}</p>
  <table cellpadding="4">
    <tr><td><b>Service</b></td><td>{service}</td></tr>
    <tr><td><b>Severity</b></td><td>{severity}</td></tr>
    <tr><td><b>Status</b></td><td>{status}</td></tr>
  </table>
  <p>{links}</p>
</body>
</html>"#,
            title = message.title,
            body = body,
            service = message.service,
            severity = message.severity,
            status = message.status,
            links = links,
        )
    }
}

#[async_trait]
impl NotifyChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, recipient: &str, message: &RenderedMessage) -> Result<(), ChannelError> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|_| ChannelError::Rejected(format!("invalid email address: {recipient}")))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.title.as_str())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(Self::format_text_body(message)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(Self::format_html_body(message)),
                    ),
            )
            .map_err(|e| ChannelError::Other(format!("failed to build email: {e}")))?;

        let mailer: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
                .map_err(|e| ChannelError::Smtp(e.to_string()))?
                .port(self.port)
                .credentials(self.credentials.clone())
                .build();

        match mailer.send(email).await {
            Ok(_) => {
                debug!(channel = "email", recipient, "Notification sent");
                Ok(())
            }
            Err(e) => {
                warn!(channel = "email", recipient, error = %e, "SMTP send failed");
                Err(ChannelError::Smtp(e.to_string()))
            }
        }
    }
}
