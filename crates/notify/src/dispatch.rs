//! Dispatch layer: retries, timeouts, and fan-out.
//!
//! Every `(recipient, channel)` send is independent. A send is bounded by a
//! timeout, transient failures are retried with exponential backoff, and one
//! recipient failing never aborts the others.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::channels::NotifyChannel;
use crate::error::ChannelError;
use crate::message::RenderedMessage;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Dispatch behavior knobs.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum attempts per send (first try included).
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_backoff: Duration,
    /// Per-attempt send timeout.
    pub send_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            send_timeout: Duration::from_secs(10),
        }
    }
}

/// One send unit: a channel and a recipient on it.
#[derive(Clone)]
pub struct DispatchJob {
    pub channel: Arc<dyn NotifyChannel>,
    pub recipient: String,
}

impl DispatchJob {
    #[must_use]
    pub fn new(channel: Arc<dyn NotifyChannel>, recipient: impl Into<String>) -> Self {
        Self {
            channel,
            recipient: recipient.into(),
        }
    }
}

/// Outcome of a fan-out, reported per recipient.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// `(channel name, recipient)` pairs that were delivered.
    pub delivered: Vec<(String, String)>,
    /// `(channel name, recipient, error)` tuples that exhausted retries.
    pub failed: Vec<(String, String, String)>,
}

impl DispatchReport {
    #[must_use]
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True if nothing was attempted at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty() && self.failed.is_empty()
    }

    /// True if at least one send was attempted and every one failed.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.delivered.is_empty() && !self.failed.is_empty()
    }

    /// Merge another report into this one.
    pub fn merge(&mut self, other: DispatchReport) {
        self.delivered.extend(other.delivered);
        self.failed.extend(other.failed);
    }
}

/// Sends messages through channels with retry and timeout handling.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    config: DispatchConfig,
}

impl Dispatcher {
    /// Create a dispatcher with the given configuration.
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    /// Send to a single recipient, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last error once a permanent failure occurs or retries are
    /// exhausted.
    pub async fn send(
        &self,
        channel: &dyn NotifyChannel,
        recipient: &str,
        message: &RenderedMessage,
    ) -> Result<(), ChannelError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let result =
                match tokio::time::timeout(self.config.send_timeout, channel.send(recipient, message))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ChannelError::Timeout {
                        after_secs: self.config.send_timeout.as_secs(),
                    }),
                };

            match result {
                Ok(()) => {
                    debug!(
                        channel = channel.name(),
                        recipient, attempt, "Notification delivered"
                    );
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    let delay = self.backoff(attempt, e.retry_after());
                    warn!(
                        channel = channel.name(),
                        recipient,
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        channel = channel.name(),
                        recipient,
                        attempt,
                        error = %e,
                        "Send failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Send one message through many `(channel, recipient)` pairs concurrently.
    ///
    /// Failures are captured per recipient; sibling sends always run to
    /// completion.
    pub async fn fan_out(&self, jobs: Vec<DispatchJob>, message: &RenderedMessage) -> DispatchReport {
        let sends = jobs.iter().map(|job| async {
            let result = self.send(job.channel.as_ref(), &job.recipient, message).await;
            (job.channel.name().to_string(), job.recipient.clone(), result)
        });

        let mut report = DispatchReport::default();
        for (channel, recipient, result) in join_all(sends).await {
            match result {
                Ok(()) => report.delivered.push((channel, recipient)),
                Err(e) => report.failed.push((channel, recipient, e.to_string())),
            }
        }
        report
    }

    fn backoff(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        let exp = self
            .config
            .base_backoff
            .saturating_mul(2_u32.saturating_pow(attempt - 1));
        let delay = exp.min(MAX_BACKOFF);
        match retry_after {
            Some(secs) => delay.max(Duration::from_secs(secs)),
            None => delay,
        }
    }
}
