//! Error types for the notification system.

use thiserror::Error;

/// Errors that can occur when sending notifications.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel is not configured
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Rate limited by the service
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Send did not complete within the dispatch timeout
    #[error("Send timed out after {after_secs}s")]
    Timeout { after_secs: u64 },

    /// Service returned a non-success HTTP status
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The service rejected the recipient or message
    #[error("Recipient rejected: {0}")]
    Rejected(String),

    /// SMTP transport failure
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ChannelError {
    /// Whether the dispatcher should retry this error.
    ///
    /// Network failures, timeouts, rate limits, and 5xx responses are
    /// transient. Configuration problems and explicit rejections are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited { .. } | Self::Timeout { .. } | Self::Smtp(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::NotConfigured(_)
            | Self::Serialization(_)
            | Self::Rejected(_)
            | Self::Other(_) => false,
        }
    }

    /// Suggested minimum delay before retrying, if the service told us.
    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ChannelError::Timeout { after_secs: 10 }.is_transient());
        assert!(ChannelError::RateLimited {
            retry_after_secs: 30
        }
        .is_transient());
        assert!(ChannelError::Status {
            service: "slack",
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!ChannelError::Status {
            service: "slack",
            status: 404,
            body: String::new()
        }
        .is_transient());
        assert!(!ChannelError::Rejected("channel_not_found".to_string()).is_transient());
        assert!(!ChannelError::NotConfigured("bot_token".to_string()).is_transient());
    }

    #[test]
    fn test_retry_after() {
        let err = ChannelError::RateLimited {
            retry_after_secs: 42,
        };
        assert_eq!(err.retry_after(), Some(42));
        assert_eq!(ChannelError::Other("x".to_string()).retry_after(), None);
    }
}
