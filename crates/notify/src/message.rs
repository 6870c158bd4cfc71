//! Channel-agnostic rendered message.

use serde::{Deserialize, Serialize};

/// A rendered notification message.
///
/// All fields are plain strings; channel-specific formatting (Block Kit,
/// HTML email, SMS truncation) is the responsibility of each channel
/// implementation, never of the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderedMessage {
    /// Short headline, e.g. `🚨 [SEV1 - Critical] Redis cluster down`
    pub title: String,
    /// Main body text
    pub body: String,
    /// Severity display label
    pub severity: String,
    /// Incident status display label
    pub status: String,
    /// Affected service name
    pub service: String,
    /// Newline-joined reference links (war room, runbook)
    pub links: String,
}

impl RenderedMessage {
    /// Compact single-string rendering used by width-constrained channels.
    #[must_use]
    pub fn compact(&self, max_len: usize) -> String {
        let mut text = format!("[{}] {}", self.severity, self.title);
        if !self.service.is_empty() {
            text.push_str(&format!(" | {}", self.service));
        }
        if text.len() > max_len {
            let mut cut = max_len.saturating_sub(3);
            while cut > 0 && !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("...");
        }
        text
    }
}
