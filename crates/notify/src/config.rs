//! Per-channel configuration blobs.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Opaque key/value configuration for one channel instance.
///
/// Channels validate their required keys at construction time, so a
/// misconfigured channel fails fast instead of failing on the first send.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelConfig(HashMap<String, String>);

impl ChannelConfig {
    /// Create a config from key/value pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Get an optional value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Get a value or a default.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Get a required value, or a `NotConfigured` error naming the key.
    pub fn require(&self, channel: &str, key: &str) -> Result<&str, ChannelError> {
        self.get(key)
            .ok_or_else(|| ChannelError::NotConfigured(format!("{channel}: missing '{key}'")))
    }
}
