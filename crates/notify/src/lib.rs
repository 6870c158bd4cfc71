//! Notification channels for incident alerts.
//!
//! This crate provides the delivery side of the incident engine: a uniform
//! [`NotifyChannel`] contract implemented by each channel (chat, email, SMS,
//! generic webhooks), an explicit [`ChannelSet`] built once at startup, and a
//! [`Dispatcher`] that handles timeouts, bounded retries with exponential
//! backoff, and per-recipient failure isolation.
//!
//! # Usage
//!
//! ```no_run
//! use notify::{build_channel, ChannelConfig, DispatchJob, Dispatcher, RenderedMessage};
//!
//! # async fn example() -> Result<(), notify::ChannelError> {
//! let config = ChannelConfig::from_pairs([("url", "https://hooks.example.com/incidents")]);
//! let webhook = build_channel("webhook", &config)?;
//!
//! let dispatcher = Dispatcher::default();
//! let message = RenderedMessage {
//!     title: "🚨 [SEV2 - High] Queue lag".to_string(),
//!     ..Default::default()
//! };
//! let report = dispatcher
//!     .fan_out(vec![DispatchJob::new(webhook, "")], &message)
//!     .await;
//! assert_eq!(report.failed_count(), 0);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`NotifyChannel`] defines the interface for notification channels
//! - [`SlackChannel`], [`EmailChannel`], [`SmsChannel`], [`WebhookChannel`]
//!   implement it; each validates its configuration at construction time
//! - [`ChannelSet`] is the explicit channel map handed to the router — there
//!   is no process-wide mutable registry
//! - [`Dispatcher`] owns retry/timeout policy; channels only know how to
//!   perform one send

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;

pub use channels::email::EmailChannel;
pub use channels::slack::SlackChannel;
pub use channels::sms::SmsChannel;
pub use channels::webhook::WebhookChannel;
pub use channels::{build_channel, ChannelKind, ChannelSet, NotifyChannel};
pub use config::ChannelConfig;
pub use dispatch::{DispatchConfig, DispatchJob, DispatchReport, Dispatcher};
pub use error::ChannelError;
pub use message::RenderedMessage;
