//! Incident engine: alert intake, deduplication, escalation orchestration,
//! and notification routing.
//!
//! The engine ingests normalized alerts from monitoring tools, deduplicates
//! them by fingerprint, matches them against operator rules, drives incidents
//! through acknowledge/resolve transitions, walks timed escalation chains for
//! unacknowledged incidents, and routes notifications across channels via the
//! `notify` crate.
//!
//! Data flow:
//!
//! ```text
//! webhook -> normalize -> fingerprint/dedup -> rules -> orchestrator
//!     -> router (initial notification) <-> escalation engine (periodic sweep)
//! ```

pub mod alert;
pub mod config;
pub mod error;
pub mod escalation;
pub mod incident;
pub mod org;
pub mod routing;
pub mod server;
pub mod sweep;

pub use alert::ingest::{AlertIngestor, IngestAction, IngestReport};
pub use alert::{AlertPayload, AlertSource, AlertState};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use escalation::engine::{EscalationCheck, EscalationEngine};
pub use escalation::{EscalationPolicy, EscalationStep, NotifyKind, PolicySet};
pub use incident::orchestrator::{NewIncident, Orchestrator, ServiceRef};
pub use incident::store::IncidentStore;
pub use incident::warroom::{DisabledWarRoom, WarRoomHub};
pub use incident::{Incident, IncidentStatus, Severity};
pub use org::Directory;
pub use routing::Router;
pub use sweep::Sweeper;
