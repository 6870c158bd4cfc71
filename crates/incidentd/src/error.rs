//! Error types for the incident engine.

use thiserror::Error;

/// Errors surfaced to engine callers.
///
/// Invalid status transitions are deliberately NOT errors: the orchestrator
/// treats them as warn-and-no-op, so callers that need a hard failure must
/// check incident state first. Validation and configuration problems, by
/// contrast, always surface and are never retried.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller-supplied data is invalid (missing title, unresolvable service)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Operator-supplied configuration is invalid (bad rule pattern, bad
    /// policy); detected at construction time, not at use time
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Engine result alias.
pub type EngineResult<T> = Result<T, EngineError>;
