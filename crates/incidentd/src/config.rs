//! Engine configuration.
//!
//! All knobs live in one explicit struct passed into components at
//! construction. Nothing reads process-global mutable state.

use std::time::Duration;

use chrono::Duration as ChronoDuration;

/// Engine configuration knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default suppression window for duplicate alerts, when no rule
    /// overrides it.
    pub suppress_duplicates_minutes: u64,
    /// Interval between escalation/reminder sweep passes.
    pub escalation_sweep_interval: Duration,
    /// Minutes a TRIGGERED incident may sit unacknowledged before the first
    /// reminder goes out.
    pub reminder_threshold_minutes: i64,
    /// Minimum minutes between two reminders for the same incident.
    pub reminder_repeat_minutes: i64,
    /// Age after which a PENDING escalation record is considered abandoned
    /// and becomes retryable.
    pub pending_grace_minutes: i64,
    /// Delay between incident resolution and war-room archival.
    pub war_room_archive_delay: Duration,
    /// Days a RESOLVED incident is kept before the sweeper archives it.
    pub archive_retention_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            suppress_duplicates_minutes: 5,
            escalation_sweep_interval: Duration::from_secs(60),
            reminder_threshold_minutes: 10,
            reminder_repeat_minutes: 15,
            pending_grace_minutes: 5,
            war_room_archive_delay: Duration::from_secs(30 * 60),
            archive_retention_days: 7,
        }
    }
}

impl EngineConfig {
    /// Default suppression window as a chrono duration.
    #[must_use]
    pub fn suppress_window(&self) -> ChronoDuration {
        ChronoDuration::minutes(self.suppress_duplicates_minutes as i64)
    }

    /// Grace window for stale PENDING escalation records.
    #[must_use]
    pub fn pending_grace(&self) -> ChronoDuration {
        ChronoDuration::minutes(self.pending_grace_minutes)
    }
}
