//! War-room collaborator interface.
//!
//! War rooms are ephemeral collaboration channels created by an external
//! system (chat platform integration). The engine only asks for creation and
//! archival; both are best-effort and never fatal to the incident lifecycle.

use async_trait::async_trait;
use tracing::debug;

use super::Incident;

/// External war-room creator/archiver.
#[async_trait]
pub trait WarRoomHub: Send + Sync {
    /// Create a war room for an incident. Returns `(channel_id, channel_url)`
    /// on success, `None` on failure (which the caller logs and ignores).
    async fn create_war_room(&self, incident: &Incident) -> Option<(String, String)>;

    /// Archive a war-room channel. Returns whether archival succeeded.
    async fn archive_war_room(&self, channel_id: &str) -> bool;
}

/// No-op hub for deployments without a chat integration, and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledWarRoom;

#[async_trait]
impl WarRoomHub for DisabledWarRoom {
    async fn create_war_room(&self, incident: &Incident) -> Option<(String, String)> {
        debug!(incident = %incident.short_id(), "War-room integration disabled, skipping creation");
        None
    }

    async fn archive_war_room(&self, channel_id: &str) -> bool {
        debug!(channel_id, "War-room integration disabled, skipping archive");
        false
    }
}
