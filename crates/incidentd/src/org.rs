//! Organization directory: teams, services, responders, impact scopes, and
//! on-call shifts.
//!
//! The directory is operator-provided reference data, built once at startup
//! and shared read-only across the engine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A person who can lead, acknowledge, or be paged for incidents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Responder {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Chat user ID for direct messages (e.g. `U0123456789`).
    #[serde(default)]
    pub chat_user_id: Option<String>,
}

/// A team responsible for services and incident response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    /// Chat channel ID for team notifications (e.g. `C0123456789`).
    #[serde(default)]
    pub chat_channel_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub members: Vec<Uuid>,
    #[serde(default)]
    pub manager: Option<Uuid>,
    /// Static fallback when no on-call shift covers the current time.
    #[serde(default)]
    pub current_on_call: Option<Uuid>,
}

/// A technical asset or component incidents are filed against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    /// Unique name, used for API lookups and alert label matching.
    pub name: String,
    #[serde(default)]
    pub owner_team: Option<Uuid>,
    #[serde(default)]
    pub runbook_url: Option<String>,
}

/// A transverse impact domain (Legal, Security, PR) with a mandatory
/// notification contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactScope {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub mandatory_notify_email: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// One on-call rotation entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnCallShift {
    pub team: Uuid,
    pub responder: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Escalation tier (1 = primary).
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_level() -> u32 {
    1
}

/// Capability: something that has an assigned lead.
pub trait HasLead {
    fn lead(&self) -> Option<Uuid>;
}

/// Capability: something owned by a team.
pub trait HasOwnerTeam {
    fn owner_team(&self) -> Option<Uuid>;
}

impl HasOwnerTeam for Service {
    fn owner_team(&self) -> Option<Uuid> {
        self.owner_team
    }
}

/// Read-only lookup over the organization.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    responders: HashMap<Uuid, Responder>,
    teams: HashMap<Uuid, Team>,
    services: HashMap<Uuid, Service>,
    scopes: HashMap<Uuid, ImpactScope>,
    shifts: Vec<OnCallShift>,
}

impl Directory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_responder(&mut self, responder: Responder) {
        self.responders.insert(responder.id, responder);
    }

    pub fn add_team(&mut self, team: Team) {
        self.teams.insert(team.id, team);
    }

    pub fn add_service(&mut self, service: Service) {
        self.services.insert(service.id, service);
    }

    pub fn add_scope(&mut self, scope: ImpactScope) {
        self.scopes.insert(scope.id, scope);
    }

    pub fn add_shift(&mut self, shift: OnCallShift) {
        self.shifts.push(shift);
    }

    #[must_use]
    pub fn responder(&self, id: Uuid) -> Option<&Responder> {
        self.responders.get(&id)
    }

    #[must_use]
    pub fn team(&self, id: Uuid) -> Option<&Team> {
        self.teams.get(&id)
    }

    #[must_use]
    pub fn service(&self, id: Uuid) -> Option<&Service> {
        self.services.get(&id)
    }

    #[must_use]
    pub fn scope(&self, id: Uuid) -> Option<&ImpactScope> {
        self.scopes.get(&id)
    }

    /// Look up a service by its exact unique name.
    #[must_use]
    pub fn service_by_name(&self, name: &str) -> Option<&Service> {
        self.services.values().find(|s| s.name == name)
    }

    /// Case-insensitive service lookup, used when matching alert labels.
    #[must_use]
    pub fn service_by_name_ci(&self, name: &str) -> Option<&Service> {
        self.services
            .values()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Resolve the team currently responsible for a service.
    #[must_use]
    pub fn owning_team(&self, service_id: Uuid) -> Option<&Team> {
        let service = self.service(service_id)?;
        self.teams.get(&service.owner_team()?)
    }

    /// Current primary on-call for a team.
    ///
    /// An active level-1 shift wins; the team's static `current_on_call`
    /// field is the fallback.
    #[must_use]
    pub fn current_on_call(&self, team_id: Uuid, now: DateTime<Utc>) -> Option<&Responder> {
        let shift = self
            .shifts
            .iter()
            .find(|s| s.team == team_id && s.level == 1 && s.start <= now && now < s.end);

        let responder_id = match shift {
            Some(shift) => Some(shift.responder),
            None => self.teams.get(&team_id)?.current_on_call,
        }?;

        self.responders.get(&responder_id)
    }

    /// All members of a team.
    #[must_use]
    pub fn team_members(&self, team_id: Uuid) -> Vec<&Responder> {
        let Some(team) = self.teams.get(&team_id) else {
            return Vec::new();
        };
        team.members
            .iter()
            .filter_map(|id| self.responders.get(id))
            .collect()
    }

    /// The team's manager, if one is set.
    #[must_use]
    pub fn team_manager(&self, team_id: Uuid) -> Option<&Responder> {
        let team = self.teams.get(&team_id)?;
        self.responders.get(&team.manager?)
    }

    /// Active impact scopes among the given ids.
    #[must_use]
    pub fn active_scopes(&self, ids: &[Uuid]) -> Vec<&ImpactScope> {
        ids.iter()
            .filter_map(|id| self.scopes.get(id))
            .filter(|s| s.is_active)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn responder(name: &str) -> Responder {
        Responder {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: Some(format!("{name}@example.com")),
            phone: None,
            chat_user_id: None,
        }
    }

    #[test]
    fn test_on_call_shift_beats_static_field() {
        let mut dir = Directory::new();
        let shift_holder = responder("alice");
        let fallback = responder("bob");
        let team_id = Uuid::new_v4();

        dir.add_responder(shift_holder.clone());
        dir.add_responder(fallback.clone());
        dir.add_team(Team {
            id: team_id,
            name: "sre".to_string(),
            chat_channel_id: None,
            email: None,
            members: vec![shift_holder.id, fallback.id],
            manager: None,
            current_on_call: Some(fallback.id),
        });

        let now = Utc::now();
        dir.add_shift(OnCallShift {
            team: team_id,
            responder: shift_holder.id,
            start: now - Duration::hours(1),
            end: now + Duration::hours(1),
            level: 1,
        });

        assert_eq!(dir.current_on_call(team_id, now).unwrap().id, shift_holder.id);

        // Outside the shift the static field wins.
        let later = now + Duration::hours(2);
        assert_eq!(dir.current_on_call(team_id, later).unwrap().id, fallback.id);
    }

    #[test]
    fn test_secondary_shift_is_not_primary_on_call() {
        let mut dir = Directory::new();
        let secondary = responder("carol");
        let team_id = Uuid::new_v4();
        dir.add_responder(secondary.clone());
        dir.add_team(Team {
            id: team_id,
            name: "backend".to_string(),
            chat_channel_id: None,
            email: None,
            members: vec![],
            manager: None,
            current_on_call: None,
        });

        let now = Utc::now();
        dir.add_shift(OnCallShift {
            team: team_id,
            responder: secondary.id,
            start: now - Duration::hours(1),
            end: now + Duration::hours(1),
            level: 2,
        });

        assert!(dir.current_on_call(team_id, now).is_none());
    }

    #[test]
    fn test_service_lookup_is_case_insensitive_for_labels() {
        let mut dir = Directory::new();
        dir.add_service(Service {
            id: Uuid::new_v4(),
            name: "Checkout-API".to_string(),
            owner_team: None,
            runbook_url: None,
        });

        assert!(dir.service_by_name_ci("checkout-api").is_some());
        assert!(dir.service_by_name("checkout-api").is_none());
        assert!(dir.service_by_name("Checkout-API").is_some());
    }

    #[test]
    fn test_active_scopes_filters_inactive() {
        let mut dir = Directory::new();
        let active = Uuid::new_v4();
        let inactive = Uuid::new_v4();
        dir.add_scope(ImpactScope {
            id: active,
            name: "GDPR".to_string(),
            mandatory_notify_email: Some("dpo@example.com".to_string()),
            is_active: true,
        });
        dir.add_scope(ImpactScope {
            id: inactive,
            name: "PR".to_string(),
            mandatory_notify_email: None,
            is_active: false,
        });

        let scopes = dir.active_scopes(&[active, inactive]);
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].name, "GDPR");
    }
}
