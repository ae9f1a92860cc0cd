use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;
use ts_rs::TS;

use super::{Entity, EntityId, ValidationError, require};

/// Separator placed between two comments in an incident's notes.
pub const NOTES_SEPARATOR: &str = "\n\n";

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    TS,
    EnumString,
    EnumIter,
    Display,
    Default,
)]
#[strum(ascii_case_insensitive)]
pub enum IncidentPriority {
    #[serde(rename = "BASSE", alias = "LOW")]
    #[strum(to_string = "BASSE", serialize = "LOW")]
    Low,
    #[default]
    #[serde(rename = "MOYENNE", alias = "MEDIUM")]
    #[strum(to_string = "MOYENNE", serialize = "MEDIUM")]
    Medium,
    #[serde(rename = "HAUTE", alias = "HIGH")]
    #[strum(to_string = "HAUTE", serialize = "HIGH")]
    High,
    #[serde(rename = "URGENTE", alias = "URGENT")]
    #[strum(to_string = "URGENTE", serialize = "URGENT")]
    Urgent,
}

/// Lifecycle of a ticket. `Open` is initial, `Closed` is terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    TS,
    EnumString,
    EnumIter,
    Display,
    Default,
)]
#[strum(ascii_case_insensitive)]
pub enum IncidentStatus {
    #[default]
    #[serde(rename = "OUVERT", alias = "OPEN")]
    #[strum(to_string = "OUVERT", serialize = "OPEN")]
    Open,
    #[serde(rename = "ASSIGNE", alias = "ASSIGNED")]
    #[strum(to_string = "ASSIGNE", serialize = "ASSIGNED")]
    Assigned,
    #[serde(rename = "EN_COURS", alias = "IN_PROGRESS")]
    #[strum(to_string = "EN_COURS", serialize = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "RESOLU", alias = "RESOLVED")]
    #[strum(to_string = "RESOLU", serialize = "RESOLVED")]
    Resolved,
    #[serde(rename = "FERME", alias = "CLOSED")]
    #[strum(to_string = "FERME", serialize = "CLOSED")]
    Closed,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("cannot move incident from {from} to {to}")]
pub struct InvalidTransition {
    pub from: IncidentStatus,
    pub to: IncidentStatus,
}

impl IncidentStatus {
    pub fn can_transition_to(self, next: IncidentStatus) -> bool {
        use IncidentStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Open, Assigned)
                | (Open, InProgress)
                | (Assigned, InProgress)
                | (Assigned, Resolved)
                | (InProgress, Resolved)
                | (Resolved, Closed)
        )
    }

    pub fn transition(self, next: IncidentStatus) -> Result<IncidentStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_terminal(self) -> bool {
        self == IncidentStatus::Closed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: EntityId,
    pub client_id: EntityId, // Set at creation, never reassigned
    pub caller: String,
    pub description: String,
    #[serde(default)]
    pub equipment: Option<String>,
    #[serde(default)]
    pub priority: IncidentPriority,
    #[serde(default)]
    pub status: IncidentStatus,
    #[serde(default)]
    pub technician_id: Option<EntityId>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Incident {
    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl Incident {
    /// Notes after appending `comment` as the newest entry.
    pub fn notes_with_comment(&self, comment: &str) -> String {
        match self.notes.as_deref().filter(|n| !n.is_empty()) {
            Some(existing) => format!("{existing}{NOTES_SEPARATOR}{comment}"),
            None => comment.to_string(),
        }
    }

    /// Individual comments in chronological order.
    pub fn comments(&self) -> Vec<&str> {
        self.notes
            .as_deref()
            .map(|n| n.split(NOTES_SEPARATOR).filter(|c| !c.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn apply_patch(&mut self, patch: &UpdateIncident) {
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(equipment) = &patch.equipment {
            self.equipment = Some(equipment.clone());
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(technician_id) = &patch.technician_id {
            self.technician_id = technician_id.clone();
        }
        if let Some(notes) = &patch.notes {
            self.notes = Some(notes.clone());
        }
    }

    /// Take the confirmed value of every field `patch` touched and leave the
    /// others as they are locally.
    pub fn settle_patched(&mut self, confirmed: &Incident, patch: &UpdateIncident) {
        if patch.description.is_some() {
            self.description = confirmed.description.clone();
        }
        if patch.equipment.is_some() {
            self.equipment = confirmed.equipment.clone();
        }
        if patch.priority.is_some() {
            self.priority = confirmed.priority;
        }
        if patch.status.is_some() {
            self.status = confirmed.status;
        }
        if patch.technician_id.is_some() {
            self.technician_id = confirmed.technician_id.clone();
        }
        if patch.notes.is_some() {
            self.notes = confirmed.notes.clone();
        }
    }

    /// Build the local, unconfirmed incident shown while the create call is in flight.
    pub fn pending(data: &CreateIncident, created_by: Option<String>) -> Self {
        Self {
            id: EntityId::local(),
            client_id: data.client_id.clone(),
            caller: data.caller.trim().to_string(),
            description: data.description.trim().to_string(),
            equipment: data.equipment.clone(),
            priority: data.priority.unwrap_or_default(),
            status: IncidentStatus::Open,
            technician_id: None,
            notes: None,
            created_by,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateIncident {
    pub client_id: EntityId,
    pub caller: String,
    pub description: String,
    #[serde(default)]
    pub equipment: Option<String>,
    #[serde(default)]
    pub priority: Option<IncidentPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl CreateIncident {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(self.client_id.as_str(), "client")?;
        require(&self.caller, "caller")?;
        require(&self.description, "description")
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIncident {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<IncidentPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    /// `Some(None)` clears the assignment.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    #[ts(type = "string | null")]
    pub technician_id: Option<Option<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn incident(notes: Option<&str>) -> Incident {
        Incident {
            id: EntityId::from(1),
            client_id: EntityId::from(10),
            caller: "M. Durand".to_string(),
            description: "Chambre froide en panne".to_string(),
            equipment: None,
            priority: IncidentPriority::High,
            status: IncidentStatus::Open,
            technician_id: None,
            notes: notes.map(str::to_string),
            created_by: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_forward_transitions_only() {
        use IncidentStatus::*;
        assert!(Open.can_transition_to(Assigned));
        assert!(Open.can_transition_to(InProgress));
        assert!(Assigned.can_transition_to(Resolved));
        assert!(Resolved.can_transition_to(Closed));
        assert!(!Open.can_transition_to(Resolved));
        assert!(!Open.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Open));
        assert!(!Resolved.can_transition_to(InProgress));
        assert!(!Assigned.can_transition_to(Assigned));
        assert_eq!(
            Open.transition(Closed),
            Err(InvalidTransition {
                from: Open,
                to: Closed
            })
        );
        assert!(Closed.is_terminal());
        for next in [Open, Assigned, InProgress, Resolved, Closed] {
            assert!(!Closed.can_transition_to(next));
        }
    }

    #[test]
    fn test_priority_is_ordered() {
        assert!(IncidentPriority::Low < IncidentPriority::Medium);
        assert!(IncidentPriority::High < IncidentPriority::Urgent);
    }

    #[test]
    fn test_wire_values_and_aliases() {
        let status: IncidentStatus = serde_json::from_str("\"OUVERT\"").unwrap();
        assert_eq!(status, IncidentStatus::Open);
        let status: IncidentStatus = serde_json::from_str("\"IN_PROGRESS\"").unwrap();
        assert_eq!(status, IncidentStatus::InProgress);
        assert_eq!(IncidentStatus::from_str("ferme").unwrap(), IncidentStatus::Closed);
        assert_eq!(IncidentPriority::High.to_string(), "HAUTE");
        assert_eq!(
            serde_json::to_string(&IncidentPriority::Urgent).unwrap(),
            "\"URGENTE\""
        );
    }

    #[test]
    fn test_comments_append_in_order() {
        let mut inc = incident(None);
        inc.notes = Some(inc.notes_with_comment("C1"));
        inc.notes = Some(inc.notes_with_comment("C2"));
        assert_eq!(inc.notes.as_deref(), Some("C1\n\nC2"));
        assert_eq!(inc.comments(), vec!["C1", "C2"]);

        let existing = incident(Some("Appel reçu"));
        assert!(existing.notes_with_comment("C1").ends_with("Appel reçu\n\nC1"));
    }

    #[test]
    fn test_create_requires_caller_description_and_client() {
        let mut data = CreateIncident {
            client_id: EntityId::from(3),
            caller: "Mme Petit".to_string(),
            description: "Fuite de gaz".to_string(),
            equipment: None,
            priority: None,
            created_by: None,
        };
        assert!(data.validate().is_ok());

        data.caller = "   ".to_string();
        assert_eq!(data.validate(), Err(ValidationError::MissingField("caller")));

        data.caller = "Mme Petit".to_string();
        data.client_id = EntityId::new("");
        assert_eq!(data.validate(), Err(ValidationError::MissingField("client")));
    }

    #[test]
    fn test_patch_can_clear_technician() {
        let mut inc = incident(None);
        inc.apply_patch(&UpdateIncident {
            status: Some(IncidentStatus::Assigned),
            technician_id: Some(Some(EntityId::from(4))),
            ..Default::default()
        });
        assert_eq!(inc.technician_id, Some(EntityId::from(4)));

        let clear = UpdateIncident {
            technician_id: Some(None),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&clear).unwrap(),
            serde_json::json!({ "technicianId": null })
        );
        inc.apply_patch(&clear);
        assert_eq!(inc.technician_id, None);
        assert_eq!(inc.status, IncidentStatus::Assigned);
    }

    #[test]
    fn test_numeric_ids_from_server_payload() {
        let json = serde_json::json!({
            "id": 5,
            "clientId": 12,
            "caller": "Accueil",
            "description": "Vitrine à 12°C",
            "priority": "HAUTE",
            "status": "OUVERT",
            "createdAt": "2024-03-01T08:00:00Z"
        });
        let inc: Incident = serde_json::from_value(json).unwrap();
        assert_eq!(inc.id, EntityId::from("5"));
        assert_eq!(inc.client_id, EntityId::from("12"));
        assert_eq!(inc.notes, None);
    }

    #[test]
    fn test_settle_keeps_fields_outside_the_patch() {
        let mut local = incident(Some("C1"));
        local.priority = IncidentPriority::Urgent;

        let mut confirmed = incident(None);
        confirmed.status = IncidentStatus::Assigned;
        confirmed.technician_id = Some(EntityId::from(20));

        let patch = UpdateIncident {
            status: Some(IncidentStatus::Assigned),
            technician_id: Some(Some(EntityId::from(20))),
            ..Default::default()
        };
        local.settle_patched(&confirmed, &patch);
        assert_eq!(local.status, IncidentStatus::Assigned);
        assert_eq!(local.technician_id, Some(EntityId::from(20)));
        assert_eq!(local.notes.as_deref(), Some("C1"));
        assert_eq!(local.priority, IncidentPriority::Urgent);
    }
}
