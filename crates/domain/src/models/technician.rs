use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use ts_rs::TS;

use super::{Entity, EntityId};

/// Rough workload flag, not a schedule.
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
pub enum Availability {
    #[default]
    #[serde(rename = "DISPONIBLE", alias = "AVAILABLE")]
    #[strum(to_string = "DISPONIBLE", serialize = "AVAILABLE")]
    Available,
    #[serde(rename = "OCCUPE", alias = "BUSY")]
    #[strum(to_string = "OCCUPE", serialize = "BUSY")]
    Busy,
    #[serde(rename = "HORS_LIGNE", alias = "OFFLINE")]
    #[strum(to_string = "HORS_LIGNE", serialize = "OFFLINE")]
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Technician {
    pub id: EntityId,
    #[serde(default)]
    pub company_id: Option<EntityId>,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub availability: Availability,
}

impl Entity for Technician {
    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl Technician {
    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }

    pub fn apply_patch(&mut self, patch: &UpdateTechnician) {
        if let Some(availability) = patch.availability {
            self.availability = availability;
        }
        if let Some(phone) = &patch.phone {
            self.phone = Some(phone.clone());
        }
        if let Some(email) = &patch.email {
            self.email = Some(email.clone());
        }
        if let Some(specialization) = &patch.specialization {
            self.specialization = Some(specialization.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTechnician {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
}

impl UpdateTechnician {
    pub fn availability(availability: Availability) -> Self {
        Self {
            availability: Some(availability),
            ..Default::default()
        }
    }
}
