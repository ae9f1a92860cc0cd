use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use ts_rs::TS;

use super::{Entity, EntityId, ValidationError, require};

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
pub enum ClientStatus {
    #[default]
    #[serde(rename = "ACTIF", alias = "ACTIVE")]
    #[strum(to_string = "ACTIF", serialize = "ACTIVE")]
    Active,
    #[serde(rename = "INACTIF", alias = "INACTIVE")]
    #[strum(to_string = "INACTIF", serialize = "INACTIVE")]
    Inactive,
}

/// Remote-control tool used to reach a site's equipment.
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
    Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum RemoteAccessKind {
    #[serde(alias = "TEAM_VIEWER")]
    Teamviewer,
    #[serde(alias = "ANY_DESK")]
    Anydesk,
    Vnc,
    Rdp,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAccess {
    #[serde(rename = "type", alias = "kind")]
    pub kind: RemoteAccessKind,
    pub identifier: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: EntityId,
    pub company_id: EntityId,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub status: ClientStatus,
    #[serde(default)]
    pub remote_accesses: Vec<RemoteAccess>,
}

impl Entity for Client {
    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl Client {
    pub fn from_create(id: EntityId, data: &CreateClient) -> Self {
        Self {
            id,
            company_id: data.company_id.clone(),
            name: data.name.trim().to_string(),
            address: data.address.clone(),
            contact_name: data.contact_name.clone(),
            phone: data.phone.clone(),
            email: data.email.clone(),
            status: data.status.unwrap_or_default(),
            remote_accesses: data.remote_accesses.clone(),
        }
    }

    pub fn apply_patch(&mut self, patch: &UpdateClient) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(address) = &patch.address {
            self.address = Some(address.clone());
        }
        if let Some(contact_name) = &patch.contact_name {
            self.contact_name = Some(contact_name.clone());
        }
        if let Some(phone) = &patch.phone {
            self.phone = Some(phone.clone());
        }
        if let Some(email) = &patch.email {
            self.email = Some(email.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(remote_accesses) = &patch.remote_accesses {
            self.remote_accesses = remote_accesses.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateClient {
    pub company_id: EntityId,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub status: Option<ClientStatus>,
    #[serde(default)]
    pub remote_accesses: Vec<RemoteAccess>,
}

impl CreateClient {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require(self.company_id.as_str(), "company")?;
        require(&self.name, "name")
    }
}

/// Contact and status fields only; a client's identity and company never change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ClientStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_accesses: Option<Vec<RemoteAccess>>,
}

impl UpdateClient {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.name {
            Some(name) => require(name, "name"),
            None => Ok(()),
        }
    }
}
