//! Contract of the remote back-office collaborator (REST, Supabase, ...).

use async_trait::async_trait;
use domain::models::{
    EntityId,
    client::{Client, CreateClient, UpdateClient},
    incident::{CreateIncident, Incident, UpdateIncident},
    technician::{Technician, UpdateTechnician},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::projection::IncidentFilters;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("json error: {0}")]
    Serde(String),
}

impl ApiError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

/// Server-side page window for list calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuery {
    pub page: u32,
    pub size: u32,
}

impl PageQuery {
    pub const DEFAULT_SIZE: u32 = 200;

    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }
}

impl Default for PageQuery {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_SIZE)
    }
}

/// List methods return the undecoded payload: backends answer with either a
/// bare JSON array or an object holding a `content` array, and the entity
/// store is responsible for checking that shape.
#[async_trait]
pub trait BackOfficeApi: Send + Sync {
    async fn list_incidents(
        &self,
        page: PageQuery,
        filters: Option<&IncidentFilters>,
    ) -> Result<Value, ApiError>;

    async fn list_technicians(&self) -> Result<Value, ApiError>;

    async fn list_clients(
        &self,
        company_id: Option<&EntityId>,
        page: PageQuery,
    ) -> Result<Value, ApiError>;

    async fn list_companies(&self) -> Result<Value, ApiError>;

    async fn create_incident(&self, data: &CreateIncident) -> Result<Incident, ApiError>;

    async fn update_incident(
        &self,
        id: &EntityId,
        patch: &UpdateIncident,
    ) -> Result<Incident, ApiError>;

    async fn delete_incident(&self, id: &EntityId) -> Result<(), ApiError>;

    async fn update_technician(
        &self,
        id: &EntityId,
        patch: &UpdateTechnician,
    ) -> Result<Technician, ApiError>;

    async fn create_client(&self, data: &CreateClient) -> Result<Client, ApiError>;

    async fn update_client(&self, id: &EntityId, patch: &UpdateClient)
    -> Result<Client, ApiError>;

    async fn delete_client(&self, id: &EntityId) -> Result<(), ApiError>;
}
