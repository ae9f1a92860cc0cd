pub mod client;
pub mod company;
pub mod entity_id;
pub mod incident;
pub mod notification;
pub mod technician;

use thiserror::Error;

pub use entity_id::EntityId;

/// Anything held in an entity store: cloneable and addressed by a canonical id.
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> &EntityId;
}

/// Input rejected before any mutation is attempted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("comment is empty")]
    EmptyComment,
}

pub(crate) fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}
