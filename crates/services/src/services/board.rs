//! The set of entity stores shared by the dispatcher, the sync loop and the server.

use std::sync::Arc;

use domain::models::{
    client::Client, company::Company, incident::Incident, technician::Technician,
};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::entity_store::EntityStore;

#[derive(Debug, Default)]
pub struct BoardState {
    pub incidents: EntityStore<Incident>,
    pub technicians: EntityStore<Technician>,
    pub clients: EntityStore<Client>,
    pub companies: EntityStore<Company>,
}

/// Cloneable handle to the shared [`BoardState`].
///
/// Guards are synchronous and must be dropped before any `.await`.
#[derive(Debug, Clone, Default)]
pub struct Board {
    state: Arc<RwLock<BoardState>>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: BoardState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, BoardState> {
        self.state.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, BoardState> {
        self.state.write()
    }

    pub fn incidents(&self) -> Arc<Vec<Incident>> {
        self.state.read().incidents.snapshot()
    }

    pub fn technicians(&self) -> Arc<Vec<Technician>> {
        self.state.read().technicians.snapshot()
    }

    pub fn clients(&self) -> Arc<Vec<Client>> {
        self.state.read().clients.snapshot()
    }

    pub fn companies(&self) -> Arc<Vec<Company>> {
        self.state.read().companies.snapshot()
    }
}
