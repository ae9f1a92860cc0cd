//! Remote-access credentials grouped per client and tool.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use domain::models::{
    EntityId,
    client::{Client, RemoteAccess, RemoteAccessKind},
};
use tracing::trace;

pub type AccessesByKind = BTreeMap<RemoteAccessKind, Vec<RemoteAccess>>;
pub type RemoteAccessMap = HashMap<EntityId, AccessesByKind>;

/// Memoized `client -> kind -> credentials` map.
///
/// The map is rebuilt only when handed a clients collection that is not the
/// same allocation as the last one. The source `Arc` is retained so its
/// address cannot be reused by a different collection.
#[derive(Debug, Default)]
pub struct RemoteAccessIndex {
    source: Option<Arc<Vec<Client>>>,
    index: Arc<RemoteAccessMap>,
    rebuilds: usize,
}

impl RemoteAccessIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, clients: &Arc<Vec<Client>>) -> Arc<RemoteAccessMap> {
        let fresh = self
            .source
            .as_ref()
            .is_some_and(|source| Arc::ptr_eq(source, clients));
        if !fresh {
            self.index = Arc::new(build(clients));
            self.source = Some(Arc::clone(clients));
            self.rebuilds += 1;
            trace!(clients = clients.len(), rebuilds = self.rebuilds, "Rebuilt remote access index");
        }
        Arc::clone(&self.index)
    }

    pub fn for_client(&mut self, clients: &Arc<Vec<Client>>, client_id: &EntityId) -> AccessesByKind {
        self.get(clients)
            .get(client_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }
}

fn build(clients: &[Client]) -> RemoteAccessMap {
    clients
        .iter()
        .filter(|client| !client.remote_accesses.is_empty())
        .map(|client| {
            let mut by_kind = AccessesByKind::new();
            for access in &client.remote_accesses {
                by_kind.entry(access.kind).or_default().push(access.clone());
            }
            (client.id.clone(), by_kind)
        })
        .collect()
}
