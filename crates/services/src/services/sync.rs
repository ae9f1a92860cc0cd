//! Background refresh of the board from the back office.

use std::{future::Future, sync::Arc, time::Duration};

use domain::models::{Entity, EntityId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::{task::JoinHandle, time::interval};
use tracing::{debug, info, warn};

use super::{
    api::{ApiError, BackOfficeApi, PageQuery},
    board::{Board, BoardState},
    entity_store::{EntityStore, LoadOutcome},
    notification::NotificationService,
    projection::IncidentFilters,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub interval: Duration,
    /// Items requested per list call.
    pub fetch_size: u32,
    /// Restrict clients to one company.
    pub company_id: Option<EntityId>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            fetch_size: PageQuery::DEFAULT_SIZE,
            company_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    pub incidents: LoadOutcome,
    pub technicians: LoadOutcome,
    pub clients: LoadOutcome,
    pub companies: LoadOutcome,
}

impl RefreshReport {
    pub fn is_ok(&self) -> bool {
        [
            &self.incidents,
            &self.technicians,
            &self.clients,
            &self.companies,
        ]
        .iter()
        .all(|o| !matches!(o, LoadOutcome::Failed(_)))
    }
}

/// Keeps the board in step with the back office.
///
/// Each refresh takes a load ticket before calling the API, so when two
/// fetches of the same collection overlap only the one issued last can land.
#[derive(Clone)]
pub struct SyncService {
    api: Arc<dyn BackOfficeApi>,
    board: Board,
    notifications: NotificationService,
    settings: SyncSettings,
}

impl SyncService {
    pub fn new(
        api: Arc<dyn BackOfficeApi>,
        board: Board,
        notifications: NotificationService,
        settings: SyncSettings,
    ) -> Self {
        Self {
            api,
            board,
            notifications,
            settings,
        }
    }

    /// Spawn the periodic refresh loop. The first refresh runs immediately.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting board sync with interval {:?}, fetch size {}",
            self.settings.interval, self.settings.fetch_size
        );

        let mut interval = interval(self.settings.interval);

        loop {
            interval.tick().await;
            let report = self.refresh_all().await;
            if !report.is_ok() {
                debug!("Board sync finished with failures, keeping last known data");
            }
        }
    }

    pub async fn refresh_all(&self) -> RefreshReport {
        let (incidents, technicians, clients, companies) = tokio::join!(
            self.refresh_incidents(None),
            self.refresh_technicians(),
            self.refresh_clients(),
            self.refresh_companies(),
        );
        RefreshReport {
            incidents,
            technicians,
            clients,
            companies,
        }
    }

    /// Server-side filters narrow what is fetched; the view still applies its own.
    pub async fn refresh_incidents(&self, filters: Option<&IncidentFilters>) -> LoadOutcome {
        let page = PageQuery::new(0, self.settings.fetch_size);
        self.refresh(
            "incidents",
            |board| &mut board.incidents,
            self.api.list_incidents(page, filters),
        )
        .await
    }

    pub async fn refresh_technicians(&self) -> LoadOutcome {
        self.refresh(
            "technicians",
            |board| &mut board.technicians,
            self.api.list_technicians(),
        )
        .await
    }

    pub async fn refresh_clients(&self) -> LoadOutcome {
        let page = PageQuery::new(0, self.settings.fetch_size);
        self.refresh(
            "clients",
            |board| &mut board.clients,
            self.api.list_clients(self.settings.company_id.as_ref(), page),
        )
        .await
    }

    pub async fn refresh_companies(&self) -> LoadOutcome {
        self.refresh(
            "companies",
            |board| &mut board.companies,
            self.api.list_companies(),
        )
        .await
    }

    async fn refresh<T, S, F>(&self, collection: &'static str, select: S, fetch: F) -> LoadOutcome
    where
        T: Entity + DeserializeOwned,
        S: Fn(&mut BoardState) -> &mut EntityStore<T>,
        F: Future<Output = Result<Value, ApiError>>,
    {
        let ticket = select(&mut *self.board.write()).begin_load();
        let response = fetch.await;

        let (outcome, previously_failed) = {
            let mut board = self.board.write();
            let store = select(&mut *board);
            let previously_failed = store.last_error().is_some();
            (store.complete_load(ticket, response), previously_failed)
        };

        match &outcome {
            LoadOutcome::Applied { count, total } => {
                debug!(collection, count, total, "Collection refreshed");
                if previously_failed {
                    info!(collection, "Collection refresh recovered");
                }
            }
            LoadOutcome::Stale { ticket, latest } => {
                debug!(collection, ticket, latest, "Discarded stale response");
            }
            LoadOutcome::Failed(error) => {
                warn!(collection, error = %error, retryable = error.is_retryable(), "Collection refresh failed");
                if !previously_failed {
                    self.notifications.warning(format!(
                        "Impossible de rafraîchir la liste ({collection}) : {error}"
                    ));
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use domain::models::{
        client::{Client, CreateClient, UpdateClient},
        incident::{CreateIncident, Incident, UpdateIncident},
        technician::{Technician, UpdateTechnician},
    };
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::time::sleep;

    use super::*;
    use crate::services::{
        entity_store::StoreError,
        memory_api::{InMemoryBackOfficeApi, Operation},
    };

    fn service(api: Arc<dyn BackOfficeApi>) -> SyncService {
        SyncService::new(
            api,
            Board::new(),
            NotificationService::default(),
            SyncSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_refresh_all_fills_every_collection() {
        let api = Arc::new(InMemoryBackOfficeApi::seeded());
        let sync = service(api);
        let report = sync.refresh_all().await;
        assert!(report.is_ok());

        let board = sync.board.read();
        assert_eq!(board.incidents.len(), 5);
        assert_eq!(board.technicians.len(), 4);
        assert_eq!(board.clients.len(), 3);
        assert_eq!(board.companies.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_refresh_keeps_data_and_warns_once() {
        let api = Arc::new(InMemoryBackOfficeApi::seeded());
        let sync = service(api.clone());
        sync.refresh_technicians().await;
        let before = sync.board.technicians();

        api.respond_raw(Operation::ListTechnicians, json!({ "message": "maintenance" }));
        api.respond_raw(Operation::ListTechnicians, json!("maintenance"));
        let first = sync.refresh_technicians().await;
        let second = sync.refresh_technicians().await;

        assert!(matches!(first, LoadOutcome::Failed(StoreError::MalformedResponse(_))));
        assert!(matches!(second, LoadOutcome::Failed(_)));
        assert!(Arc::ptr_eq(&before, &sync.board.technicians()));
        assert_eq!(sync.notifications.list().len(), 1);

        assert!(sync.refresh_technicians().await.is_applied());
        assert!(sync.board.read().technicians.last_error().is_none());
    }

    #[tokio::test]
    async fn test_network_failure_is_retryable() {
        let api = Arc::new(InMemoryBackOfficeApi::seeded());
        api.fail_next(Operation::ListClients, ApiError::Timeout);
        let sync = service(api);

        match sync.refresh_clients().await {
            LoadOutcome::Failed(error) => assert!(error.is_retryable()),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(sync.board.clients().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_refreshes_on_interval() {
        let api = Arc::new(InMemoryBackOfficeApi::seeded());
        let settings = SyncSettings {
            interval: Duration::from_secs(10),
            ..Default::default()
        };
        let sync = SyncService::new(
            api.clone(),
            Board::new(),
            NotificationService::default(),
            settings,
        );
        let board = sync.board.clone();
        let handle = sync.spawn();

        sleep(Duration::from_millis(1)).await;
        assert_eq!(api.calls(Operation::ListIncidents), 1);
        assert_eq!(board.incidents().len(), 5);

        sleep(Duration::from_secs(25)).await;
        assert_eq!(api.calls(Operation::ListIncidents), 3);
        handle.abort();
    }

    /// Delays `list_incidents` answers by queued durations.
    struct SlowIncidents {
        inner: InMemoryBackOfficeApi,
        delays: Mutex<VecDeque<(Duration, Value)>>,
    }

    #[async_trait]
    impl BackOfficeApi for SlowIncidents {
        async fn list_incidents(
            &self,
            page: PageQuery,
            filters: Option<&IncidentFilters>,
        ) -> Result<Value, ApiError> {
            let next = self.delays.lock().pop_front();
            match next {
                Some((delay, payload)) => {
                    sleep(delay).await;
                    Ok(payload)
                }
                None => self.inner.list_incidents(page, filters).await,
            }
        }

        async fn list_technicians(&self) -> Result<Value, ApiError> {
            self.inner.list_technicians().await
        }

        async fn list_clients(
            &self,
            company_id: Option<&EntityId>,
            page: PageQuery,
        ) -> Result<Value, ApiError> {
            self.inner.list_clients(company_id, page).await
        }

        async fn list_companies(&self) -> Result<Value, ApiError> {
            self.inner.list_companies().await
        }

        async fn create_incident(&self, data: &CreateIncident) -> Result<Incident, ApiError> {
            self.inner.create_incident(data).await
        }

        async fn update_incident(
            &self,
            id: &EntityId,
            patch: &UpdateIncident,
        ) -> Result<Incident, ApiError> {
            self.inner.update_incident(id, patch).await
        }

        async fn delete_incident(&self, id: &EntityId) -> Result<(), ApiError> {
            self.inner.delete_incident(id).await
        }

        async fn update_technician(
            &self,
            id: &EntityId,
            patch: &UpdateTechnician,
        ) -> Result<Technician, ApiError> {
            self.inner.update_technician(id, patch).await
        }

        async fn create_client(&self, data: &CreateClient) -> Result<Client, ApiError> {
            self.inner.create_client(data).await
        }

        async fn update_client(
            &self,
            id: &EntityId,
            patch: &UpdateClient,
        ) -> Result<Client, ApiError> {
            self.inner.update_client(id, patch).await
        }

        async fn delete_client(&self, id: &EntityId) -> Result<(), ApiError> {
            self.inner.delete_client(id).await
        }
    }

    fn incidents_payload(ids: &[i64]) -> Value {
        Value::Array(
            ids.iter()
                .map(|id| {
                    json!({
                        "id": id,
                        "clientId": 10,
                        "caller": "Standard",
                        "description": "Panne",
                        "createdAt": "2024-03-01T09:00:00Z"
                    })
                })
                .collect(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_earlier_response_does_not_overwrite_newer_one() {
        let api = Arc::new(SlowIncidents {
            inner: InMemoryBackOfficeApi::new(),
            delays: Mutex::new(VecDeque::from([
                (Duration::from_secs(5), incidents_payload(&[1, 2, 3])),
                (Duration::from_millis(10), incidents_payload(&[4])),
            ])),
        });
        let sync = service(api);

        let (slow, fast) = tokio::join!(
            sync.refresh_incidents(None),
            sync.refresh_incidents(None)
        );
        assert!(fast.is_applied());
        assert!(matches!(slow, LoadOutcome::Stale { .. }));

        let incidents = sync.board.incidents();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].id, EntityId::from(4));
    }
}
