use std::sync::Arc;

use parking_lot::Mutex;
use services::services::{
    api::BackOfficeApi,
    board::Board,
    config::Config,
    dispatcher::{ActionDispatcher, Operator},
    notification::NotificationService,
    projection::{ClientSortKey, IncidentSortKey, SortState, TechnicianSortKey},
    remote_access::RemoteAccessIndex,
    sync::SyncService,
};

/// Per-operator view settings kept between requests.
#[derive(Debug, Default)]
pub struct ViewState {
    pub page_size: usize,
    pub incident_sort: Mutex<SortState<IncidentSortKey>>,
    pub technician_sort: Mutex<SortState<TechnicianSortKey>>,
    pub client_sort: Mutex<SortState<ClientSortKey>>,
    pub remote_access: Mutex<RemoteAccessIndex>,
}

#[derive(Clone)]
pub struct AppState {
    pub board: Board,
    pub dispatcher: ActionDispatcher,
    pub notifications: NotificationService,
    pub sync: SyncService,
    pub view: Arc<ViewState>,
}

impl AppState {
    pub fn new(api: Arc<dyn BackOfficeApi>, config: &Config) -> Self {
        let board = Board::new();
        let notifications = NotificationService::new(config.notification_ms);
        let dispatcher = ActionDispatcher::new(
            api.clone(),
            board.clone(),
            notifications.clone(),
            Operator::new(config.operator.clone()),
        );
        let sync = SyncService::new(
            api,
            board.clone(),
            notifications.clone(),
            config.sync_settings(),
        );

        Self {
            board,
            dispatcher,
            notifications,
            sync,
            view: Arc::new(ViewState {
                page_size: config.page_size,
                ..Default::default()
            }),
        }
    }
}
