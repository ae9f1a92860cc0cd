use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use chrono::{DateTime, Utc};
use domain::models::Entity;
use serde::{Serialize, de::DeserializeOwned};
use services::services::entity_store::EntityStore;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::AppState;

/// Load state of one collection as shown in the view header.
#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStatus {
    pub loaded: bool,
    pub count: usize,
    pub total_count: u64,
    pub loaded_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub retryable: bool,
}

impl CollectionStatus {
    fn of<T: Entity + DeserializeOwned>(store: &EntityStore<T>) -> Self {
        let error = store.last_error();
        Self {
            loaded: store.loaded_at().is_some(),
            count: store.len(),
            total_count: store.total_count(),
            loaded_at: store.loaded_at(),
            error: error.map(ToString::to_string),
            retryable: error.is_some_and(|e| e.is_retryable()),
        }
    }
}

#[derive(Debug, Serialize, TS)]
pub struct SyncStatus {
    pub incidents: CollectionStatus,
    pub technicians: CollectionStatus,
    pub clients: CollectionStatus,
    pub companies: CollectionStatus,
}

fn current_status(state: &AppState) -> SyncStatus {
    let board = state.board.read();
    SyncStatus {
        incidents: CollectionStatus::of(&board.incidents),
        technicians: CollectionStatus::of(&board.technicians),
        clients: CollectionStatus::of(&board.clients),
        companies: CollectionStatus::of(&board.companies),
    }
}

/// GET /api/sync
pub async fn get_sync_status(State(state): State<AppState>) -> ResponseJson<ApiResponse<SyncStatus>> {
    ResponseJson(ApiResponse::success(current_status(&state)))
}

/// POST /api/sync
///
/// Refresh every collection now instead of waiting for the next tick.
pub async fn refresh_now(State(state): State<AppState>) -> ResponseJson<ApiResponse<SyncStatus>> {
    let report = state.sync.refresh_all().await;
    if !report.is_ok() {
        tracing::debug!("Manual refresh finished with failures");
    }
    ResponseJson(ApiResponse::success(current_status(&state)))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/sync", get(get_sync_status).post(refresh_now))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use services::services::{api::ApiError, memory_api::Operation};

    use crate::testing::{TestApp, data};

    #[tokio::test]
    async fn test_status_after_initial_load() {
        let app = TestApp::seeded().await;
        let (status, body) = app.request(Method::GET, "/api/sync", None).await;
        assert_eq!(status, StatusCode::OK);
        let incidents = &data(&body)["incidents"];
        assert_eq!(incidents["loaded"], true);
        assert_eq!(incidents["count"], 5);
        assert_eq!(incidents["totalCount"], 5);
        assert!(incidents["error"].is_null());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_data_and_reports_error() {
        let app = TestApp::seeded().await;
        app.api.fail_next(Operation::ListTechnicians, ApiError::RateLimited);
        app.api
            .respond_raw(Operation::ListClients, json!({ "unexpected": true }));

        let (status, body) = app.request(Method::POST, "/api/sync", None).await;
        assert_eq!(status, StatusCode::OK);
        let report = data(&body);
        assert_eq!(report["technicians"]["count"], 4);
        assert_eq!(report["technicians"]["retryable"], true);
        assert!(report["technicians"]["error"].is_string());
        assert_eq!(report["clients"]["count"], 3);
        assert_eq!(report["clients"]["retryable"], false);
        assert!(report["incidents"]["error"].is_null());

        let (_, body) = app.request(Method::GET, "/api/notifications", None).await;
        assert_eq!(data(&body).as_array().unwrap().len(), 2);
    }
}
