//! Incident board routes: filtered listing and the ticket actions.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use domain::models::{
    EntityId,
    incident::{CreateIncident, Incident, IncidentPriority, IncidentStatus},
};
use serde::{Deserialize, Serialize};
use services::services::projection::{
    IncidentFilters, IncidentSortKey, Page, SortDirection, SortState, project,
};
use ts_rs::TS;
use utils::response::ApiResponse;

use super::{effective_sort, page_request, parse_set};
use crate::{AppState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentListQuery {
    /// Comma separated statuses; absent means all.
    pub status: Option<String>,
    /// Comma separated priorities; absent means all.
    pub priority: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub sort: Option<IncidentSortKey>,
    pub direction: Option<SortDirection>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl IncidentListQuery {
    fn filters(&self) -> Result<IncidentFilters, ApiError> {
        let mut filters = IncidentFilters::default().created_between(self.from, self.to);
        if let Some(raw) = &self.status {
            filters = filters.with_statuses(parse_set::<IncidentStatus>("status", raw)?);
        }
        if let Some(raw) = &self.priority {
            filters = filters.with_priorities(parse_set::<IncidentPriority>("priority", raw)?);
        }
        if let Some(search) = &self.search {
            filters = filters.with_search(search.clone());
        }
        Ok(filters)
    }
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct AssignTechnicianRequest {
    pub technician_id: EntityId,
}

#[derive(Debug, Deserialize, TS)]
pub struct AddCommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize, TS)]
pub struct ChangeStatusRequest {
    pub status: IncidentStatus,
}

#[derive(Debug, Serialize, Deserialize, TS)]
pub struct SelectSortRequest {
    pub key: IncidentSortKey,
}

/// GET /api/incidents
pub async fn list_incidents(
    State(state): State<AppState>,
    Query(query): Query<IncidentListQuery>,
) -> Result<ResponseJson<ApiResponse<Page<Incident>>>, ApiError> {
    let filters = query.filters()?;
    let stored = *state.view.incident_sort.lock();
    let sort = effective_sort(stored, query.sort, query.direction);
    let page = page_request(query.page, query.page_size, state.view.page_size);

    let incidents = state.board.incidents();
    Ok(ResponseJson(ApiResponse::success(project(
        &incidents, &filters, sort, page,
    ))))
}

/// GET /api/incidents/{id}
pub async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ResponseJson<ApiResponse<Incident>>, ApiError> {
    let id = EntityId::from(id);
    let incident = state
        .board
        .read()
        .incidents
        .get(&id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("incident {id} not found")))?;
    Ok(ResponseJson(ApiResponse::success(incident)))
}

/// POST /api/incidents
pub async fn create_incident(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<CreateIncident>,
) -> Result<ResponseJson<ApiResponse<Incident>>, ApiError> {
    let incident = state.dispatcher.create_incident(payload).await?;
    Ok(ResponseJson(ApiResponse::success(incident)))
}

/// DELETE /api/incidents/{id}
pub async fn delete_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    state.dispatcher.delete_incident(&EntityId::from(id)).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

/// POST /api/incidents/{id}/assign
pub async fn assign_technician(
    State(state): State<AppState>,
    Path(id): Path<String>,
    axum::Json(payload): axum::Json<AssignTechnicianRequest>,
) -> Result<ResponseJson<ApiResponse<Incident>>, ApiError> {
    let incident = state
        .dispatcher
        .assign_technician(&EntityId::from(id), &payload.technician_id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(incident)))
}

/// POST /api/incidents/{id}/comments
pub async fn add_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    axum::Json(payload): axum::Json<AddCommentRequest>,
) -> Result<ResponseJson<ApiResponse<Incident>>, ApiError> {
    let incident = state
        .dispatcher
        .add_comment(&EntityId::from(id), &payload.text)
        .await?;
    Ok(ResponseJson(ApiResponse::success(incident)))
}

/// POST /api/incidents/{id}/status
pub async fn change_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    axum::Json(payload): axum::Json<ChangeStatusRequest>,
) -> Result<ResponseJson<ApiResponse<Incident>>, ApiError> {
    let incident = state
        .dispatcher
        .change_status(&EntityId::from(id), payload.status)
        .await?;
    Ok(ResponseJson(ApiResponse::success(incident)))
}

/// POST /api/incidents/sort
/// Same key flips the direction, a new key starts descending.
pub async fn select_sort(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<SelectSortRequest>,
) -> ResponseJson<ApiResponse<SortState<IncidentSortKey>>> {
    let mut sort = state.view.incident_sort.lock();
    *sort = sort.select(payload.key);
    ResponseJson(ApiResponse::success(*sort))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/incidents", get(list_incidents).post(create_incident))
        .route("/incidents/sort", post(select_sort))
        .route("/incidents/{id}", get(get_incident).delete(delete_incident))
        .route("/incidents/{id}/assign", post(assign_technician))
        .route("/incidents/{id}/comments", post(add_comment))
        .route("/incidents/{id}/status", post(change_status))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{Value, json};

    use crate::testing::{TestApp, data};

    #[tokio::test]
    async fn test_list_applies_filters_and_paging() {
        let app = TestApp::seeded().await;
        let (status, body) = app
            .request(Method::GET, "/api/incidents?status=OUVERT,EN_COURS&pageSize=1", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let page = data(&body);
        assert_eq!(page["totalItems"], 2);
        assert_eq!(page["totalPages"], 2);
        assert_eq!(page["items"].as_array().unwrap().len(), 1);
        assert_eq!(page["items"][0]["status"], "OUVERT");

        let (_, body) = app
            .request(Method::GET, "/api/incidents?page=9&pageSize=2", None)
            .await;
        assert_eq!(data(&body)["page"], 2);

        let (status, body) = app
            .request(Method::GET, "/api/incidents?priority=CRITIQUE", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_sort_selection_toggles() {
        let app = TestApp::seeded().await;
        let body = json!({ "key": "priority" });
        let (_, first) = app
            .request(Method::POST, "/api/incidents/sort", Some(body.clone()))
            .await;
        assert_eq!(data(&first)["direction"], "desc");
        let (_, second) = app
            .request(Method::POST, "/api/incidents/sort", Some(body))
            .await;
        assert_eq!(data(&second)["direction"], "asc");

        let (_, listed) = app.request(Method::GET, "/api/incidents", None).await;
        let priorities: Vec<Value> = data(&listed)["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["priority"].clone())
            .collect();
        assert_eq!(priorities.first(), Some(&json!("BASSE")));
        assert_eq!(priorities.last(), Some(&json!("URGENTE")));
    }

    #[tokio::test]
    async fn test_assign_then_conflict() {
        let app = TestApp::seeded().await;
        let (status, body) = app
            .request(
                Method::POST,
                "/api/incidents/30/assign",
                Some(json!({ "technicianId": 20 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data(&body)["status"], "ASSIGNE");

        let (status, body) = app
            .request(
                Method::POST,
                "/api/incidents/30/assign",
                Some(json!({ "technicianId": 22 })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_comment_create_and_delete() {
        let app = TestApp::seeded().await;
        let (status, _) = app
            .request(
                Method::POST,
                "/api/incidents/33/comments",
                Some(json!({ "text": "  " })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .request(
                Method::POST,
                "/api/incidents",
                Some(json!({
                    "clientId": "10",
                    "caller": "Sophie Martin",
                    "description": "Porte de chambre froide bloquée",
                    "priority": "HAUTE"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let id = data(&body)["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .request(Method::DELETE, &format!("/api/incidents/{id}"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .request(Method::GET, &format!("/api/incidents/{id}"), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failed_remote_call_reports_retryable() {
        let app = TestApp::seeded().await;
        app.api.fail_next(
            services::services::memory_api::Operation::UpdateIncident,
            services::services::api::ApiError::Timeout,
        );
        let (status, body) = app
            .request(
                Method::POST,
                "/api/incidents/31/status",
                Some(json!({ "status": "RESOLU" })),
            )
            .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error_data"]["retryable"], true);

        let (_, body) = app.request(Method::GET, "/api/incidents/31", None).await;
        assert_eq!(data(&body)["status"], "EN_COURS");
    }
}
