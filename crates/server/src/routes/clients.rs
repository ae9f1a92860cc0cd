use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, patch, post},
};
use domain::models::{
    EntityId,
    client::{Client, ClientStatus, CreateClient, UpdateClient},
};
use serde::Deserialize;
use services::services::{
    projection::{ClientFilters, ClientSortKey, Page, SortDirection, SortState, project},
    remote_access::AccessesByKind,
};
use utils::response::ApiResponse;

use super::{effective_sort, page_request};
use crate::{AppState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientListQuery {
    pub company_id: Option<EntityId>,
    pub status: Option<ClientStatus>,
    pub search: Option<String>,
    pub sort: Option<ClientSortKey>,
    pub direction: Option<SortDirection>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SelectSortRequest {
    pub key: ClientSortKey,
}

/// GET /api/clients
pub async fn list_clients(
    State(state): State<AppState>,
    Query(query): Query<ClientListQuery>,
) -> ResponseJson<ApiResponse<Page<Client>>> {
    let filters = ClientFilters {
        company_id: query.company_id,
        status: query.status,
        search: query.search,
    };
    let stored = *state.view.client_sort.lock();
    let sort = effective_sort(stored, query.sort, query.direction);
    let page = page_request(query.page, query.page_size, state.view.page_size);

    let clients = state.board.clients();
    ResponseJson(ApiResponse::success(project(&clients, &filters, sort, page)))
}

/// POST /api/clients
pub async fn create_client(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<CreateClient>,
) -> Result<ResponseJson<ApiResponse<Client>>, ApiError> {
    let client = state.dispatcher.create_client(payload).await?;
    Ok(ResponseJson(ApiResponse::success(client)))
}

/// PATCH /api/clients/{id}
pub async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
    axum::Json(payload): axum::Json<UpdateClient>,
) -> Result<ResponseJson<ApiResponse<Client>>, ApiError> {
    let client = state
        .dispatcher
        .update_client(&EntityId::from(id), payload)
        .await?;
    Ok(ResponseJson(ApiResponse::success(client)))
}

/// DELETE /api/clients/{id}
pub async fn delete_client(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    state.dispatcher.delete_client(&EntityId::from(id)).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

/// GET /api/clients/{id}/remote-accesses
///
/// Credentials grouped by tool. The grouping is memoized on the clients
/// snapshot and only rebuilt after the collection changes.
pub async fn get_remote_accesses(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ResponseJson<ApiResponse<AccessesByKind>>, ApiError> {
    let id = EntityId::from(id);
    let clients = state.board.clients();
    if !clients.iter().any(|client| client.id == id) {
        return Err(ApiError::NotFound(format!("client {id} not found")));
    }
    let accesses = state.view.remote_access.lock().for_client(&clients, &id);
    Ok(ResponseJson(ApiResponse::success(accesses)))
}

/// POST /api/clients/sort
pub async fn select_sort(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<SelectSortRequest>,
) -> ResponseJson<ApiResponse<SortState<ClientSortKey>>> {
    let mut sort = state.view.client_sort.lock();
    *sort = sort.select(payload.key);
    ResponseJson(ApiResponse::success(*sort))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/clients", get(list_clients).post(create_client))
        .route("/clients/sort", post(select_sort))
        .route(
            "/clients/{id}",
            patch(update_client).delete(delete_client),
        )
        .route("/clients/{id}/remote-accesses", get(get_remote_accesses))
}
