use axum::{
    Router,
    extract::{Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use domain::models::technician::{Availability, Technician};
use serde::Deserialize;
use services::services::projection::{
    Page, SortDirection, SortState, TechnicianFilters, TechnicianSortKey, project,
};
use utils::response::ApiResponse;

use super::{effective_sort, page_request, parse_set};
use crate::{AppState, error::ApiError};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianListQuery {
    pub availability: Option<String>,
    pub specialization: Option<String>,
    pub search: Option<String>,
    pub sort: Option<TechnicianSortKey>,
    pub direction: Option<SortDirection>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SelectSortRequest {
    pub key: TechnicianSortKey,
}

/// GET /api/technicians
pub async fn list_technicians(
    State(state): State<AppState>,
    Query(query): Query<TechnicianListQuery>,
) -> Result<ResponseJson<ApiResponse<Page<Technician>>>, ApiError> {
    let mut filters = TechnicianFilters {
        specialization: query.specialization,
        search: query.search,
        ..Default::default()
    };
    if let Some(raw) = &query.availability {
        filters.availability = parse_set::<Availability>("availability", raw)?;
    }

    let stored = *state.view.technician_sort.lock();
    let sort = effective_sort(stored, query.sort, query.direction);
    let page = page_request(query.page, query.page_size, state.view.page_size);

    let technicians = state.board.technicians();
    Ok(ResponseJson(ApiResponse::success(project(
        &technicians,
        &filters,
        sort,
        page,
    ))))
}

/// POST /api/technicians/sort
pub async fn select_sort(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<SelectSortRequest>,
) -> ResponseJson<ApiResponse<SortState<TechnicianSortKey>>> {
    let mut sort = state.view.technician_sort.lock();
    *sort = sort.select(payload.key);
    ResponseJson(ApiResponse::success(*sort))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/technicians", get(list_technicians))
        .route("/technicians/sort", post(select_sort))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::testing::{TestApp, data};

    #[tokio::test]
    async fn test_filter_by_availability_and_specialization() {
        let app = TestApp::seeded().await;
        let (status, body) = app
            .request(Method::GET, "/api/technicians?availability=DISPONIBLE&direction=asc", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = data(&body)["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Karim Benali", "Yann Le Goff"]);

        let (_, body) = app
            .request(Method::GET, "/api/technicians?specialization=froid", None)
            .await;
        assert_eq!(data(&body)["totalItems"], 2);
    }

    #[tokio::test]
    async fn test_sort_by_availability() {
        let app = TestApp::seeded().await;
        let (_, body) = app
            .request(
                Method::GET,
                "/api/technicians?sort=availability&direction=asc",
                None,
            )
            .await;
        let first = &data(&body)["items"][0];
        assert_eq!(first["availability"], "DISPONIBLE");
        let last = &data(&body)["items"][3];
        assert_eq!(last["availability"], "HORS_LIGNE");
    }
}
