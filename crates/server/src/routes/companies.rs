use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use domain::models::company::Company;
use utils::response::ApiResponse;

use crate::AppState;

/// GET /api/companies
pub async fn list_companies(State(state): State<AppState>) -> ResponseJson<ApiResponse<Vec<Company>>> {
    let companies = state.board.companies();
    ResponseJson(ApiResponse::success(companies.as_ref().clone()))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/companies", get(list_companies))
}
