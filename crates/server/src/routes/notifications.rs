use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{delete, get},
};
use domain::models::notification::{Notification, NotificationKind};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub title: Option<String>,
    /// 0 keeps the notification until dismissed.
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Serialize, TS)]
pub struct NotifyResponse {
    pub id: Uuid,
}

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<AppState>,
) -> ResponseJson<ApiResponse<Vec<Notification>>> {
    ResponseJson(ApiResponse::success(state.notifications.list()))
}

/// POST /api/notifications
pub async fn notify(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<NotifyRequest>,
) -> ResponseJson<ApiResponse<NotifyResponse>> {
    let id = state.notifications.emit(
        payload.kind,
        payload.message,
        payload.title,
        payload.duration_ms,
    );
    ResponseJson(ApiResponse::success(NotifyResponse { id }))
}

/// DELETE /api/notifications/{id}
pub async fn dismiss(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    if state.notifications.dismiss(id) {
        Ok(ResponseJson(ApiResponse::success(())))
    } else {
        Err(ApiError::NotFound(format!("notification {id} not found")))
    }
}

/// DELETE /api/notifications
pub async fn clear(State(state): State<AppState>) -> ResponseJson<ApiResponse<()>> {
    state.notifications.clear();
    ResponseJson(ApiResponse::success(()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/notifications",
            get(list_notifications).post(notify).delete(clear),
        )
        .route("/notifications/{id}", delete(dismiss))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::testing::{TestApp, data};

    #[tokio::test]
    async fn test_notify_list_dismiss() {
        let app = TestApp::seeded().await;
        let (status, body) = app
            .request(
                Method::POST,
                "/api/notifications",
                Some(json!({
                    "kind": "warning",
                    "message": "Rappeler le client avant 18h",
                    "durationMs": 0
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let id = data(&body)["id"].as_str().unwrap().to_string();

        let (_, body) = app.request(Method::GET, "/api/notifications", None).await;
        let listed = data(&body).as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["kind"], "warning");
        assert_eq!(listed[0]["durationMs"], 0);

        let uri = format!("/api/notifications/{id}");
        let (status, _) = app.request(Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.request(Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_actions_surface_notifications() {
        let app = TestApp::seeded().await;
        app.request(
            Method::POST,
            "/api/incidents/30/assign",
            Some(json!({ "technicianId": "20" })),
        )
        .await;
        let (_, body) = app.request(Method::GET, "/api/notifications", None).await;
        assert_eq!(data(&body)[0]["kind"], "success");

        let (status, _) = app.request(Method::DELETE, "/api/notifications", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = app.request(Method::GET, "/api/notifications", None).await;
        assert!(data(&body).as_array().unwrap().is_empty());
    }
}
