use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use services::services::{api::ApiError as BackOfficeError, dispatcher::DispatchError};
use thiserror::Error;
use ts_rs::TS;
use utils::response::ApiResponse;

/// Extra detail attached to error responses so the view can offer a retry.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub retryable: bool,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Dispatch(err) => match err {
                DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
                DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
                DispatchError::TechnicianUnavailable { .. }
                | DispatchError::InvalidTransition(_) => StatusCode::CONFLICT,
                DispatchError::Network(BackOfficeError::Unauthorized) => StatusCode::UNAUTHORIZED,
                DispatchError::Network(BackOfficeError::NotFound(_)) => StatusCode::NOT_FOUND,
                DispatchError::Network(BackOfficeError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
                DispatchError::Network(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let body = match &self {
            ApiError::Dispatch(DispatchError::Network(err)) => {
                tracing::warn!(error = %err, "Back office call failed");
                ApiResponse::<(), ErrorDetails>::error_with_data(
                    &message,
                    ErrorDetails {
                        retryable: err.should_retry(),
                    },
                )
            }
            _ => ApiResponse::<(), ErrorDetails>::error(&message),
        };
        (status, Json(body)).into_response()
    }
}
