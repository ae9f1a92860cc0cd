//! Helpers for route tests: a router over the seeded in-memory back office.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use services::services::{config::Config, memory_api::InMemoryBackOfficeApi};
use tower::ServiceExt;

use crate::{AppState, router};

pub struct TestApp {
    pub api: Arc<InMemoryBackOfficeApi>,
    pub state: AppState,
    router: Router,
}

impl TestApp {
    /// App with every collection loaded once from the seeded data.
    pub async fn seeded() -> Self {
        let api = Arc::new(InMemoryBackOfficeApi::seeded());
        let state = AppState::new(api.clone(), &Config::default());
        let report = state.sync.refresh_all().await;
        assert!(report.is_ok(), "initial load failed: {report:?}");
        Self {
            api,
            router: router(state.clone()),
            state,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}

/// The `data` field of an `ApiResponse` envelope.
pub fn data(body: &Value) -> &Value {
    &body["data"]
}
