//! HTTP back office client.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use domain::models::{
    EntityId,
    client::{Client, CreateClient, UpdateClient},
    incident::{CreateIncident, Incident, UpdateIncident},
    technician::{Technician, UpdateTechnician},
};
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::{
    api::{ApiError, BackOfficeApi, PageQuery},
    projection::IncidentFilters,
};

type Query = Vec<(&'static str, String)>;

/// REST client for the back office.
///
/// Reads, patches and deletes are retried with exponential backoff on
/// transient failures; creations are sent once since they are not idempotent.
#[derive(Debug)]
pub struct RestBackOfficeApi {
    http: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl RestBackOfficeApi {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(
        base_url: Url,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("backoffice-services/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: normalize_base_url(base_url),
            token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Transport(format!("invalid path {path}: {e}")))
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&'static str, String)],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        if method == Method::POST {
            return self.send_request(&method, path, query, body.as_ref()).await;
        }

        (|| async { self.send_request(&method, path, query, body.as_ref()).await })
            .retry(
                &ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(500))
                    .with_max_delay(Duration::from_secs(10))
                    .with_max_times(3)
                    .with_jitter(),
            )
            .when(|e: &ApiError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "Back office {} {} failed, retrying after {:.2}s: {}",
                    method,
                    path,
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }

    async fn send_request(
        &self,
        method: &Method,
        path: &str,
        query: &[(&'static str, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = self.endpoint(path)?;
        let mut request = self
            .http
            .request(method.clone(), url)
            .header("accept", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%method, path, "Back office request");
        let res = request.send().await.map_err(map_reqwest_error)?;
        let status = res.status();
        if status.is_success() {
            let text = res.text().await.map_err(map_reqwest_error)?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| ApiError::Serde(e.to_string()));
        }

        let body = res.text().await.unwrap_or_default();
        Err(error_for_status(status, path, body))
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let value = self.call(method, path, &[], body).await?;
        decode(value)
    }
}

fn normalize_base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn map_reqwest_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(e.to_string())
    }
}

fn error_for_status(status: StatusCode, path: &str, body: String) -> ApiError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
        StatusCode::NOT_FOUND => ApiError::NotFound(path.to_string()),
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
        s => ApiError::Http {
            status: s.as_u16(),
            body,
        },
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Serde(e.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Serde(e.to_string()))
}

/// Some backends answer a creation with the entity minus its id; an empty id
/// tells the caller to keep its local one.
fn with_default_id(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.entry("id").or_insert_with(|| Value::String(String::new()));
    }
    value
}

fn page_query(page: PageQuery) -> Query {
    vec![("page", page.page.to_string()), ("size", page.size.to_string())]
}

fn incident_query(page: PageQuery, filters: Option<&IncidentFilters>) -> Query {
    let mut query = page_query(page);
    let Some(filters) = filters else {
        return query;
    };
    let defaults = IncidentFilters::default();

    if filters.statuses != defaults.statuses {
        let statuses: Vec<String> = filters.statuses.iter().map(ToString::to_string).collect();
        query.push(("status", statuses.join(",")));
    }
    if filters.priorities != defaults.priorities {
        let priorities: Vec<String> = filters.priorities.iter().map(ToString::to_string).collect();
        query.push(("priority", priorities.join(",")));
    }
    if let Some(from) = filters.created_from {
        query.push(("from", from.to_rfc3339()));
    }
    if let Some(to) = filters.created_to {
        query.push(("to", to.to_rfc3339()));
    }
    if let Some(term) = filters.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        query.push(("q", term.to_string()));
    }
    query
}

#[async_trait]
impl BackOfficeApi for RestBackOfficeApi {
    async fn list_incidents(
        &self,
        page: PageQuery,
        filters: Option<&IncidentFilters>,
    ) -> Result<Value, ApiError> {
        self.call(Method::GET, "incidents", &incident_query(page, filters), None)
            .await
    }

    async fn list_technicians(&self) -> Result<Value, ApiError> {
        self.call(Method::GET, "technicians", &[], None).await
    }

    async fn list_clients(
        &self,
        company_id: Option<&EntityId>,
        page: PageQuery,
    ) -> Result<Value, ApiError> {
        let mut query = page_query(page);
        if let Some(company_id) = company_id {
            query.push(("companyId", company_id.to_string()));
        }
        self.call(Method::GET, "clients", &query, None).await
    }

    async fn list_companies(&self) -> Result<Value, ApiError> {
        self.call(Method::GET, "companies", &[], None).await
    }

    async fn create_incident(&self, data: &CreateIncident) -> Result<Incident, ApiError> {
        let value = self
            .call(Method::POST, "incidents", &[], Some(encode(data)?))
            .await?;
        decode(with_default_id(value))
    }

    async fn update_incident(
        &self,
        id: &EntityId,
        patch: &UpdateIncident,
    ) -> Result<Incident, ApiError> {
        self.call_typed(Method::PATCH, &format!("incidents/{id}"), Some(encode(patch)?))
            .await
    }

    async fn delete_incident(&self, id: &EntityId) -> Result<(), ApiError> {
        self.call(Method::DELETE, &format!("incidents/{id}"), &[], None)
            .await
            .map(|_| ())
    }

    async fn update_technician(
        &self,
        id: &EntityId,
        patch: &UpdateTechnician,
    ) -> Result<Technician, ApiError> {
        self.call_typed(Method::PATCH, &format!("technicians/{id}"), Some(encode(patch)?))
            .await
    }

    async fn create_client(&self, data: &CreateClient) -> Result<Client, ApiError> {
        let value = self
            .call(Method::POST, "clients", &[], Some(encode(data)?))
            .await?;
        decode(with_default_id(value))
    }

    async fn update_client(&self, id: &EntityId, patch: &UpdateClient) -> Result<Client, ApiError> {
        self.call_typed(Method::PATCH, &format!("clients/{id}"), Some(encode(patch)?))
            .await
    }

    async fn delete_client(&self, id: &EntityId) -> Result<(), ApiError> {
        self.call(Method::DELETE, &format!("clients/{id}"), &[], None)
            .await
            .map(|_| ())
    }
}
