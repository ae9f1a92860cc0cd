//! Runtime configuration read from `BACKOFFICE_*` environment variables.

use std::{str::FromStr, time::Duration};

use domain::models::{EntityId, notification::DEFAULT_NOTIFICATION_MS};
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use super::{api::PageQuery, projection::DEFAULT_PAGE_SIZE, sync::SyncSettings};

pub const API_URL: &str = "BACKOFFICE_API_URL";
pub const API_TOKEN: &str = "BACKOFFICE_API_TOKEN";
pub const TIMEOUT_SECS: &str = "BACKOFFICE_TIMEOUT_SECS";
pub const REFRESH_SECS: &str = "BACKOFFICE_REFRESH_SECS";
pub const PAGE_SIZE: &str = "BACKOFFICE_PAGE_SIZE";
pub const FETCH_SIZE: &str = "BACKOFFICE_FETCH_SIZE";
pub const NOTIFICATION_MS: &str = "BACKOFFICE_NOTIFICATION_MS";
pub const OPERATOR: &str = "BACKOFFICE_OPERATOR";
pub const COMPANY_ID: &str = "BACKOFFICE_COMPANY_ID";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug)]
pub struct Config {
    /// No URL means the in-memory demo back office is used.
    pub api_url: Option<Url>,
    pub api_token: Option<SecretString>,
    pub request_timeout: Duration,
    pub refresh_interval: Duration,
    pub page_size: usize,
    pub fetch_size: u32,
    pub notification_ms: u64,
    pub operator: String,
    pub company_id: Option<EntityId>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            api_token: None,
            request_timeout: Duration::from_secs(30),
            refresh_interval: Duration::from_secs(30),
            page_size: DEFAULT_PAGE_SIZE,
            fetch_size: PageQuery::DEFAULT_SIZE,
            notification_ms: DEFAULT_NOTIFICATION_MS,
            operator: "operator".to_string(),
            company_id: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let api_url = get(API_URL)
            .map(|raw| {
                Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                    key: API_URL,
                    value: raw.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            api_url,
            api_token: get(API_TOKEN).map(SecretString::from),
            request_timeout: get(TIMEOUT_SECS)
                .map(|raw| positive::<u64>(TIMEOUT_SECS, raw))
                .transpose()?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            refresh_interval: get(REFRESH_SECS)
                .map(|raw| positive::<u64>(REFRESH_SECS, raw))
                .transpose()?
                .map(Duration::from_secs)
                .unwrap_or(defaults.refresh_interval),
            page_size: get(PAGE_SIZE)
                .map(|raw| positive::<usize>(PAGE_SIZE, raw))
                .transpose()?
                .unwrap_or(defaults.page_size),
            fetch_size: get(FETCH_SIZE)
                .map(|raw| positive::<u32>(FETCH_SIZE, raw))
                .transpose()?
                .unwrap_or(defaults.fetch_size),
            notification_ms: get(NOTIFICATION_MS)
                .map(|raw| parse::<u64>(NOTIFICATION_MS, raw))
                .transpose()?
                .unwrap_or(defaults.notification_ms),
            operator: get(OPERATOR).unwrap_or(defaults.operator),
            company_id: get(COMPANY_ID).map(EntityId::from),
        })
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            interval: self.refresh_interval,
            fetch_size: self.fetch_size,
            company_id: self.company_id.clone(),
        }
    }
}

fn parse<T>(key: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value: raw,
    })
}

fn positive<T>(key: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let value = parse::<T>(key, raw.clone())?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
