//! Run configuration supplied by the host.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::endpoint::{EndpointDescriptor, catalog};
use crate::json::kind as json_kind;

pub const DEFAULT_BASE_URL: &str = "https://api.congress.gov/v3";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("configuration must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("{0} is missing from configuration")]
    Missing(&'static str),
    #[error("{0} is empty in configuration")]
    Empty(&'static str),
    #[error("{field} must be a positive integer, got {value}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("unknown endpoint `{0}`")]
    UnknownEndpoint(String),
    #[error("malformed configuration: {0}")]
    Malformed(String),
}

/// Fixed-interval retry budget for every API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Validated configuration for one run.
#[derive(Clone)]
pub struct SyncConfig {
    pub api_key: String,
    pub starting_congress: u32,
    /// API root without a trailing slash.
    pub base_url: String,
    pub endpoints: Vec<EndpointDescriptor>,
    pub retry: RetryPolicy,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("api_key", &redact(&self.api_key))
            .field("starting_congress", &self.starting_congress)
            .field("base_url", &self.base_url)
            .field(
                "endpoints",
                &self.endpoints.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            )
            .field("retry", &self.retry)
            .finish()
    }
}

fn redact(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}...")
}

/// Host configuration values arrive either as JSON numbers or as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberLike {
    Int(i64),
    Text(String),
}

impl NumberLike {
    fn positive(self, field: &'static str) -> Result<u64, ConfigError> {
        let invalid = |value: String| ConfigError::InvalidNumber { field, value };
        match self {
            NumberLike::Int(n) if n >= 1 => Ok(n as u64),
            NumberLike::Int(n) => Err(invalid(n.to_string())),
            NumberLike::Text(s) => match s.trim().parse::<u64>() {
                Ok(n) if n >= 1 => Ok(n),
                _ => Err(invalid(s)),
            },
        }
    }
}

#[derive(Deserialize)]
struct RawConfig {
    api_key: Option<String>,
    #[serde(alias = "congress_number")]
    starting_congress_number: Option<NumberLike>,
    base_url: Option<String>,
    endpoints: Option<String>,
    max_attempts: Option<NumberLike>,
    retry_interval_secs: Option<NumberLike>,
}

impl SyncConfig {
    /// Validate the host's configuration object.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ConfigError> {
        if !value.is_object() {
            return Err(ConfigError::NotAnObject(json_kind(value)));
        }
        let raw: RawConfig = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::Malformed(e.to_string()))?;

        let api_key = raw.api_key.ok_or(ConfigError::Missing("api_key"))?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::Empty("api_key"));
        }

        let starting = raw
            .starting_congress_number
            .ok_or(ConfigError::Missing("starting_congress_number"))?
            .positive("starting_congress_number")?;
        let starting_congress =
            u32::try_from(starting).map_err(|_| ConfigError::InvalidNumber {
                field: "starting_congress_number",
                value: starting.to_string(),
            })?;

        let base_url = raw
            .base_url
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let mut retry = RetryPolicy::default();
        if let Some(n) = raw.max_attempts {
            retry.max_attempts = u32::try_from(n.positive("max_attempts")?).unwrap_or(u32::MAX);
        }
        if let Some(n) = raw.retry_interval_secs {
            retry.interval = Duration::from_secs(n.positive("retry_interval_secs")?);
        }

        Ok(Self {
            api_key,
            starting_congress,
            base_url,
            endpoints: select_endpoints(raw.endpoints.as_deref())?,
            retry,
        })
    }
}

/// Resolve a comma-separated endpoint selection against the catalog.
///
/// `None` or a blank string selects everything. The result keeps catalog
/// order regardless of how the selection is written.
pub fn select_endpoints(selection: Option<&str>) -> Result<Vec<EndpointDescriptor>, ConfigError> {
    let all = catalog();
    let names: Vec<&str> = selection
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if names.is_empty() {
        return Ok(all);
    }

    if let Some(unknown) = names.iter().find(|n| !all.iter().any(|e| e.name == **n)) {
        return Err(ConfigError::UnknownEndpoint(unknown.to_string()));
    }
    Ok(all
        .into_iter()
        .filter(|e| names.contains(&e.name.as_str()))
        .collect())
}
