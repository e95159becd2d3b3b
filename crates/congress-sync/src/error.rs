use congress_core::{ConfigError, StateError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),
    #[error("authentication rejected (403) by {url}")]
    Forbidden { url: String },
    #[error("{url} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("operation channel closed")]
    ChannelClosed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure while turning one fetched item into an upsert. Aborts the endpoint.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("record is {0}, expected an object")]
    NotAnObject(&'static str),
    #[error("records at `{path}` are {kind}, expected a list")]
    UnexpectedShape { path: String, kind: &'static str },
    #[error("upsert into {table} failed: {source}")]
    Upsert {
        table: String,
        #[source]
        source: SinkError,
    },
}

/// Run-level failure. Anything that reaches this type stops the whole sync.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("current congress response carried no congress number")]
    Discovery,
    #[error("checkpoint failed: {0}")]
    Checkpoint(#[source] SinkError),
}
