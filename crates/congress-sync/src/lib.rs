//! Incremental ingestion engine for the Congress.gov API.
//!
//! The engine pulls pages from each selected endpoint, enriches records with
//! per-record detail where the endpoint has one, and hands an ordered stream
//! of upserts and cursor checkpoints to an [`OperationSink`].

pub mod driver;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod http;
pub mod sink;

pub use driver::{EndpointDriver, EndpointOutcome};
pub use engine::{EndpointReport, RunSummary, SyncEngine, update};
pub use error::{FetchError, RecordError, SinkError, SyncError};
pub use http::Fetcher;
pub use sink::{Operation, OperationSink};
