//! Run orchestration: discover the current congress, then drive every selected
//! endpoint for every congress from the configured start through the current one.

use std::sync::Arc;

use congress_core::json::navigate;
use congress_core::{Clock, CursorState, SyncConfig, SystemClock};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::driver::{EndpointDriver, EndpointOutcome};
use crate::error::SyncError;
use crate::http::{CallKind, Fetcher};
use crate::sink::OperationSink;

const CURRENT_CONGRESS_PATH: &str = "congress/current";
const CURRENT_NUMBER_PATH: &str = "congress.number";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointReport {
    pub endpoint: String,
    pub session: u32,
    pub outcome: EndpointOutcome,
}

/// What one `update` run did, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub current_session: u32,
    pub reports: Vec<EndpointReport>,
}

impl RunSummary {
    pub fn records(&self) -> u64 {
        self.reports
            .iter()
            .map(|r| match r.outcome {
                EndpointOutcome::Done { records, .. } => records,
                _ => 0,
            })
            .sum()
    }

    pub fn aborted(&self) -> impl Iterator<Item = &EndpointReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, EndpointOutcome::Aborted { .. }))
    }
}

pub struct SyncEngine {
    config: SyncConfig,
    fetcher: Fetcher,
    clock: Arc<dyn Clock>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Result<Self, SyncError> {
        let fetcher = Fetcher::from_config(&config)?;
        Ok(Self {
            config,
            fetcher,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Ask the API which congress is in session. Any failure here is fatal.
    pub async fn current_session(&self) -> Result<u32, SyncError> {
        let body = self
            .fetcher
            .fetch_as(CallKind::Discovery, CURRENT_CONGRESS_PATH, &[])
            .await?;
        navigate(&body, CURRENT_NUMBER_PATH)
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(SyncError::Discovery)
    }

    /// One full run. An aborted endpoint is reported and the run moves on;
    /// only discovery and checkpoint failures end it early.
    pub async fn run(
        &self,
        state: &mut CursorState,
        sink: &mut dyn OperationSink,
    ) -> Result<RunSummary, SyncError> {
        let current = self.current_session().await?;
        let start = self.config.starting_congress;
        info!(current, start, endpoints = self.config.endpoints.len(), "starting update");
        if start > current {
            warn!(current, start, "starting congress is after the current one, nothing to do");
        }

        let driver = EndpointDriver::new(&self.fetcher, self.clock.as_ref());
        let mut reports = Vec::new();
        for session in start..=current {
            for endpoint in &self.config.endpoints {
                let outcome = driver.sync(endpoint, session, state, sink).await?;
                info!(endpoint = %endpoint.name, session, "{outcome}");
                reports.push(EndpointReport {
                    endpoint: endpoint.name.clone(),
                    session,
                    outcome,
                });
            }
        }

        let summary = RunSummary {
            current_session: current,
            reports,
        };
        let aborted = summary.aborted().count();
        if aborted > 0 {
            warn!(aborted, records = summary.records(), "update finished with aborted endpoints");
        } else {
            info!(records = summary.records(), "update finished");
        }
        Ok(summary)
    }
}

/// Validate the host's configuration and prior state, then run one update.
pub async fn update(
    configuration: &Value,
    state: Option<&Value>,
    sink: &mut dyn OperationSink,
) -> Result<RunSummary, SyncError> {
    let config = SyncConfig::from_value(configuration)?;
    let mut cursor = CursorState::from_value(state)?;
    SyncEngine::new(config)?.run(&mut cursor, sink).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::sink::Operation;
    use chrono::{TimeZone, Utc};
    use congress_core::FixedClock;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer, endpoints: &str, start: u32) -> SyncConfig {
        SyncConfig::from_value(&json!({
            "api_key": "test-key",
            "starting_congress_number": start,
            "base_url": server.uri(),
            "endpoints": endpoints,
            "retry_interval_secs": 1,
            "max_attempts": 1,
        }))
        .unwrap()
    }

    fn engine(server: &MockServer, endpoints: &str, start: u32) -> SyncEngine {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        SyncEngine::new(config(server, endpoints, start))
            .unwrap()
            .with_clock(Arc::new(clock))
    }

    async fn mount_current(server: &MockServer, number: u32) {
        Mock::given(method("GET"))
            .and(path("/congress/current"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "congress": {"name": format!("{number}th Congress"), "number": number}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn discovery_reads_congress_number() {
        let server = MockServer::start().await;
        mount_current(&server, 118).await;
        assert_eq!(engine(&server, "", 118).current_session().await.unwrap(), 118);
    }

    #[tokio::test]
    async fn forbidden_discovery_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/congress/current"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let mut ops = Vec::new();
        let err = engine(&server, "bill", 118)
            .run(&mut CursorState::new(), &mut ops)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Fetch(FetchError::Forbidden { .. })));
        assert!(ops.is_empty());
    }

    #[tokio::test]
    async fn discovery_without_number_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/congress/current"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"congress": {}})))
            .mount(&server)
            .await;

        let err = engine(&server, "bill", 118)
            .run(&mut CursorState::new(), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Discovery));
    }

    #[tokio::test]
    async fn walks_sessions_then_endpoints_in_order() {
        let server = MockServer::start().await;
        mount_current(&server, 118).await;
        for session in ["117", "118"] {
            Mock::given(method("GET"))
                .and(path(format!("/bill/{session}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bills": []})))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path(format!("/treaty/{session}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"treaties": []})))
                .expect(1)
                .mount(&server)
                .await;
        }

        let mut state = CursorState::new();
        let summary = engine(&server, "treaty,bill", 117)
            .run(&mut state, &mut Vec::new())
            .await
            .unwrap();

        let order: Vec<(String, u32)> = summary
            .reports
            .iter()
            .map(|r| (r.endpoint.clone(), r.session))
            .collect();
        assert_eq!(
            order,
            [
                ("bill".to_string(), 117),
                ("treaty".to_string(), 117),
                ("bill".to_string(), 118),
                ("treaty".to_string(), 118),
            ]
        );
        assert_eq!(state.get("bill").session_number, Some(118));
        assert_eq!(state.get("treaty").session_number, Some(118));
    }

    #[tokio::test]
    async fn aborted_endpoint_does_not_stop_the_run() {
        let server = MockServer::start().await;
        mount_current(&server, 118).await;
        Mock::given(method("GET"))
            .and(path("/bill/118"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/nomination/118"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "nominations": [{"number": 1}],
                "pagination": {"count": 1}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut state = CursorState::new();
        let mut ops = Vec::new();
        let summary = engine(&server, "bill,nomination", 118)
            .run(&mut state, &mut ops)
            .await
            .unwrap();

        assert_eq!(summary.aborted().count(), 1);
        assert_eq!(summary.records(), 1);
        assert!(!state.contains("bill"));
        assert_eq!(state.get("nomination").offset, 0);
        assert!(matches!(
            &ops[0],
            Operation::Upsert { table, .. } if table == "nomination"
        ));
    }

    #[tokio::test]
    async fn second_run_skips_finished_endpoints() {
        let server = MockServer::start().await;
        mount_current(&server, 118).await;
        Mock::given(method("GET"))
            .and(path("/bill/118"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bills": []})))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine(&server, "bill", 118);
        let mut state = CursorState::new();
        engine.run(&mut state, &mut Vec::new()).await.unwrap();

        let mut ops = Vec::new();
        let summary = engine.run(&mut state, &mut ops).await.unwrap();
        assert_eq!(summary.reports[0].outcome, EndpointOutcome::Skipped);
        assert!(ops.is_empty());
    }

    #[tokio::test]
    async fn update_validates_configuration_first() {
        let err = update(&json!({"starting_congress_number": 118}), None, &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn summary_serializes_outcomes() {
        let summary = RunSummary {
            current_session: 118,
            reports: vec![EndpointReport {
                endpoint: "bill".into(),
                session: 118,
                outcome: EndpointOutcome::Done {
                    pages: 2,
                    records: 7,
                },
            }],
        };
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            json!({
                "current_session": 118,
                "reports": [{
                    "endpoint": "bill",
                    "session": 118,
                    "outcome": {"status": "done", "pages": 2, "records": 7}
                }]
            })
        );
    }
}
