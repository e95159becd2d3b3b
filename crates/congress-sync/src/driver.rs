//! Incremental sync of one endpoint for one congress.
//!
//! Array endpoints page through an update-time window sorted ascending:
//!
//! ```text
//! CHECK_SKIP -> BUILD_PARAMS -> FETCH_PAGE -> EMPTY   -> advance watermark -> DONE
//!                                          -> PROCESS -> ADVANCE -> checkpoint -> FETCH_PAGE
//!                                                               -> count reached -> DONE
//! ```
//!
//! The `fromTime` watermark only moves once the whole window up to the
//! `toTime` captured at window start has been consumed, and `offset` goes back
//! to zero in the same checkpoint. Object endpoints fetch once per congress and
//! only record the congress number.

use std::fmt;

use chrono::{DateTime, Utc};
use congress_core::endpoint::SESSION_FIELD;
use congress_core::json::{self, navigate};
use congress_core::time::format_wire;
use congress_core::{
    Clock, CursorEntry, CursorPatch, CursorState, EndpointDescriptor, ResponseShape,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::enrich::DetailEnricher;
use crate::error::{FetchError, RecordError, SyncError};
use crate::http::Fetcher;
use crate::sink::OperationSink;

const SORT_ASCENDING: &str = "updateDate+asc";
const TOTAL_COUNT_PATH: &str = "pagination.count";

/// How one endpoint's sync ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EndpointOutcome {
    Done { pages: u32, records: u64 },
    Skipped,
    Aborted { reason: String },
}

impl fmt::Display for EndpointOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointOutcome::Done { pages, records } => {
                write!(f, "done ({records} records, {pages} pages)")
            }
            EndpointOutcome::Skipped => write!(f, "skipped (already current)"),
            EndpointOutcome::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}

/// True when the cursor already covers `session` as of `now`.
pub fn should_skip(entry: &CursorEntry, session: u32, now: DateTime<Utc>) -> bool {
    match (entry.session_number, entry.to_time) {
        (Some(recorded), Some(to)) => session < recorded || (session == recorded && now <= to),
        _ => false,
    }
}

/// The update-time window one array sync pages through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    from: Option<DateTime<Utc>>,
    to: DateTime<Utc>,
    offset: u64,
}

impl Window {
    /// Resume an interrupted window for the same congress, otherwise start a
    /// fresh one ending at `now`. A stored offset is never applied to a
    /// different window.
    fn open(entry: &CursorEntry, session: u32, now: DateTime<Utc>) -> Self {
        match entry.to_time {
            Some(to) if entry.offset > 0 && entry.session_number == Some(session) => Self {
                from: entry.from_time,
                to,
                offset: entry.offset,
            },
            _ => Self {
                from: entry.from_time,
                to: now,
                offset: 0,
            },
        }
    }

    /// A window whose lower bound is already its upper bound can return nothing.
    fn is_collapsed(&self) -> bool {
        self.from == Some(self.to)
    }

    fn params(&self, session: u32, page_size: u64) -> Vec<(&'static str, String)> {
        let mut params = session_params(session);
        params.push(("limit", page_size.to_string()));
        params.push(("sort", SORT_ASCENDING.to_string()));
        if let Some(from) = self.from {
            params.push(("fromDateTime", format_wire(from)));
        }
        params.push(("toDateTime", format_wire(self.to)));
        params.push(("offset", self.offset.to_string()));
        params
    }
}

fn session_params(session: u32) -> Vec<(&'static str, String)> {
    vec![("congress", session.to_string())]
}

pub struct EndpointDriver<'a> {
    fetcher: &'a Fetcher,
    enricher: DetailEnricher<'a>,
    clock: &'a dyn Clock,
}

impl<'a> EndpointDriver<'a> {
    pub fn new(fetcher: &'a Fetcher, clock: &'a dyn Clock) -> Self {
        Self {
            fetcher,
            enricher: DetailEnricher::new(fetcher, clock),
            clock,
        }
    }

    /// Run `endpoint` for `session` to completion.
    ///
    /// Only a failed checkpoint is returned as an error; fetch and record
    /// failures end this endpoint with [`EndpointOutcome::Aborted`].
    pub async fn sync(
        &self,
        endpoint: &EndpointDescriptor,
        session: u32,
        state: &mut CursorState,
        sink: &mut dyn OperationSink,
    ) -> Result<EndpointOutcome, SyncError> {
        let now = self.clock.now();
        let entry = state.get(&endpoint.name);

        if should_skip(&entry, session, now) {
            info!(endpoint = %endpoint.name, session, "already current, skipping");
            return Ok(EndpointOutcome::Skipped);
        }

        match endpoint.shape {
            ResponseShape::Array => {
                self.sync_array(endpoint, session, &entry, now, state, sink)
                    .await
            }
            ResponseShape::Object => self.sync_object(endpoint, session, state, sink).await,
        }
    }

    async fn sync_array(
        &self,
        endpoint: &EndpointDescriptor,
        session: u32,
        entry: &CursorEntry,
        now: DateTime<Utc>,
        state: &mut CursorState,
        sink: &mut dyn OperationSink,
    ) -> Result<EndpointOutcome, SyncError> {
        let path = endpoint.path_for(session);
        let page_size = endpoint.page_size();
        let mut window = Window::open(entry, session, now);
        let mut pages = 0;
        let mut records = 0;

        if window.offset > 0 {
            info!(endpoint = %endpoint.name, session, offset = window.offset, "resuming interrupted window");
        }
        if window.is_collapsed() && entry.session_number.is_some_and(|prev| prev < session) {
            warn!(
                endpoint = %endpoint.name,
                session,
                previous_session = entry.session_number.unwrap_or_default(),
                from = %format_wire(now),
                "watermark carried over from an earlier congress leaves an empty window"
            );
        }

        loop {
            info!(
                endpoint = %endpoint.name,
                session,
                offset = window.offset,
                to = %format_wire(window.to),
                "fetching page"
            );
            let body = match self
                .fetcher
                .fetch(&path, &window.params(session, page_size))
                .await
            {
                Ok(body) => body,
                Err(err) => return Ok(fetch_aborted(endpoint, session, err)),
            };
            pages += 1;

            let found = navigate(&body, &endpoint.records_path);
            let total = navigate(&body, TOTAL_COUNT_PATH).as_u64();

            if json::is_empty(&found) {
                info!(endpoint = %endpoint.name, session, "no more records");
                self.advance_watermark(endpoint, session, &window, state, sink)
                    .await?;
                return Ok(EndpointOutcome::Done { pages, records });
            }

            let items = match found {
                Value::Array(items) => items,
                other => {
                    let err = RecordError::UnexpectedShape {
                        path: endpoint.records_path.clone(),
                        kind: json::kind(&other),
                    };
                    return self.abort_with_checkpoint(endpoint, session, err, state, sink).await;
                }
            };
            for item in items {
                if let Err(err) = self.emit(endpoint, session, item, sink).await {
                    return self.abort_with_checkpoint(endpoint, session, err, state, sink).await;
                }
                records += 1;
            }

            let next = window.offset + page_size;
            if total.is_some_and(|total| next >= total) {
                info!(endpoint = %endpoint.name, session, total = total.unwrap_or_default(), "window consumed");
                self.advance_watermark(endpoint, session, &window, state, sink)
                    .await?;
                return Ok(EndpointOutcome::Done { pages, records });
            }

            window.offset = next;
            state.merge(
                &endpoint.name,
                CursorPatch {
                    to_time: Some(window.to),
                    offset: Some(next),
                    session_number: Some(session),
                    ..Default::default()
                },
            );
            checkpoint(state, sink).await?;
        }
    }

    async fn sync_object(
        &self,
        endpoint: &EndpointDescriptor,
        session: u32,
        state: &mut CursorState,
        sink: &mut dyn OperationSink,
    ) -> Result<EndpointOutcome, SyncError> {
        let path = endpoint.path_for(session);
        info!(endpoint = %endpoint.name, session, "fetching");
        let body = match self.fetcher.fetch(&path, &session_params(session)).await {
            Ok(body) => body,
            Err(err) => return Ok(fetch_aborted(endpoint, session, err)),
        };

        let found = navigate(&body, &endpoint.records_path);
        if json::is_empty(&found) {
            info!(endpoint = %endpoint.name, session, "no payload");
            return Ok(EndpointOutcome::Done {
                pages: 1,
                records: 0,
            });
        }

        let items = match found {
            Value::Array(items) => items,
            other => vec![other],
        };
        let mut records = 0;
        for item in items {
            if let Err(err) = self.emit(endpoint, session, item, sink).await {
                return self.abort_with_checkpoint(endpoint, session, err, state, sink).await;
            }
            records += 1;
        }

        state.merge(
            &endpoint.name,
            CursorPatch {
                session_number: Some(session),
                ..Default::default()
            },
        );
        checkpoint(state, sink).await?;
        Ok(EndpointOutcome::Done { pages: 1, records })
    }

    /// Inject, enrich and upsert one record.
    async fn emit(
        &self,
        endpoint: &EndpointDescriptor,
        session: u32,
        mut record: Value,
        sink: &mut dyn OperationSink,
    ) -> Result<(), RecordError> {
        if !record.is_object() {
            return Err(RecordError::NotAnObject(json::kind(&record)));
        }
        if endpoint.inject_session {
            record[SESSION_FIELD] = json!(session);
        }
        if let Some(detail) = &endpoint.detail {
            let payload = self.enricher.enrich(detail, &record).await;
            record["detail"] = payload;
        }
        sink.upsert(&endpoint.table, record)
            .await
            .map_err(|source| RecordError::Upsert {
                table: endpoint.table.clone(),
                source,
            })
    }

    /// Window fully consumed: move `fromTime` up to the window end and reset the offset.
    async fn advance_watermark(
        &self,
        endpoint: &EndpointDescriptor,
        session: u32,
        window: &Window,
        state: &mut CursorState,
        sink: &mut dyn OperationSink,
    ) -> Result<(), SyncError> {
        state.merge(
            &endpoint.name,
            CursorPatch {
                from_time: Some(window.to),
                to_time: Some(window.to),
                offset: Some(0),
                session_number: Some(session),
            },
        );
        checkpoint(state, sink).await
    }

    async fn abort_with_checkpoint(
        &self,
        endpoint: &EndpointDescriptor,
        session: u32,
        err: RecordError,
        state: &mut CursorState,
        sink: &mut dyn OperationSink,
    ) -> Result<EndpointOutcome, SyncError> {
        error!(endpoint = %endpoint.name, session, error = %err, "record processing failed, aborting endpoint");
        checkpoint(state, sink).await?;
        Ok(EndpointOutcome::Aborted {
            reason: err.to_string(),
        })
    }
}

fn fetch_aborted(endpoint: &EndpointDescriptor, session: u32, err: FetchError) -> EndpointOutcome {
    warn!(endpoint = %endpoint.name, session, error = %err, "fetch failed, leaving cursor untouched");
    EndpointOutcome::Aborted {
        reason: err.to_string(),
    }
}

async fn checkpoint(state: &CursorState, sink: &mut dyn OperationSink) -> Result<(), SyncError> {
    sink.checkpoint(state).await.map_err(SyncError::Checkpoint)
}
