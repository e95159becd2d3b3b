//! Per-endpoint cursor state carried between runs.
//!
//! The host persists whatever [`CursorState::snapshot`] returns at each
//! checkpoint and hands it back on the next run. Entries are only ever added
//! or overwritten field by field; nothing is deleted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::json::kind as json_kind;
use crate::time::wire_opt;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("state must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("invalid cursor entry for `{endpoint}`: {source}")]
    Entry {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Where one endpoint's sync left off.
///
/// `offset` is only meaningful for the `(from_time, to_time, session_number)`
/// triple it was recorded with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorEntry {
    /// Watermark of the last fully synced instant. `None` means "from the beginning".
    #[serde(default, with = "wire_opt")]
    pub from_time: Option<DateTime<Utc>>,
    /// Upper bound of the window being (or last) synced.
    #[serde(default, with = "wire_opt")]
    pub to_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_number: Option<u32>,
}

/// Field-level overwrite applied by [`CursorState::merge`]. `None` leaves the
/// stored field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorPatch {
    pub from_time: Option<DateTime<Utc>>,
    pub to_time: Option<DateTime<Utc>>,
    pub offset: Option<u64>,
    pub session_number: Option<u32>,
}

/// Cursor entries keyed by endpoint name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CursorState {
    entries: BTreeMap<String, CursorEntry>,
}

impl CursorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the store from the host's last persisted snapshot.
    ///
    /// `null` and `{}` both mean "first run". Keys whose value is `null` are
    /// treated as absent.
    pub fn from_value(value: Option<&serde_json::Value>) -> Result<Self, StateError> {
        let map = match value {
            None | Some(serde_json::Value::Null) => return Ok(Self::new()),
            Some(serde_json::Value::Object(map)) => map,
            Some(other) => return Err(StateError::NotAnObject(json_kind(other))),
        };

        let mut entries = BTreeMap::new();
        for (name, raw) in map {
            if raw.is_null() {
                tracing::debug!(endpoint = %name, "ignoring null cursor entry");
                continue;
            }
            let entry: CursorEntry =
                serde_json::from_value(raw.clone()).map_err(|source| StateError::Entry {
                    endpoint: name.clone(),
                    source,
                })?;
            entries.insert(name.clone(), entry);
        }
        Ok(Self { entries })
    }

    /// The entry for `endpoint`, or a zero-valued one if nothing is recorded.
    pub fn get(&self, endpoint: &str) -> CursorEntry {
        self.entries.get(endpoint).cloned().unwrap_or_default()
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.entries.contains_key(endpoint)
    }

    pub fn merge(&mut self, endpoint: &str, patch: CursorPatch) {
        let entry = self.entries.entry(endpoint.to_string()).or_default();
        if let Some(from_time) = patch.from_time {
            entry.from_time = Some(from_time);
        }
        if let Some(to_time) = patch.to_time {
            entry.to_time = Some(to_time);
        }
        if let Some(offset) = patch.offset {
            entry.offset = offset;
        }
        if let Some(session) = patch.session_number {
            entry.session_number = Some(session);
        }
    }

    /// Full state as JSON, ready for the host to persist.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CursorEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn missing_entry_is_zero_valued() {
        let state = CursorState::new();
        let entry = state.get("bill");
        assert_eq!(entry.from_time, None);
        assert_eq!(entry.to_time, None);
        assert_eq!(entry.offset, 0);
        assert_eq!(entry.session_number, None);
        assert!(!state.contains("bill"));
    }

    #[test]
    fn null_and_empty_state_are_first_run() {
        assert!(CursorState::from_value(None).unwrap().is_empty());
        assert!(CursorState::from_value(Some(&json!(null))).unwrap().is_empty());
        assert!(CursorState::from_value(Some(&json!({}))).unwrap().is_empty());
    }

    #[test]
    fn parses_persisted_snapshot() {
        let raw = json!({
            "bill": {
                "fromTime": "2024-01-01T00:00:00Z",
                "toTime": "2024-01-02T00:00:00Z",
                "offset": 500,
                "sessionNumber": 118
            },
            "member": {"fromTime": null, "offset": 0},
            "treaty": null
        });
        let state = CursorState::from_value(Some(&raw)).unwrap();
        assert_eq!(state.len(), 2);

        let bill = state.get("bill");
        assert_eq!(
            bill.from_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(bill.offset, 500);
        assert_eq!(bill.session_number, Some(118));
        assert_eq!(state.get("member").from_time, None);
    }

    #[test]
    fn rejects_non_object_state() {
        let err = CursorState::from_value(Some(&json!([1, 2]))).unwrap_err();
        assert!(matches!(err, StateError::NotAnObject("an array")));
    }

    #[test]
    fn rejects_malformed_entry() {
        let raw = json!({"bill": {"fromTime": "not a time"}});
        let err = CursorState::from_value(Some(&raw)).unwrap_err();
        assert!(err.to_string().contains("bill"));
    }

    #[test]
    fn merge_overwrites_only_given_fields() {
        let mut state = CursorState::new();
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        state.merge(
            "bill",
            CursorPatch {
                to_time: Some(t1),
                offset: Some(250),
                session_number: Some(118),
                ..Default::default()
            },
        );
        state.merge(
            "bill",
            CursorPatch {
                offset: Some(500),
                ..Default::default()
            },
        );

        let entry = state.get("bill");
        assert_eq!(entry.from_time, None);
        assert_eq!(entry.to_time, Some(t1));
        assert_eq!(entry.offset, 500);
        assert_eq!(entry.session_number, Some(118));
    }

    #[test]
    fn snapshot_uses_wire_timestamps() {
        let mut state = CursorState::new();
        state.merge(
            "bill",
            CursorPatch {
                from_time: Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()),
                offset: Some(0),
                session_number: Some(118),
                ..Default::default()
            },
        );
        assert_eq!(
            state.snapshot(),
            json!({
                "bill": {
                    "fromTime": "2024-05-01T08:00:00Z",
                    "toTime": null,
                    "offset": 0,
                    "sessionNumber": 118
                }
            })
        );
    }

    #[test]
    fn snapshot_reloads_identically() {
        let mut state = CursorState::new();
        state.merge(
            "committee",
            CursorPatch {
                from_time: Some(Utc.with_ymd_and_hms(2023, 2, 3, 4, 5, 6).unwrap()),
                to_time: Some(Utc.with_ymd_and_hms(2023, 2, 3, 4, 5, 6).unwrap()),
                offset: Some(0),
                session_number: Some(117),
            },
        );
        let reloaded = CursorState::from_value(Some(&state.snapshot())).unwrap();
        assert_eq!(reloaded, state);
    }
}
