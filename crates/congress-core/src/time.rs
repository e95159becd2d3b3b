//! Wall-clock access and the API's timestamp wire format.
//!
//! Congress.gov accepts and returns second-precision UTC timestamps like
//! `2024-03-01T12:00:00Z`. Cursor windows are stored in the same format so the
//! persisted state can be pasted straight into a request.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

/// `fromDateTime` / `toDateTime` format expected by the API.
pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format a timestamp for a query parameter or a cursor entry.
pub fn format_wire(ts: DateTime<Utc>) -> String {
    ts.format(WIRE_FORMAT).to_string()
}

/// Parse a wire timestamp. Full RFC 3339 strings are accepted too, since
/// older state snapshots may have been written by other tooling.
pub fn parse_wire(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, WIRE_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(0))
}

/// Source of "now" for window boundaries and skip decisions.
pub trait Clock: Send + Sync {
    /// Current time, truncated to whole seconds.
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }
}

/// A clock pinned to one instant. Used by tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0.trunc_subsecs(0)
    }
}

/// Serde adapter for `Option<DateTime<Utc>>` in wire format.
pub(crate) mod wire_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&super::format_wire(*ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => super::parse_wire(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s}"))),
        }
    }
}
