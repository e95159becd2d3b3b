//! Per-record detail requests.

use congress_core::json::{navigate, render_template};
use congress_core::time::format_wire;
use congress_core::{Clock, DetailDescriptor};
use serde_json::{Value, json};
use tracing::warn;

use crate::http::Fetcher;

pub struct DetailEnricher<'a> {
    fetcher: &'a Fetcher,
    clock: &'a dyn Clock,
}

impl<'a> DetailEnricher<'a> {
    pub fn new(fetcher: &'a Fetcher, clock: &'a dyn Clock) -> Self {
        Self { fetcher, clock }
    }

    /// Fetch the detail payload for `record`.
    ///
    /// Never fails: a failed request yields `{url, error, timestamp}` in place
    /// of the payload so the base record is still emitted.
    pub async fn enrich(&self, detail: &DetailDescriptor, record: &Value) -> Value {
        let url = self
            .fetcher
            .resolve(&render_template(&detail.url_template, record));

        match self.fetcher.fetch(&url, &[]).await {
            Ok(body) => navigate(&body, &detail.records_path),
            Err(err) => {
                warn!(url = %url, error = %err, "detail request failed");
                json!({
                    "url": url,
                    "error": err.to_string(),
                    "timestamp": format_wire(self.clock.now()),
                })
            }
        }
    }
}
