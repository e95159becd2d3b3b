//! Authenticated GET client for the Congress.gov API with a fixed retry budget.

use std::time::Duration;

use congress_core::{RetryPolicy, SyncConfig};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::FetchError;

/// What a call is for. Only discovery treats 403 as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Discovery,
    Data,
}

enum Attempt {
    Success(Value),
    Retryable(String),
    Fatal(FetchError),
}

/// HTTP client for Congress.gov. Adds `api_key` and `format=json` to every call.
pub struct Fetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl Fetcher {
    /// `base_url` should be like `https://api.congress.gov/v3` (a trailing slash is trimmed).
    pub fn new(base_url: &str, api_key: &str, retry: RetryPolicy) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            retry,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, FetchError> {
        Self::new(&config.base_url, &config.api_key, config.retry)
    }

    /// Absolute URL for an API-relative path. Absolute URLs pass through.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// GET a data endpoint, retrying any failure until the budget runs out.
    pub async fn fetch(&self, path: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        self.fetch_as(CallKind::Data, path, query).await
    }

    pub async fn fetch_as(
        &self,
        kind: CallKind,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, FetchError> {
        let url = self.resolve(path);
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            debug!(url = %url, attempt, "GET");
            match self.attempt(kind, &url, query).await {
                Attempt::Success(body) => return Ok(body),
                Attempt::Fatal(err) => return Err(err),
                Attempt::Retryable(reason) => {
                    warn!(url = %url, attempt, max_attempts = attempts, reason = %reason, "request failed");
                    last_error = reason;
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.interval).await;
                    }
                }
            }
        }

        Err(FetchError::RetryExhausted {
            url,
            attempts,
            last_error,
        })
    }

    async fn attempt(&self, kind: CallKind, url: &str, query: &[(&str, String)]) -> Attempt {
        let resp = match self
            .client
            .get(url)
            .query(&[("api_key", self.api_key.as_str()), ("format", "json")])
            .query(query)
            .send()
            .await
        {
            Ok(resp) => resp,
            // Drop the URL from transport errors so the API key never reaches the logs.
            Err(err) => return Attempt::Retryable(err.without_url().to_string()),
        };

        let status = resp.status();
        if status == StatusCode::FORBIDDEN && kind == CallKind::Discovery {
            return Attempt::Fatal(FetchError::Forbidden {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Attempt::Retryable(format!("server returned {}", status.as_u16()));
        }

        match resp.json::<Value>().await {
            Ok(body) => Attempt::Success(body),
            Err(err) => Attempt::Retryable(format!("invalid JSON body: {}", err.without_url())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn fetcher_trims_trailing_slash() {
        let fetcher = Fetcher::new("http://localhost:4000/v3/", "k", fast_retry()).unwrap();
        assert_eq!(fetcher.base_url, "http://localhost:4000/v3");
        assert_eq!(fetcher.resolve("bill/118"), "http://localhost:4000/v3/bill/118");
        assert_eq!(fetcher.resolve("/bill/118"), "http://localhost:4000/v3/bill/118");
        assert_eq!(fetcher.resolve("https://elsewhere/x"), "https://elsewhere/x");
    }

    #[tokio::test]
    async fn adds_api_key_and_format() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bill/118"))
            .and(query_param("api_key", "secret"))
            .and(query_param("format", "json"))
            .and(query_param("limit", "250"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bills": []})))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&server.uri(), "secret", fast_retry()).unwrap();
        let body = fetcher
            .fetch("bill/118", &[("limit", "250".to_string())])
            .await
            .unwrap();
        assert_eq!(body, json!({"bills": []}));
    }

    #[tokio::test]
    async fn retries_until_budget_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&server.uri(), "k", fast_retry()).unwrap();
        let err = fetcher.fetch("bill/118", &[]).await.unwrap_err();
        match err {
            FetchError::RetryExhausted {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 4);
                assert!(last_error.contains("500"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&server.uri(), "k", fast_retry()).unwrap();
        let body = fetcher.fetch("congress/current", &[]).await.unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn forbidden_is_fatal_only_for_discovery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&server.uri(), "k", fast_retry()).unwrap();

        let err = fetcher
            .fetch_as(CallKind::Discovery, "congress/current", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Forbidden { .. }));

        let err = fetcher.fetch("bill/118", &[]).await.unwrap_err();
        assert!(matches!(err, FetchError::RetryExhausted { attempts: 4, .. }));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1 + 4);
    }

    #[tokio::test]
    async fn malformed_body_counts_against_budget() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(4)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&server.uri(), "k", fast_retry()).unwrap();
        let err = fetcher.fetch("bill/118", &[]).await.unwrap_err();
        assert!(err.to_string().contains("invalid JSON body"));
    }
}
