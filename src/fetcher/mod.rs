pub mod retry;

use crate::app::ports::{HttpClientPort, HttpGetRequest, TransportError};
use crate::classifier::{self, ResponseClass};
use crate::error::{IngestError, Result};
use crate::observability::metrics;
use crate::types::{FetchResult, SourceConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub use retry::RetryPolicy;

/// Executes the authenticated GET against a source with bounded retries.
pub struct HttpFetcher {
    http: Arc<dyn HttpClientPort>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(http: Arc<dyn HttpClientPort>, policy: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self { http, policy, attempt_timeout }
    }

    pub async fn fetch(
        &self,
        config: &SourceConfig,
        query_parameters: &BTreeMap<String, String>,
    ) -> Result<FetchResult> {
        let request = HttpGetRequest {
            url: config.endpoint.clone(),
            query: query_parameters.clone(),
            bearer_token: config.auth_token.clone(),
            timeout: self.attempt_timeout,
        };
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_status = None;
        let mut last_error: Option<TransportError> = None;

        for attempt in 1..=max_attempts {
            metrics::fetch::attempt(&config.source_id);
            let started = Instant::now();
            let outcome = self.http.get(&request).await;
            metrics::fetch::attempt_duration(started.elapsed().as_secs_f64());

            match outcome {
                Ok(resp) => match classifier::classify_status(resp.status, &self.policy) {
                    ResponseClass::Success => {
                        info!(
                            source_id = %config.source_id,
                            status = resp.status,
                            attempt,
                            bytes = resp.bytes.len(),
                            content_type = resp.content_type.as_deref().unwrap_or("unknown"),
                            "fetch succeeded"
                        );
                        metrics::fetch::success(&config.source_id, resp.bytes.len());
                        return Ok(FetchResult {
                            status_code: resp.status,
                            raw_body: resp.bytes,
                            attempt_count: attempt,
                        });
                    }
                    ResponseClass::Permanent => {
                        warn!(source_id = %config.source_id, status = resp.status, attempt, "permanent HTTP failure");
                        let err = IngestError::PermanentHttp { status: resp.status, attempts: attempt };
                        metrics::fetch::error(&config.source_id, err.kind().as_str());
                        return Err(err);
                    }
                    ResponseClass::Transient => {
                        warn!(source_id = %config.source_id, status = resp.status, attempt, "transient HTTP status");
                        last_status = Some(resp.status);
                        last_error = None;
                    }
                },
                Err(e) => match classifier::classify_transport(&e) {
                    ResponseClass::Permanent => {
                        let err = IngestError::config_caused_by(
                            config.endpoint.clone(),
                            "endpoint cannot form a valid request",
                            e,
                        );
                        metrics::fetch::error(&config.source_id, err.kind().as_str());
                        return Err(err);
                    }
                    _ => {
                        warn!(source_id = %config.source_id, attempt, error = %e, "transport failure");
                        last_status = None;
                        last_error = Some(e);
                    }
                },
            }

            if attempt < max_attempts {
                let delay = self.policy.delay_with_jitter(attempt);
                debug!(source_id = %config.source_id, attempt, delay_ms = delay.as_millis() as u64, "backing off");
                metrics::fetch::retry(&config.source_id);
                tokio::time::sleep(delay).await;
            }
        }

        let err = classifier::exhausted(max_attempts, last_status, last_error);
        metrics::fetch::error(&config.source_id, err.kind().as_str());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::HttpGetResult;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed script of responses and records every request.
    struct ScriptedHttp {
        script: Mutex<Vec<std::result::Result<u16, TransportError>>>,
        seen: Mutex<Vec<HttpGetRequest>>,
    }

    impl ScriptedHttp {
        fn new(mut script: Vec<std::result::Result<u16, TransportError>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self { script: Mutex::new(script), seen: Mutex::new(Vec::new()) })
        }

        fn requests(&self) -> Vec<HttpGetRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClientPort for ScriptedHttp {
        async fn get(&self, request: &HttpGetRequest) -> std::result::Result<HttpGetResult, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            let next = self.script.lock().unwrap().pop().expect("script exhausted");
            next.map(|status| HttpGetResult {
                status,
                bytes: b"[1,2]".to_vec(),
                content_type: Some("application/json".into()),
            })
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    fn config() -> SourceConfig {
        SourceConfig {
            endpoint: "https://api.example.com/items".into(),
            auth_token: "tok".into(),
            source_id: "items".into(),
        }
    }

    fn params() -> BTreeMap<String, String> {
        BTreeMap::from([("page".to_string(), "1".to_string())])
    }

    #[tokio::test]
    async fn retries_transient_statuses_until_success() {
        let http = ScriptedHttp::new(vec![Ok(503), Ok(503), Ok(200)]);
        let fetcher = HttpFetcher::new(http.clone(), fast_policy(3), Duration::from_secs(1));

        let result = fetcher.fetch(&config(), &params()).await.unwrap();
        assert_eq!(result.attempt_count, 3);
        assert_eq!(result.status_code, 200);

        let requests = http.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.query == params() && r.bearer_token == "tok"));
    }

    #[tokio::test]
    async fn permanent_status_fails_on_first_attempt() {
        let http = ScriptedHttp::new(vec![Ok(404)]);
        let fetcher = HttpFetcher::new(http.clone(), fast_policy(3), Duration::from_secs(1));

        let err = fetcher.fetch(&config(), &params()).await.unwrap_err();
        assert!(matches!(err, IngestError::PermanentHttp { status: 404, attempts: 1 }));
        assert_eq!(http.requests().len(), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_configured_attempts() {
        let http = ScriptedHttp::new(vec![Ok(500), Ok(500), Ok(500), Ok(500)]);
        let fetcher = HttpFetcher::new(http.clone(), fast_policy(4), Duration::from_secs(1));

        let err = fetcher.fetch(&config(), &params()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientNetworkError);
        assert_eq!(err.attempts(), Some(4));
        assert_eq!(http.requests().len(), 4);
    }

    #[tokio::test]
    async fn timeouts_and_429_are_retried() {
        let http = ScriptedHttp::new(vec![
            Err(TransportError::Timeout(Duration::from_secs(1))),
            Ok(429),
            Ok(204),
        ]);
        let fetcher = HttpFetcher::new(http.clone(), fast_policy(3), Duration::from_secs(1));

        let result = fetcher.fetch(&config(), &params()).await.unwrap();
        assert_eq!(result.attempt_count, 3);
        assert_eq!(result.status_code, 204);
    }

    #[tokio::test]
    async fn unbuildable_request_names_the_endpoint() {
        let http = ScriptedHttp::new(vec![Err(TransportError::InvalidRequest("bad header".into()))]);
        let fetcher = HttpFetcher::new(http.clone(), fast_policy(3), Duration::from_secs(1));

        let err = fetcher.fetch(&config(), &params()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert!(err.to_string().contains("https://api.example.com/items"), "{}", err);
        assert_eq!(http.requests().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_network_failure_keeps_cause() {
        use std::error::Error as _;
        let http = ScriptedHttp::new(vec![
            Err(TransportError::Network { message: "connection refused".into(), source: None }),
            Err(TransportError::Network { message: "connection refused".into(), source: None }),
        ]);
        let fetcher = HttpFetcher::new(http, fast_policy(2), Duration::from_secs(1));

        let err = fetcher.fetch(&config(), &params()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientNetworkError);
        assert!(err.source().unwrap().to_string().contains("connection refused"));
    }
}
