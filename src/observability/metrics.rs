//! Metrics for the ingestion path
//!
//! Recording goes through the `metrics` facade; a Prometheus recorder is
//! installed by [`init`] and can be rendered with [`render`]. Without a
//! recorder every call below is a no-op.

use std::fmt;
use std::sync::OnceLock;
use tracing::info;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Secret resolution
    SecretsCacheHits,
    SecretsCacheMisses,
    SecretsLookupsSuccess,
    SecretsLookupsError,

    // Fetch
    FetchAttempts,
    FetchRetries,
    FetchSuccess,
    FetchError,
    FetchAttemptDuration,
    FetchPayloadBytes,

    // Storage
    StorageWritesSuccess,
    StorageWritesError,
    StorageWriteBytes,

    // Invocations
    InvocationsTotal,
    InvocationDuration,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SecretsCacheHits => "raw_ingest_secrets_cache_hits_total",
            MetricName::SecretsCacheMisses => "raw_ingest_secrets_cache_misses_total",
            MetricName::SecretsLookupsSuccess => "raw_ingest_secrets_lookups_success_total",
            MetricName::SecretsLookupsError => "raw_ingest_secrets_lookups_error_total",

            MetricName::FetchAttempts => "raw_ingest_fetch_attempts_total",
            MetricName::FetchRetries => "raw_ingest_fetch_retries_total",
            MetricName::FetchSuccess => "raw_ingest_fetch_success_total",
            MetricName::FetchError => "raw_ingest_fetch_error_total",
            MetricName::FetchAttemptDuration => "raw_ingest_fetch_attempt_duration_seconds",
            MetricName::FetchPayloadBytes => "raw_ingest_fetch_payload_bytes",

            MetricName::StorageWritesSuccess => "raw_ingest_storage_writes_success_total",
            MetricName::StorageWritesError => "raw_ingest_storage_writes_error_total",
            MetricName::StorageWriteBytes => "raw_ingest_storage_write_bytes",

            MetricName::InvocationsTotal => "raw_ingest_invocations_total",
            MetricName::InvocationDuration => "raw_ingest_invocation_duration_seconds",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            SecretsCacheHits,
            SecretsCacheMisses,
            SecretsLookupsSuccess,
            SecretsLookupsError,
            FetchAttempts,
            FetchRetries,
            FetchSuccess,
            FetchError,
            FetchAttemptDuration,
            FetchPayloadBytes,
            StorageWritesSuccess,
            StorageWritesError,
            StorageWriteBytes,
            InvocationsTotal,
            InvocationDuration,
        ]
        .into_iter()
    }

    /// Returns (phase, description)
    pub fn metadata(&self) -> (&'static str, &'static str) {
        match self {
            MetricName::SecretsCacheHits => ("secrets", "Source configurations served from cache"),
            MetricName::SecretsCacheMisses => ("secrets", "Cache misses that required a lookup"),
            MetricName::SecretsLookupsSuccess => ("secrets", "Successful secret store lookups"),
            MetricName::SecretsLookupsError => ("secrets", "Failed secret store lookups"),
            MetricName::FetchAttempts => ("fetch", "HTTP attempts against sources"),
            MetricName::FetchRetries => ("fetch", "Attempts that were retried"),
            MetricName::FetchSuccess => ("fetch", "Fetches that returned 2xx"),
            MetricName::FetchError => ("fetch", "Fetches that failed, by error kind"),
            MetricName::FetchAttemptDuration => ("fetch", "Duration of a single attempt"),
            MetricName::FetchPayloadBytes => ("fetch", "Size of fetched payloads"),
            MetricName::StorageWritesSuccess => ("storage", "Successful object writes"),
            MetricName::StorageWritesError => ("storage", "Failed object writes"),
            MetricName::StorageWriteBytes => ("storage", "Bytes written per object"),
            MetricName::InvocationsTotal => ("invocation", "Finished invocations, by status"),
            MetricName::InvocationDuration => ("invocation", "End-to-end invocation duration"),
        }
    }

    fn is_histogram(&self) -> bool {
        let name = self.as_str();
        name.ends_with("_seconds") || name.ends_with("_bytes")
    }
}

static PROMETHEUS: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it twice is harmless.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if PROMETHEUS.get().is_some() {
        return Ok(());
    }
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    describe_all();
    PROMETHEUS.set(handle).ok();
    info!("Metrics system initialized");
    Ok(())
}

/// Prometheus exposition text, if a recorder was installed.
pub fn render() -> Option<String> {
    PROMETHEUS.get().map(|handle| handle.render())
}

fn describe_all() {
    for metric in MetricName::all_metrics() {
        let (_, description) = metric.metadata();
        if metric.is_histogram() {
            ::metrics::describe_histogram!(metric.as_str(), description);
        } else {
            ::metrics::describe_counter!(metric.as_str(), description);
        }
    }
}

// ============================================================================
// Secrets Metrics
// ============================================================================

pub mod secrets {
    use super::MetricName;

    pub fn cache_hit() {
        ::metrics::counter!(MetricName::SecretsCacheHits.as_str()).increment(1);
    }

    pub fn cache_miss() {
        ::metrics::counter!(MetricName::SecretsCacheMisses.as_str()).increment(1);
    }

    pub fn lookup_success() {
        ::metrics::counter!(MetricName::SecretsLookupsSuccess.as_str()).increment(1);
    }

    pub fn lookup_error() {
        ::metrics::counter!(MetricName::SecretsLookupsError.as_str()).increment(1);
    }
}

// ============================================================================
// Fetch Metrics
// ============================================================================

pub mod fetch {
    use super::MetricName;

    pub fn attempt(source_id: &str) {
        ::metrics::counter!(MetricName::FetchAttempts.as_str(), "source_id" => source_id.to_string())
            .increment(1);
    }

    pub fn retry(source_id: &str) {
        ::metrics::counter!(MetricName::FetchRetries.as_str(), "source_id" => source_id.to_string())
            .increment(1);
    }

    pub fn success(source_id: &str, bytes: usize) {
        ::metrics::counter!(MetricName::FetchSuccess.as_str(), "source_id" => source_id.to_string())
            .increment(1);
        ::metrics::histogram!(MetricName::FetchPayloadBytes.as_str(), "source_id" => source_id.to_string())
            .record(bytes as f64);
    }

    pub fn error(source_id: &str, error_kind: &str) {
        ::metrics::counter!(MetricName::FetchError.as_str(),
            "source_id" => source_id.to_string(),
            "error_kind" => error_kind.to_string()
        )
        .increment(1);
    }

    pub fn attempt_duration(secs: f64) {
        ::metrics::histogram!(MetricName::FetchAttemptDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Storage Metrics
// ============================================================================

pub mod storage {
    use super::MetricName;

    pub fn write_success(backend: &'static str, bytes: usize) {
        ::metrics::counter!(MetricName::StorageWritesSuccess.as_str(), "backend" => backend).increment(1);
        ::metrics::histogram!(MetricName::StorageWriteBytes.as_str(), "backend" => backend)
            .record(bytes as f64);
    }

    pub fn write_error(backend: &'static str) {
        ::metrics::counter!(MetricName::StorageWritesError.as_str(), "backend" => backend).increment(1);
    }
}

// ============================================================================
// Invocation Metrics
// ============================================================================

pub mod invocation {
    use super::MetricName;

    pub fn finished(status: &'static str, secs: f64) {
        ::metrics::counter!(MetricName::InvocationsTotal.as_str(), "status" => status).increment(1);
        ::metrics::histogram!(MetricName::InvocationDuration.as_str()).record(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn metric_names_are_unique_and_prefixed() {
        let names: HashSet<_> = MetricName::all_metrics().map(|m| m.as_str()).collect();
        assert_eq!(names.len(), MetricName::all_metrics().count());
        assert!(names.iter().all(|n| n.starts_with("raw_ingest_")));
    }

    #[test]
    fn durations_and_sizes_are_histograms() {
        assert!(MetricName::FetchAttemptDuration.is_histogram());
        assert!(MetricName::StorageWriteBytes.is_histogram());
        assert!(!MetricName::FetchRetries.is_histogram());
    }
}
