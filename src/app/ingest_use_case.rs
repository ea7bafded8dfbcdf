use crate::classifier;
use crate::error::{BudgetExceeded, IngestError, Result};
use crate::fetcher::HttpFetcher;
use crate::observability::metrics;
use crate::resolver::ConfigResolver;
use crate::types::{validate_component, IngestionOutcome, IngestionRequest, OutcomeStatus};
use crate::writer::ObjectWriter;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};

/// Stages of a single invocation. Transitions are strictly forward; any stage
/// may fall through to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    ResolvingConfig,
    Fetching,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::ResolvingConfig => "resolving_config",
            Stage::Fetching => "fetching",
            Stage::Writing => "writing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Use case for one ingestion invocation: resolve, fetch, write, report.
pub struct IngestUseCase {
    resolver: ConfigResolver,
    fetcher: HttpFetcher,
    writer: ObjectWriter,
}

impl IngestUseCase {
    pub fn new(resolver: ConfigResolver, fetcher: HttpFetcher, writer: ObjectWriter) -> Self {
        Self { resolver, fetcher, writer }
    }

    pub async fn run(&self, request: &IngestionRequest) -> Result<IngestionOutcome> {
        let span = info_span!(
            "invocation",
            invocation_id = %request.invocation_id,
            secret_reference = %request.secret_reference
        );
        let started = Instant::now();
        let result = self.run_stages(request).instrument(span).await;

        let status = match &result {
            Ok(outcome) => match outcome.status {
                OutcomeStatus::Success => "success",
                OutcomeStatus::Partial => "partial",
                OutcomeStatus::Failure => "failure",
            },
            Err(_) => "failure",
        };
        metrics::invocation::finished(status, started.elapsed().as_secs_f64());
        result
    }

    /// Runs the invocation under `budget`. Expiry drops the in-flight stage
    /// without cleanup and yields no outcome.
    pub async fn run_within(
        &self,
        request: &IngestionRequest,
        budget: Duration,
    ) -> std::result::Result<Result<IngestionOutcome>, BudgetExceeded> {
        match tokio::time::timeout(budget, self.run(request)).await {
            Ok(result) => Ok(result),
            Err(_) => {
                error!(
                    invocation_id = %request.invocation_id,
                    budget_secs = budget.as_secs_f64(),
                    "invocation exceeded its time budget"
                );
                metrics::invocation::finished("expired", budget.as_secs_f64());
                Err(BudgetExceeded { budget })
            }
        }
    }

    async fn run_stages(&self, request: &IngestionRequest) -> Result<IngestionOutcome> {
        let mut stage = Stage::Start;
        let result = self.advance(request, &mut stage).await;
        match &result {
            Ok(outcome) => info!(stage = %Stage::Done, status = ?outcome.status, "invocation finished"),
            Err(e) => error!(
                stage = %Stage::Failed,
                failed_in = %stage,
                error_kind = %e.kind(),
                error = %e,
                "invocation failed"
            ),
        }
        result
    }

    async fn advance(&self, request: &IngestionRequest, stage: &mut Stage) -> Result<IngestionOutcome> {
        validate_component("invocation id", &request.invocation_id).map_err(|e| {
            IngestError::config_caused_by(request.secret_reference.clone(), "invalid invocation id", e)
        })?;

        *stage = Stage::ResolvingConfig;
        info!(stage = %stage, "resolving source configuration");
        let config = self.resolver.resolve(&request.secret_reference).await?;

        *stage = Stage::Fetching;
        info!(stage = %stage, source_id = %config.source_id, "fetching payload");
        let fetched = self.fetcher.fetch(&config, &request.query_parameters).await?;

        // counted before the write so the body can move into it
        let record_count = classifier::count_records(&fetched.raw_body);

        *stage = Stage::Writing;
        info!(stage = %stage, bytes = fetched.raw_body.len(), "writing raw payload");
        let key = self
            .writer
            .write(
                &request.raw_bucket,
                &config.source_id,
                &request.invocation_id,
                fetched.raw_body,
            )
            .await?;

        *stage = Stage::Done;
        Ok(match record_count {
            Ok(count) => IngestionOutcome::success(&key, fetched.attempt_count, count),
            Err(e) => {
                warn!(key = %key, error = %e, "stored payload but could not count records");
                IngestionOutcome::partial(&key, fetched.attempt_count)
            }
        })
    }
}
