//! Parallel prediction round.
//!
//! One task per metric, one blocking join over all of them. A metric whose
//! invocation fails or whose task panics still gets an entry, marked invalid.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use forecast_types::{ApplicationName, MetricBounds, MetricName, PredictionOutcome};
use futures::future::join_all;
use tracing::{debug, error, instrument};

use crate::error::{EngineError, EngineResult};
use crate::invoker::{forecast_metric, ForecastInvoker, InvocationRequest};

/// One metric to forecast in a round.
#[derive(Debug, Clone)]
pub struct MetricJob {
    pub metric: MetricName,
    pub data_file: PathBuf,
    pub bounds: MetricBounds,
}

/// Outcomes of one round, keyed by metric.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundResults {
    /// Slot the round targeted, epoch seconds.
    pub slot: i64,
    pub outcomes: BTreeMap<MetricName, PredictionOutcome>,
}

impl RoundResults {
    /// Longest per-metric invocation of the round.
    pub fn max_elapsed(&self) -> Duration {
        self.outcomes
            .values()
            .map(|outcome| outcome.elapsed)
            .max()
            .unwrap_or_default()
    }

    pub fn valid_count(&self) -> usize {
        self.outcomes.values().filter(|outcome| outcome.valid).count()
    }

    pub fn invalid_count(&self) -> usize {
        self.outcomes.len() - self.valid_count()
    }
}

/// Runs every metric of an application concurrently.
pub struct RoundExecutor {
    invoker: Arc<dyn ForecastInvoker>,
}

impl RoundExecutor {
    pub fn new(invoker: Arc<dyn ForecastInvoker>) -> Self {
        Self { invoker }
    }

    /// Forecast every job for `slot` and wait for all of them.
    ///
    /// `target` is what the invoker is asked for; it differs from `slot`
    /// only in test mode, where it is `None`.
    #[instrument(skip(self, jobs), fields(metrics = jobs.len()))]
    pub async fn run_round(
        &self,
        application: &ApplicationName,
        jobs: &[MetricJob],
        slot: i64,
        target: Option<i64>,
    ) -> EngineResult<RoundResults> {
        if jobs.is_empty() {
            return Err(EngineError::RoundFailed {
                application: application.clone(),
                reason: "no metrics to forecast".to_string(),
            });
        }

        debug!(pool_size = jobs.len(), "Starting prediction tasks");
        let started = Instant::now();

        let handles: Vec<_> = jobs
            .iter()
            .map(|job| {
                let invoker = self.invoker.clone();
                let request = InvocationRequest {
                    application: application.clone(),
                    metric: job.metric.clone(),
                    data_file: job.data_file.clone(),
                    bounds: job.bounds,
                    target,
                };
                tokio::spawn(async move { forecast_metric(invoker.as_ref(), &request).await })
            })
            .collect();

        let joined = join_all(handles).await;

        let outcomes = jobs
            .iter()
            .zip(joined)
            .map(|(job, result)| {
                let outcome = result.unwrap_or_else(|e| {
                    error!(metric = %job.metric, error = %e, "Prediction task did not complete");
                    PredictionOutcome::invalid(started.elapsed())
                });
                (job.metric.clone(), outcome)
            })
            .collect();

        Ok(RoundResults { slot, outcomes })
    }
}
