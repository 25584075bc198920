//! Per-application scheduling loop.
//!
//! Each cycle plans the next due slot, sleeps until one horizon before it,
//! refreshes the data snapshot and forecasts `batch_depth` consecutive
//! slots. Valid outcomes are sanitized and handed to the sink. The loop
//! exits only when the application's active flag is cleared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forecast_types::{ApplicationName, ForecastMessage, MetricBounds, MetricName};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::events::ForecastEvent;
use crate::executor::{MetricJob, RoundExecutor, RoundResults};
use crate::sanitize::sanitize;
use crate::schedule::{Clock, ScheduleState};
use crate::snapshot::SnapshotProvider;

/// Snapshot of what the next batch should forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationPlan {
    pub application: ApplicationName,
    pub metrics: Vec<(MetricName, MetricBounds)>,
    pub epoch_start: i64,
    pub horizon: u64,
    /// Processing-time estimate carried over from earlier rounds.
    pub processing_estimate_secs: f64,
}

/// Live view of one application, owned by the registry.
#[async_trait]
pub trait ForecastTarget: Send + Sync {
    fn application(&self) -> &ApplicationName;

    /// Active flag. The loop runs while it reads `true`.
    fn active(&self) -> watch::Receiver<bool>;

    /// Current metrics and schedule, or `None` once the record is gone.
    async fn plan(&self) -> Option<ApplicationPlan>;

    /// Store the processing-time estimate and the first round of a batch.
    async fn record_feedback(&self, estimate_secs: f64, first_round: &RoundResults);
}

/// Receives sanitized forecasts. Must not block the caller.
pub trait PredictionSink: Send + Sync {
    fn deliver(&self, application: &ApplicationName, metric: &MetricName, forecast: ForecastMessage);
}

/// Collaborators shared by every scheduler loop.
#[derive(Clone)]
pub struct SchedulerContext {
    pub executor: Arc<RoundExecutor>,
    pub snapshots: Arc<dyn SnapshotProvider>,
    pub sink: Arc<dyn PredictionSink>,
    pub clock: Arc<dyn Clock>,
    pub events: broadcast::Sender<ForecastEvent>,
    /// When set, invocations omit the target slot.
    pub test_mode: Arc<AtomicBool>,
}

/// Drives forecast rounds for one application.
pub struct ForecastScheduler {
    target: Arc<dyn ForecastTarget>,
    ctx: SchedulerContext,
}

impl ForecastScheduler {
    pub fn new(target: Arc<dyn ForecastTarget>, ctx: SchedulerContext) -> Self {
        Self { target, ctx }
    }

    /// Run the loop on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until the application is deactivated.
    #[instrument(skip(self), fields(application = %self.target.application()))]
    pub async fn run(self) {
        let application = self.target.application().clone();
        let mut active = self.target.active();
        let mut schedule: Option<ScheduleState> = None;

        info!("Forecast scheduler started");

        while is_active(&active) {
            let Some(plan) = self.target.plan().await else {
                warn!("Application record disappeared, stopping scheduler");
                break;
            };

            let updated = match schedule.take() {
                Some(mut state) => state
                    .realign(plan.epoch_start, plan.horizon)
                    .map(|()| state),
                None => ScheduleState::new(
                    plan.epoch_start,
                    plan.horizon,
                    plan.processing_estimate_secs,
                ),
            };
            let state = match updated {
                Ok(state) => schedule.insert(state),
                Err(e) => {
                    error!(error = %e, "Unusable schedule parameters");
                    break;
                }
            };

            let slot_plan = state.plan(self.ctx.clock.now());
            let wake_at = state.wake_at(&slot_plan);

            if let Some(factor) = slot_plan.catch_up_factor {
                warn!(
                    earliest_due = slot_plan.earliest_due,
                    next_due = slot_plan.next_due,
                    factor,
                    max_processing_secs = state.max_processing_secs(),
                    "Processing time overruns the earliest slot, skipping ahead"
                );
                self.emit(ForecastEvent::SlotsSkipped {
                    application: application.clone(),
                    earliest_due: slot_plan.earliest_due,
                    next_due: slot_plan.next_due,
                    factor,
                });
            }

            debug!(next_due = slot_plan.next_due, wake_at, "Next batch planned");
            self.emit(ForecastEvent::SlotPlanned {
                application: application.clone(),
                next_due: slot_plan.next_due,
                wake_at,
            });

            let wait = wake_at as f64 - self.ctx.clock.now();
            if wait > 0.0 {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs_f64(wait)) => {}
                    changed = active.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        // Woken by a flag change: re-check and re-plan.
                        continue;
                    }
                }
            }

            if !is_active(&active) {
                break;
            }

            // Metrics or bounds may have changed while sleeping.
            let Some(plan) = self.target.plan().await else {
                break;
            };

            let settings = match self.ctx.snapshots.refresh(&application).await {
                Ok(settings) => settings,
                Err(e) => {
                    error!(error = %e, slot = slot_plan.next_due, "Batch abandoned");
                    self.emit(ForecastEvent::BatchAborted {
                        application: application.clone(),
                        slot: slot_plan.next_due,
                        produced: 0,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let jobs: Vec<MetricJob> = plan
                .metrics
                .iter()
                .map(|(metric, bounds)| MetricJob {
                    metric: metric.clone(),
                    data_file: self.ctx.snapshots.data_file(&application, metric),
                    bounds: *bounds,
                })
                .collect();

            let first_round = self
                .run_batch(&application, &jobs, state.batch_slots(&slot_plan, settings.batch_depth))
                .await;

            if let Some(first_round) = first_round {
                let observed = first_round.max_elapsed();
                if let Some(previous) = state.observe(observed) {
                    info!(
                        from_secs = previous,
                        to_secs = state.max_processing_secs(),
                        "Processing-time estimate raised"
                    );
                    self.emit(ForecastEvent::EstimateRaised {
                        application: application.clone(),
                        from_secs: previous,
                        to_secs: state.max_processing_secs(),
                    });
                }
                self.target
                    .record_feedback(state.max_processing_secs(), &first_round)
                    .await;
            }
        }

        info!("Forecast scheduler stopped");
        self.emit(ForecastEvent::SchedulerStopped(application));
    }

    /// Forecast each slot in turn. Returns the first slot's results.
    async fn run_batch(
        &self,
        application: &ApplicationName,
        jobs: &[MetricJob],
        slots: Vec<i64>,
    ) -> Option<RoundResults> {
        let mut first_round = None;

        for (produced, slot) in slots.into_iter().enumerate() {
            let target = if self.ctx.test_mode.load(Ordering::Relaxed) {
                None
            } else {
                Some(slot)
            };

            let results = match self.ctx.executor.run_round(application, jobs, slot, target).await {
                Ok(results) => results,
                Err(e) => {
                    error!(error = %e, slot, produced, "Round failed, abandoning rest of batch");
                    self.emit(ForecastEvent::BatchAborted {
                        application: application.clone(),
                        slot,
                        produced,
                        reason: e.to_string(),
                    });
                    break;
                }
            };

            self.publish(application, jobs, &results);

            self.emit(ForecastEvent::RoundCompleted {
                application: application.clone(),
                slot,
                valid: results.valid_count(),
                invalid: results.invalid_count(),
                max_elapsed: results.max_elapsed(),
            });

            if first_round.is_none() {
                first_round = Some(results);
            }
        }

        first_round
    }

    fn publish(&self, application: &ApplicationName, jobs: &[MetricJob], results: &RoundResults) {
        for job in jobs {
            let Some(outcome) = results.outcomes.get(&job.metric) else {
                continue;
            };

            if !outcome.valid {
                warn!(metric = %job.metric, slot = results.slot, "Invalid forecast not published");
                continue;
            }

            let (interval, value) = sanitize(outcome.interval, outcome.value, &job.bounds);
            let message = ForecastMessage::new(
                value,
                interval,
                results.slot,
                self.ctx.clock.now().floor() as i64,
            );
            self.ctx.sink.deliver(application, &job.metric, message);
        }
    }

    fn emit(&self, event: ForecastEvent) {
        // No subscribers is fine.
        let _ = self.ctx.events.send(event);
    }
}

/// Active while the flag reads `true` and its sender is alive.
fn is_active(active: &watch::Receiver<bool>) -> bool {
    *active.borrow() && active.has_changed().is_ok()
}
