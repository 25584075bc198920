//! Application registry and control operations.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use forecast_engine::{ForecastEvent, ForecastScheduler, ForecastTarget, SchedulerContext};
use forecast_types::{
    ApplicationName, MetricBounds, MetricListMessage, MetricName, StartForecastingMessage,
    StopForecastingMessage,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::record::ApplicationRecord;

/// Effect of a bounds definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundsUpdate {
    /// First definition for the application.
    Created,
    /// Same version as the current one; definitions merged in.
    Merged,
    /// Different version; the definition replaced the current bounds.
    Replaced,
}

/// Effect of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    /// Already active with this metric set at an equal or newer version.
    Duplicate,
    /// Record updated; the running loop picks the change up.
    Updated,
    /// Record updated and a scheduler loop spawned.
    Started,
}

/// Effect of a stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Some metrics remain; forecasting continues for them.
    MetricsRemoved { remaining: Vec<MetricName> },
    /// Forecasting stopped and the loop has exited.
    Deactivated,
}

/// Bounds of one metric in a status report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStatus {
    pub name: MetricName,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
}

/// Summary of the first round of the latest batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundSummary {
    pub slot: i64,
    pub valid: usize,
    pub invalid: usize,
    pub max_elapsed_ms: u64,
}

/// Point-in-time view of an application.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationStatus {
    pub name: ApplicationName,
    pub active: bool,
    pub version: u64,
    pub bounds_version: Option<u64>,
    pub metrics: Vec<MetricStatus>,
    pub epoch_start: Option<i64>,
    pub horizon: Option<u64>,
    pub processing_estimate_secs: f64,
    pub loops_started: u64,
    pub last_round: Option<RoundSummary>,
    pub last_round_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// All application records, keyed by name.
pub struct ApplicationRegistry {
    records: DashMap<ApplicationName, Arc<ApplicationRecord>>,
    context: SchedulerContext,
    initial_estimate_secs: f64,
}

impl ApplicationRegistry {
    /// `initial_estimate_secs` seeds the processing-time estimate of new records.
    pub fn new(context: SchedulerContext, initial_estimate_secs: f64) -> Self {
        Self {
            records: DashMap::new(),
            context,
            initial_estimate_secs,
        }
    }

    /// Subscribe to scheduler events.
    pub fn subscribe(&self) -> broadcast::Receiver<ForecastEvent> {
        self.context.events.subscribe()
    }

    /// Make invocations omit the target slot from now on.
    pub fn set_test_mode(&self, enabled: bool) {
        self.context.test_mode.store(enabled, Ordering::Relaxed);
    }

    pub fn test_mode(&self) -> bool {
        self.context.test_mode.load(Ordering::Relaxed)
    }

    pub fn get(&self, name: &ApplicationName) -> Option<Arc<ApplicationRecord>> {
        self.records.get(name).map(|record| record.value().clone())
    }

    fn get_or_create(&self, name: &ApplicationName) -> Arc<ApplicationRecord> {
        self.records
            .entry(name.clone())
            .or_insert_with(|| {
                info!(application = %name, "Creating application record");
                Arc::new(ApplicationRecord::new(name.clone(), self.initial_estimate_secs))
            })
            .clone()
    }

    /// Apply a metric bounds definition.
    #[instrument(skip(self, message), fields(application = %message.name, version = message.version))]
    pub async fn define_metric_bounds(
        &self,
        message: MetricListMessage,
    ) -> RegistryResult<BoundsUpdate> {
        validate_name(&message.name)?;

        let incoming: HashMap<MetricName, MetricBounds> = message
            .metric_list
            .iter()
            .map(|definition| {
                let bounds = MetricBounds::new(definition.lower_bound, definition.upper_bound);
                if bounds.is_inverted() {
                    warn!(
                        metric = %definition.name,
                        lower = ?bounds.lower,
                        upper = ?bounds.upper,
                        "Lower bound exceeds upper bound"
                    );
                }
                (definition.name.clone(), bounds)
            })
            .collect();

        let record = self.get_or_create(&message.name);
        let mut state = record.state.write().await;

        let update = match state.bounds_version {
            None => {
                state.bounds.extend(incoming);
                BoundsUpdate::Created
            }
            Some(current) if current == message.version => {
                state.bounds.extend(incoming);
                BoundsUpdate::Merged
            }
            Some(current) => {
                if message.version < current {
                    warn!(current, "Older metric list adopted as current");
                }
                state.bounds = incoming;
                BoundsUpdate::Replaced
            }
        };
        state.bounds_version = Some(message.version);

        info!(
            metrics = message.metric_list.len(),
            update = ?update,
            "Metric bounds defined"
        );
        Ok(update)
    }

    /// Start, or update, forecasting for an application.
    #[instrument(skip(self, message), fields(application = %message.name))]
    pub async fn start_forecasting(
        &self,
        message: StartForecastingMessage,
    ) -> RegistryResult<StartOutcome> {
        validate_name(&message.name)?;
        let horizon = message
            .horizon_secs()
            .ok_or(RegistryError::InvalidHorizon(message.prediction_horizon))?;
        let metrics = dedup_metrics(message.metrics.iter().cloned());
        if metrics.is_empty() {
            return Err(RegistryError::InvalidRequest(
                "start request names no metrics".to_string(),
            ));
        }
        let version = message.version_or_default();
        let epoch_start = message.epoch_start_secs().ok_or_else(|| {
            RegistryError::InvalidRequest(format!(
                "epoch start {} is not a usable timestamp",
                message.epoch_start
            ))
        })?;

        let record = self.get_or_create(&message.name);
        let mut scheduler = record.scheduler.lock().await;
        let alive = scheduler.as_ref().is_some_and(|handle| !handle.is_finished());

        {
            let mut state = record.state.write().await;

            let same_set = state.metrics.iter().collect::<BTreeSet<_>>()
                == metrics.iter().collect::<BTreeSet<_>>();
            if alive && record.is_active() && same_set && version <= state.version {
                debug!(version, current = state.version, "Duplicate start request ignored");
                return Ok(StartOutcome::Duplicate);
            }

            for metric in &metrics {
                state.bounds.entry(metric.clone()).or_default();
            }
            state.metrics = metrics;
            state.epoch_start = Some(epoch_start);
            state.horizon = Some(horizon);
            state.version = state.version.max(version);
        }

        if record.active.send_replace(true) && !alive {
            warn!("Scheduler loop of an active application had exited, restarting it");
        }

        if alive {
            info!(version, epoch_start, horizon, "Forecasting updated");
            return Ok(StartOutcome::Updated);
        }

        let target: Arc<dyn ForecastTarget> = record.clone();
        *scheduler = Some(ForecastScheduler::new(target, self.context.clone()).spawn());
        let loops = record.note_loop_started();
        info!(version, epoch_start, horizon, loops, "Forecasting started");
        Ok(StartOutcome::Started)
    }

    /// Stop forecasting some metrics, or all of them when none are named.
    #[instrument(skip(self, message), fields(application = %message.name))]
    pub async fn stop_forecasting(
        &self,
        message: StopForecastingMessage,
    ) -> RegistryResult<StopOutcome> {
        let record = self
            .get(&message.name)
            .ok_or_else(|| RegistryError::UnknownApplication(message.name.clone()))?;

        let mut scheduler = record.scheduler.lock().await;

        let remaining = {
            let mut state = record.state.write().await;
            if !message.metrics.is_empty() {
                state.metrics.retain(|metric| !message.metrics.contains(metric));
            }
            state.metrics.clone()
        };

        if !message.metrics.is_empty() && !remaining.is_empty() {
            info!(
                removed = message.metrics.len(),
                remaining = remaining.len(),
                "Metrics removed from forecasting"
            );
            return Ok(StopOutcome::MetricsRemoved { remaining });
        }

        halt_loop(&record, &mut scheduler).await;
        Ok(StopOutcome::Deactivated)
    }

    /// Stop every active application. Returns how many were stopped.
    pub async fn shutdown(&self) -> usize {
        let records: Vec<_> = self
            .records
            .iter()
            .map(|record| record.value().clone())
            .collect();

        let mut stopped = 0;
        for record in records {
            if record.is_active() {
                let mut scheduler = record.scheduler.lock().await;
                halt_loop(&record, &mut scheduler).await;
                stopped += 1;
            }
        }
        stopped
    }

    pub async fn status(&self, name: &ApplicationName) -> Option<ApplicationStatus> {
        let record = self.get(name)?;
        Some(status_of(&record).await)
    }

    /// Status of every application, ordered by name.
    pub async fn list(&self) -> Vec<ApplicationStatus> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .map(|record| record.value().clone())
            .collect();
        records.sort_by(|a, b| a.name().cmp(b.name()));

        let mut statuses = Vec::with_capacity(records.len());
        for record in records {
            statuses.push(status_of(&record).await);
        }
        statuses
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Clear the active flag and wait for the loop to exit.
///
/// Callers hold the record's scheduler lock.
async fn halt_loop(record: &ApplicationRecord, scheduler: &mut Option<JoinHandle<()>>) {
    record.active.send_replace(false);

    if let Some(handle) = scheduler.take() {
        if let Err(e) = handle.await {
            warn!(application = %record.name(), error = %e, "Scheduler loop ended abnormally");
        }
    }
    info!(application = %record.name(), "Forecasting stopped");
}

async fn status_of(record: &ApplicationRecord) -> ApplicationStatus {
    let state = record.snapshot().await;

    ApplicationStatus {
        name: record.name().clone(),
        active: record.is_active(),
        version: state.version,
        bounds_version: state.bounds_version,
        metrics: state
            .metrics
            .iter()
            .map(|metric| {
                let bounds = state.bounds_for(metric);
                MetricStatus {
                    name: metric.clone(),
                    lower_bound: bounds.lower,
                    upper_bound: bounds.upper,
                }
            })
            .collect(),
        epoch_start: state.epoch_start,
        horizon: state.horizon,
        processing_estimate_secs: state.processing_estimate_secs,
        loops_started: record.loops_started(),
        last_round: state.last_first_round.as_ref().map(|round| RoundSummary {
            slot: round.slot,
            valid: round.valid_count(),
            invalid: round.invalid_count(),
            max_elapsed_ms: duration_ms(round.max_elapsed()),
        }),
        last_round_at: state.last_round_at,
        created_at: record.created_at(),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn validate_name(name: &ApplicationName) -> RegistryResult<()> {
    if name.as_str().trim().is_empty() {
        return Err(RegistryError::InvalidRequest(
            "application name is empty".to_string(),
        ));
    }
    Ok(())
}

/// Keep the first occurrence of each metric.
fn dedup_metrics(metrics: impl Iterator<Item = MetricName>) -> Vec<MetricName> {
    let mut seen = BTreeSet::new();
    metrics.filter(|metric| seen.insert(metric.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use forecast_engine::{
        AnchoredClock, DirectorySnapshot, EngineResult, ForecastInvoker, InvocationRequest,
        PredictionSink, RawForecast, RoundExecutor,
    };
    use forecast_types::{ConfidenceInterval, ErrorMetrics, ForecastMessage, MetricBoundDefinition};
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    struct ConstantInvoker;

    #[async_trait]
    impl ForecastInvoker for ConstantInvoker {
        async fn invoke(&self, _request: &InvocationRequest) -> EngineResult<RawForecast> {
            Ok(RawForecast {
                value: 150.0,
                interval: ConfidenceInterval::new(90.0, 180.0),
                errors: ErrorMetrics::default(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<(ApplicationName, MetricName, ForecastMessage)>>,
    }

    impl PredictionSink for RecordingSink {
        fn deliver(&self, application: &ApplicationName, metric: &MetricName, forecast: ForecastMessage) {
            self.delivered
                .lock()
                .unwrap()
                .push((application.clone(), metric.clone(), forecast));
        }
    }

    struct Harness {
        registry: ApplicationRegistry,
        sink: Arc<RecordingSink>,
        _data: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let data = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let (events, _) = broadcast::channel(64);
        let context = SchedulerContext {
            executor: Arc::new(RoundExecutor::new(Arc::new(ConstantInvoker))),
            snapshots: Arc::new(DirectorySnapshot::new(data.path(), 1)),
            sink: sink.clone(),
            clock: Arc::new(AnchoredClock::starting_at(1025.0)),
            events,
            test_mode: Arc::new(AtomicBool::new(false)),
        };
        Harness {
            registry: ApplicationRegistry::new(context, 10.0),
            sink,
            _data: data,
        }
    }

    fn start(version: Option<u64>, metrics: &[&str]) -> StartForecastingMessage {
        StartForecastingMessage {
            name: ApplicationName::new("shop"),
            version,
            metrics: metrics.iter().map(|m| MetricName::new(*m)).collect(),
            epoch_start: 1000.0,
            prediction_horizon: 60.0,
        }
    }

    fn stop(metrics: &[&str]) -> StopForecastingMessage {
        StopForecastingMessage {
            name: ApplicationName::new("shop"),
            metrics: metrics.iter().map(|m| MetricName::new(*m)).collect(),
        }
    }

    fn metric_list(version: u64, definitions: &[(&str, Option<f64>, Option<f64>)]) -> MetricListMessage {
        MetricListMessage {
            name: ApplicationName::new("shop"),
            version,
            metric_list: definitions
                .iter()
                .map(|(name, lower, upper)| MetricBoundDefinition {
                    name: MetricName::new(*name),
                    lower_bound: *lower,
                    upper_bound: *upper,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_bounds_versions() {
        let h = harness();
        let shop = ApplicationName::new("shop");

        let update = h
            .registry
            .define_metric_bounds(metric_list(1, &[("cpu", Some(0.0), Some(100.0))]))
            .await
            .unwrap();
        assert_eq!(update, BoundsUpdate::Created);

        let update = h
            .registry
            .define_metric_bounds(metric_list(1, &[("ram", Some(0.0), None)]))
            .await
            .unwrap();
        assert_eq!(update, BoundsUpdate::Merged);
        let state = h.registry.get(&shop).unwrap().snapshot().await;
        assert_eq!(state.bounds.len(), 2);

        let update = h
            .registry
            .define_metric_bounds(metric_list(2, &[("disk", None, Some(1.0))]))
            .await
            .unwrap();
        assert_eq!(update, BoundsUpdate::Replaced);
        let state = h.registry.get(&shop).unwrap().snapshot().await;
        assert_eq!(state.bounds.len(), 1);
        assert_eq!(state.bounds_version, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_start_does_not_spawn_second_loop() {
        let h = harness();
        let shop = ApplicationName::new("shop");

        let first = h.registry.start_forecasting(start(Some(3), &["cpu", "ram"])).await.unwrap();
        assert_eq!(first, StartOutcome::Started);

        let same = h.registry.start_forecasting(start(Some(3), &["ram", "cpu"])).await.unwrap();
        assert_eq!(same, StartOutcome::Duplicate);

        let older = h.registry.start_forecasting(start(Some(2), &["cpu", "ram"])).await.unwrap();
        assert_eq!(older, StartOutcome::Duplicate);

        let newer = h.registry.start_forecasting(start(Some(4), &["cpu", "ram"])).await.unwrap();
        assert_eq!(newer, StartOutcome::Updated);

        let record = h.registry.get(&shop).unwrap();
        assert_eq!(record.loops_started(), 1);
        assert_eq!(record.snapshot().await.version, 4);

        h.registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_reaches_running_loop() {
        let h = harness();
        let shop = ApplicationName::new("shop");

        let first = h.registry.start_forecasting(start(Some(1), &["cpu"])).await.unwrap();
        assert_eq!(first, StartOutcome::Started);

        let widened = h
            .registry
            .start_forecasting(start(Some(2), &["cpu", "ram"]))
            .await
            .unwrap();
        assert_eq!(widened, StartOutcome::Updated);

        // Clock starts at 1025; the loop wakes at 1060 for slot 1120.
        tokio::time::sleep(Duration::from_secs(40)).await;

        {
            let delivered = h.sink.delivered.lock().unwrap();
            let mut slots: Vec<_> = delivered
                .iter()
                .map(|(_, metric, message)| (metric.as_str().to_string(), message.prediction_time))
                .collect();
            slots.sort();
            assert_eq!(
                slots,
                vec![("cpu".to_string(), 1120), ("ram".to_string(), 1120)]
            );
        }
        assert_eq!(h.registry.get(&shop).unwrap().loops_started(), 1);

        h.registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_exited_loop_is_restarted() {
        let h = harness();
        let shop = ApplicationName::new("shop");
        h.registry.start_forecasting(start(Some(1), &["cpu"])).await.unwrap();

        let record = h.registry.get(&shop).unwrap();
        {
            let scheduler = record.scheduler.lock().await;
            let handle = scheduler.as_ref().unwrap();
            handle.abort();
            while !handle.is_finished() {
                tokio::task::yield_now().await;
            }
        }
        assert!(record.is_active());

        let outcome = h.registry.start_forecasting(start(Some(1), &["cpu"])).await.unwrap();
        assert_eq!(outcome, StartOutcome::Started);
        assert_eq!(record.loops_started(), 2);

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(h.sink.delivered.lock().unwrap().len(), 1);

        h.registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_keeps_existing_bounds() {
        let h = harness();
        h.registry
            .define_metric_bounds(metric_list(1, &[("cpu", Some(0.0), Some(100.0))]))
            .await
            .unwrap();

        h.registry.start_forecasting(start(None, &["cpu", "ram", "cpu"])).await.unwrap();

        let status = h.registry.status(&ApplicationName::new("shop")).await.unwrap();
        assert!(status.active);
        assert_eq!(status.version, 1);
        assert_eq!(status.horizon, Some(60));
        assert_eq!(status.metrics.len(), 2);
        assert_eq!(status.metrics[0].upper_bound, Some(100.0));
        assert_eq!(status.metrics[1].lower_bound, None);
        assert_eq!(status.metrics[1].upper_bound, None);

        h.registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lifecycle() {
        let h = harness();
        let shop = ApplicationName::new("shop");
        h.registry.start_forecasting(start(Some(1), &["cpu", "ram"])).await.unwrap();

        let outcome = h.registry.stop_forecasting(stop(&["ram"])).await.unwrap();
        assert_eq!(
            outcome,
            StopOutcome::MetricsRemoved {
                remaining: vec![MetricName::new("cpu")]
            }
        );
        assert!(h.registry.get(&shop).unwrap().is_active());

        let outcome = h.registry.stop_forecasting(stop(&["cpu"])).await.unwrap();
        assert_eq!(outcome, StopOutcome::Deactivated);
        let record = h.registry.get(&shop).unwrap();
        assert!(!record.is_active());
        assert!(record.scheduler.lock().await.is_none());

        // Restarting after a stop spawns a fresh loop even at the same version.
        let outcome = h.registry.start_forecasting(start(Some(1), &["cpu"])).await.unwrap();
        assert_eq!(outcome, StartOutcome::Started);
        assert_eq!(record.loops_started(), 2);

        let outcome = h.registry.stop_forecasting(stop(&[])).await.unwrap();
        assert_eq!(outcome, StopOutcome::Deactivated);
        assert_eq!(record.snapshot().await.metrics, vec![MetricName::new("cpu")]);
    }

    #[tokio::test]
    async fn test_rejected_requests() {
        let h = harness();

        let unknown = h.registry.stop_forecasting(stop(&[])).await;
        assert!(matches!(unknown, Err(RegistryError::UnknownApplication(_))));

        let mut zero_horizon = start(Some(1), &["cpu"]);
        zero_horizon.prediction_horizon = 0.0;
        assert!(matches!(
            h.registry.start_forecasting(zero_horizon).await,
            Err(RegistryError::InvalidHorizon(_))
        ));

        assert!(matches!(
            h.registry.start_forecasting(start(Some(1), &[])).await,
            Err(RegistryError::InvalidRequest(_))
        ));

        let mut far_epoch = start(Some(1), &["cpu"]);
        far_epoch.epoch_start = -1e300;
        far_epoch.prediction_horizon = 7.0;
        assert!(matches!(
            h.registry.start_forecasting(far_epoch).await,
            Err(RegistryError::InvalidRequest(_))
        ));
        assert!(h.registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_application_publishes_bounded_forecasts() {
        let h = harness();
        let shop = ApplicationName::new("shop");
        h.registry
            .define_metric_bounds(metric_list(1, &[("cpu", Some(0.0), Some(100.0))]))
            .await
            .unwrap();
        h.registry.start_forecasting(start(Some(1), &["cpu"])).await.unwrap();

        // Clock starts at 1025; the loop wakes at 1060 for slot 1120.
        tokio::time::sleep(Duration::from_secs(40)).await;

        {
            let delivered = h.sink.delivered.lock().unwrap();
            assert_eq!(delivered.len(), 1);
            let (app, metric, message) = &delivered[0];
            assert_eq!(app, &shop);
            assert_eq!(metric.as_str(), "cpu");
            assert_eq!(message.prediction_time, 1120);
            assert_eq!(message.metric_value, 100.0);
            assert_eq!(message.confidence_interval, [90.0, 100.0]);
        }

        let status = h.registry.status(&shop).await.unwrap();
        let round = status.last_round.unwrap();
        assert_eq!(round.slot, 1120);
        assert_eq!(round.valid, 1);

        assert_eq!(h.registry.shutdown().await, 1);
        assert!(!h.registry.get(&shop).unwrap().is_active());
    }
}
