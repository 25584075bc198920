//! Per-application record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forecast_engine::{ApplicationPlan, ForecastTarget, RoundResults};
use forecast_types::{ApplicationName, MetricBounds, MetricName};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

/// Mutable state of an application, guarded by the record's lock.
#[derive(Debug, Clone)]
pub struct ApplicationState {
    /// Highest start-forecasting version seen.
    pub version: u64,

    /// Version of the bounds currently held, once any were defined.
    pub bounds_version: Option<u64>,

    /// Metrics being forecast, in arrival order, without duplicates.
    pub metrics: Vec<MetricName>,

    /// Bounds per metric. Kept when a metric leaves the set.
    pub bounds: HashMap<MetricName, MetricBounds>,

    pub epoch_start: Option<i64>,
    pub horizon: Option<u64>,

    /// Worst processing time seen, carried into the next loop.
    pub processing_estimate_secs: f64,

    /// First round of the most recent batch.
    pub last_first_round: Option<RoundResults>,
    pub last_round_at: Option<DateTime<Utc>>,
}

impl ApplicationState {
    fn new(initial_estimate_secs: f64) -> Self {
        Self {
            version: 0,
            bounds_version: None,
            metrics: Vec::new(),
            bounds: HashMap::new(),
            epoch_start: None,
            horizon: None,
            processing_estimate_secs: initial_estimate_secs,
            last_first_round: None,
            last_round_at: None,
        }
    }

    pub fn bounds_for(&self, metric: &MetricName) -> MetricBounds {
        self.bounds.get(metric).copied().unwrap_or_default()
    }
}

/// Record of one application, shared between the registry and its loop.
pub struct ApplicationRecord {
    name: ApplicationName,
    pub(crate) state: RwLock<ApplicationState>,
    pub(crate) active: watch::Sender<bool>,
    /// Handle of the running loop. Held while starting or stopping it.
    pub(crate) scheduler: Mutex<Option<JoinHandle<()>>>,
    loops_started: AtomicU64,
    created_at: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn new(name: ApplicationName, initial_estimate_secs: f64) -> Self {
        let (active, _) = watch::channel(false);
        Self {
            name,
            state: RwLock::new(ApplicationState::new(initial_estimate_secs)),
            active,
            scheduler: Mutex::new(None),
            loops_started: AtomicU64::new(0),
            created_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &ApplicationName {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Number of scheduler loops spawned over the record's lifetime.
    pub fn loops_started(&self) -> u64 {
        self.loops_started.load(Ordering::SeqCst)
    }

    pub(crate) fn note_loop_started(&self) -> u64 {
        self.loops_started.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> ApplicationState {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl ForecastTarget for ApplicationRecord {
    fn application(&self) -> &ApplicationName {
        &self.name
    }

    fn active(&self) -> watch::Receiver<bool> {
        self.active.subscribe()
    }

    async fn plan(&self) -> Option<ApplicationPlan> {
        let state = self.state.read().await;
        let (epoch_start, horizon) = (state.epoch_start?, state.horizon?);
        if state.metrics.is_empty() {
            return None;
        }

        Some(ApplicationPlan {
            application: self.name.clone(),
            metrics: state
                .metrics
                .iter()
                .map(|metric| (metric.clone(), state.bounds_for(metric)))
                .collect(),
            epoch_start,
            horizon,
            processing_estimate_secs: state.processing_estimate_secs,
        })
    }

    async fn record_feedback(&self, estimate_secs: f64, first_round: &RoundResults) {
        let mut state = self.state.write().await;
        state.processing_estimate_secs = estimate_secs;
        state.last_first_round = Some(first_round.clone());
        state.last_round_at = Some(Utc::now());
        debug!(
            application = %self.name,
            estimate_secs,
            slot = first_round.slot,
            "Round feedback recorded"
        );
    }
}
