//! Per-cycle refresh of configuration and observed data.

use std::path::PathBuf;

use async_trait::async_trait;
use forecast_types::{ApplicationName, MetricName};

use crate::error::{EngineError, EngineResult};

/// Settings that may change between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSettings {
    /// Number of consecutive slots to forecast in the coming batch.
    pub batch_depth: usize,
}

/// Refreshes what a batch needs before it runs.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Reload configuration and observed data for an application.
    ///
    /// An error aborts the coming batch.
    async fn refresh(&self, application: &ApplicationName) -> EngineResult<RoundSettings>;

    /// Data file handed to the invoker for a metric.
    fn data_file(&self, application: &ApplicationName, metric: &MetricName) -> PathBuf;
}

/// Data files laid out as `{data_dir}/{application}_{metric}.csv`.
pub struct DirectorySnapshot {
    data_dir: PathBuf,
    batch_depth: usize,
}

impl DirectorySnapshot {
    pub fn new(data_dir: impl Into<PathBuf>, batch_depth: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            batch_depth,
        }
    }
}

#[async_trait]
impl SnapshotProvider for DirectorySnapshot {
    async fn refresh(&self, application: &ApplicationName) -> EngineResult<RoundSettings> {
        match tokio::fs::metadata(&self.data_dir).await {
            Ok(meta) if meta.is_dir() => Ok(RoundSettings {
                batch_depth: self.batch_depth,
            }),
            Ok(_) => Err(EngineError::SnapshotUnavailable {
                application: application.clone(),
                reason: format!("{} is not a directory", self.data_dir.display()),
            }),
            Err(e) => Err(EngineError::SnapshotUnavailable {
                application: application.clone(),
                reason: format!("{}: {}", self.data_dir.display(), e),
            }),
        }
    }

    fn data_file(&self, application: &ApplicationName, metric: &MetricName) -> PathBuf {
        self.data_dir.join(format!("{application}_{metric}.csv"))
    }
}
