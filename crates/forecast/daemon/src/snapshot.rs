//! Per-cycle refresh backed by the properties file and the data directory.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use forecast_engine::{
    DirectorySnapshot, EngineError, EngineResult, RoundSettings, SnapshotProvider,
};
use forecast_types::{ApplicationName, MetricName};

use crate::properties::PropertiesStore;

/// Reloads the properties file before checking the data directory.
///
/// The batch depth comes from the properties file, falling back to the
/// configured default.
pub struct PropertiesSnapshot {
    properties: Arc<PropertiesStore>,
    data: DirectorySnapshot,
}

impl PropertiesSnapshot {
    pub fn new(properties: Arc<PropertiesStore>, data: DirectorySnapshot) -> Self {
        Self { properties, data }
    }
}

#[async_trait]
impl SnapshotProvider for PropertiesSnapshot {
    async fn refresh(&self, application: &ApplicationName) -> EngineResult<RoundSettings> {
        self.properties
            .reload()
            .await
            .map_err(|e| EngineError::SnapshotUnavailable {
                application: application.clone(),
                reason: e.to_string(),
            })?;

        let defaults = self.data.refresh(application).await?;
        let batch_depth = self
            .properties
            .batch_depth()
            .await
            .unwrap_or(defaults.batch_depth);

        Ok(RoundSettings { batch_depth })
    }

    fn data_file(&self, application: &ApplicationName, metric: &MetricName) -> PathBuf {
        self.data.data_file(application, metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::FORWARD_PREDICTIONS_KEY;

    #[tokio::test]
    async fn test_batch_depth_follows_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prediction.properties");
        let properties = Arc::new(PropertiesStore::open(&path).await.unwrap());
        let snapshot = PropertiesSnapshot::new(
            properties.clone(),
            DirectorySnapshot::new(dir.path(), 8),
        );
        let app = ApplicationName::new("shop");

        assert_eq!(snapshot.refresh(&app).await.unwrap().batch_depth, 8);

        tokio::fs::write(&path, format!("{FORWARD_PREDICTIONS_KEY}=3\n"))
            .await
            .unwrap();
        assert_eq!(snapshot.refresh(&app).await.unwrap().batch_depth, 3);
    }

    #[tokio::test]
    async fn test_missing_data_dir_fails_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let properties = Arc::new(
            PropertiesStore::open(dir.path().join("prediction.properties"))
                .await
                .unwrap(),
        );
        let snapshot = PropertiesSnapshot::new(
            properties,
            DirectorySnapshot::new(dir.path().join("missing"), 8),
        );

        let result = snapshot.refresh(&ApplicationName::new("shop")).await;
        assert!(matches!(result, Err(EngineError::SnapshotUnavailable { .. })));
    }
}
