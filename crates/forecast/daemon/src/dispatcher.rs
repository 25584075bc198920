//! Control-plane dispatcher.
//!
//! Routes each inbound bus message to exactly one registry operation by its
//! address. Bodies are checked for shape before anything is mutated; a
//! malformed message is logged and rejected.

use std::path::PathBuf;
use std::sync::Arc;

use forecast_registry::{ApplicationRegistry, BoundsUpdate, StartOutcome, StopOutcome};
use forecast_types::topics::{
    COMPONENT_STATE_PREFIX, FORECASTING_CONTROL_PREFIX, MONITORING_DATA_PREFIX,
};
use forecast_types::{
    MetricListMessage, StartForecastingMessage, StopForecastingMessage, TopicLayout,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::DispatchError;
use crate::properties::PropertiesStore;

/// File written when a component-state message arrives.
pub const LIVENESS_MARKER: &str = "is_alive.txt";

/// What an inbound address maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    MetricList,
    StartForecasting,
    StopForecasting,
    TestMode,
    ComponentState,
    MonitoringData,
    Unhandled,
}

/// Result of dispatching one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Bounds { update: BoundsUpdate },
    Start { outcome: StartOutcome },
    Stop { outcome: StopOutcome },
    TestModeEnabled,
    StateRecorded { marker: PathBuf },
    Ignored,
}

pub struct Dispatcher {
    topics: TopicLayout,
    registry: Arc<ApplicationRegistry>,
    properties: Arc<PropertiesStore>,
    liveness_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(
        topics: TopicLayout,
        registry: Arc<ApplicationRegistry>,
        properties: Arc<PropertiesStore>,
        liveness_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            topics,
            registry,
            properties,
            liveness_dir: liveness_dir.into(),
        }
    }

    pub fn registry(&self) -> &Arc<ApplicationRegistry> {
        &self.registry
    }

    pub fn route(&self, address: &str) -> Route {
        let relative = self.topics.relative(address);

        if let Some(rest) = relative.strip_prefix(MONITORING_DATA_PREFIX) {
            return if rest == "metric_list" {
                Route::MetricList
            } else {
                Route::MonitoringData
            };
        }

        if let Some(rest) = relative.strip_prefix(FORECASTING_CONTROL_PREFIX) {
            let method = self.topics.method.as_str();
            return match rest.split_once('.') {
                Some(("test", m)) if m == method => Route::TestMode,
                Some(("start_forecasting", m)) if m == method => Route::StartForecasting,
                Some(("stop_forecasting", m)) if m == method => Route::StopForecasting,
                _ => Route::Unhandled,
            };
        }

        if relative.starts_with(COMPONENT_STATE_PREFIX) {
            return Route::ComponentState;
        }

        Route::Unhandled
    }

    /// Handle one inbound message.
    #[instrument(skip(self, body))]
    pub async fn dispatch(
        &self,
        address: &str,
        body: serde_json::Value,
    ) -> Result<DispatchOutcome, DispatchError> {
        let route = self.route(address);
        debug!(route = ?route, "Inbound message routed");

        match route {
            Route::MetricList => {
                let message: MetricListMessage = parse(address, body)?;
                let update = self.registry.define_metric_bounds(message).await?;
                Ok(DispatchOutcome::Bounds { update })
            }
            Route::StartForecasting => {
                let message: StartForecastingMessage = parse(address, body)?;
                let horizon = message.horizon_secs();
                let outcome = self.registry.start_forecasting(message).await?;

                if outcome != StartOutcome::Duplicate {
                    if let Some(horizon) = horizon {
                        if let Err(e) = self.properties.lower_aggregation_window(horizon).await {
                            warn!(error = %e, "Could not update aggregation window");
                        }
                    }
                }
                Ok(DispatchOutcome::Start { outcome })
            }
            Route::StopForecasting => {
                let message: StopForecastingMessage = parse(address, body)?;
                let outcome = self.registry.stop_forecasting(message).await?;
                Ok(DispatchOutcome::Stop { outcome })
            }
            Route::TestMode => {
                info!("Test mode enabled, forecasts will target the end of their data");
                self.registry.set_test_mode(true);
                Ok(DispatchOutcome::TestModeEnabled)
            }
            Route::ComponentState => {
                tokio::fs::create_dir_all(&self.liveness_dir).await?;
                let marker = self.liveness_dir.join(LIVENESS_MARKER);
                tokio::fs::write(&marker, address).await?;
                debug!(marker = %marker.display(), "Component state recorded");
                Ok(DispatchOutcome::StateRecorded { marker })
            }
            Route::MonitoringData => {
                debug!("Monitoring data ignored");
                Ok(DispatchOutcome::Ignored)
            }
            Route::Unhandled => {
                info!("No handler for address");
                Ok(DispatchOutcome::Ignored)
            }
        }
    }
}

fn parse<T: DeserializeOwned>(address: &str, body: serde_json::Value) -> Result<T, DispatchError> {
    serde_json::from_value(body).map_err(|e| {
        warn!(address, error = %e, "Rejecting malformed message");
        DispatchError::Malformed {
            address: address.to_string(),
            reason: e.to_string(),
        }
    })
}
