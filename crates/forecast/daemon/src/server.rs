//! Server setup and lifecycle management

use crate::api::{create_router, AppState};
use crate::config::DaemonConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{DaemonError, DaemonResult};
use crate::properties::PropertiesStore;
use crate::snapshot::PropertiesSnapshot;
use forecast_engine::{
    DirectorySnapshot, ExternalForecaster, ForecastEvent, RoundExecutor, SchedulerContext,
    SystemClock,
};
use forecast_publish::{HttpBus, InMemoryBus, LivenessPublisher, MessageBus, PredictionPublisher};
use forecast_registry::ApplicationRegistry;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Forecast daemon server
pub struct Server {
    config: DaemonConfig,
    bus: Arc<dyn MessageBus>,
    registry: Arc<ApplicationRegistry>,
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let forecasting = &config.forecasting;
        let topics = forecasting.topics();

        let properties = Arc::new(PropertiesStore::open(&forecasting.properties_path).await?);

        // Bus
        let bus: Arc<dyn MessageBus> = match &config.broker.url {
            Some(url) => Arc::new(HttpBus::new(
                url.clone(),
                Duration::from_secs(config.broker.request_timeout_secs),
            )?),
            None => {
                tracing::warn!("No broker configured, forecasts stay in process");
                Arc::new(InMemoryBus::new())
            }
        };

        let publisher = PredictionPublisher::new(
            bus.clone(),
            topics.clone(),
            config.publication.retry.clone(),
        );

        // Scheduling
        let engine = &forecasting.engine;
        let (events, _) = broadcast::channel(1024);
        let context = SchedulerContext {
            executor: Arc::new(RoundExecutor::new(Arc::new(ExternalForecaster::new(
                engine.executable.clone(),
            )))),
            snapshots: Arc::new(PropertiesSnapshot::new(
                properties.clone(),
                DirectorySnapshot::new(forecasting.data_dir.clone(), engine.batch_depth),
            )),
            sink: Arc::new(publisher),
            clock: Arc::new(SystemClock),
            events,
            test_mode: Arc::new(AtomicBool::new(false)),
        };

        let safety_margin = properties
            .safety_margin_secs()
            .await
            .unwrap_or(engine.safety_margin_secs);
        let registry = Arc::new(ApplicationRegistry::new(context, safety_margin));

        let dispatcher = Arc::new(Dispatcher::new(
            topics,
            registry.clone(),
            properties,
            forecasting.liveness_dir.clone(),
        ));

        Ok(Self {
            config,
            bus,
            registry,
            dispatcher,
        })
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let topics = self.config.forecasting.topics();

        let app = create_router(
            AppState::new(self.dispatcher.clone()),
            self.config.server.enable_cors,
        );
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Forecast daemon listening on {}", addr);
        tracing::info!(
            method = %topics.method,
            bus = self.bus.name(),
            "Forecasting for method {}",
            topics.method
        );

        let liveness = LivenessPublisher::new(
            self.bus.clone(),
            topics.liveness(),
            Duration::from_secs(self.config.forecasting.liveness_interval_secs.max(1)),
        )
        .spawn();
        let event_log = log_events(self.registry.subscribe());

        // Run server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Forecast daemon shutting down");

        liveness.abort();
        let stopped = self.registry.shutdown().await;
        event_log.abort();
        tracing::info!(stopped, "All forecasting stopped");

        Ok(())
    }
}

/// Log scheduler events that are not already logged where they happen.
fn log_events(mut events: broadcast::Receiver<ForecastEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ForecastEvent::RoundCompleted {
                    application,
                    slot,
                    valid,
                    invalid,
                    max_elapsed,
                }) => {
                    tracing::info!(
                        application = %application,
                        slot,
                        valid,
                        invalid,
                        max_elapsed_ms = max_elapsed.as_millis() as u64,
                        "Prediction round completed"
                    );
                }
                Ok(event) => tracing::trace!(?event, "Scheduler event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Scheduler event log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
