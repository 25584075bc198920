//! Forecast invocation for a single metric.
//!
//! [`ForecastInvoker`] is the seam between the scheduler and whatever
//! produces forecasts. [`ExternalForecaster`] runs the forecasting
//! executable and parses its token stream; [`forecast_metric`] wraps any
//! invoker so that failures surface as invalid outcomes instead of errors.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use forecast_types::{
    parse_finite, ApplicationName, ConfidenceInterval, ErrorMetrics, MetricBounds, MetricName,
    PredictionOutcome,
};
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ExecutableConfig;
use crate::error::{EngineError, EngineResult};

const PREDICTION_PREFIX: &str = "Prediction:";
const INTERVAL_PREFIX: &str = "Confidence_interval:";
const MAE_PREFIX: &str = "mae:";
const MSE_PREFIX: &str = "mse:";
const MAPE_PREFIX: &str = "mape:";
const SMAPE_PREFIX: &str = "smape:";

/// Everything needed to forecast one metric.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub application: ApplicationName,
    pub metric: MetricName,
    /// Historical data of the metric.
    pub data_file: PathBuf,
    pub bounds: MetricBounds,
    /// Slot to forecast, epoch seconds. `None` in test mode, where the
    /// executable targets the trailing timestamp of its data.
    pub target: Option<i64>,
}

/// Parsed output of a successful invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawForecast {
    pub value: f64,
    pub interval: ConfidenceInterval,
    pub errors: ErrorMetrics,
}

/// Produces a raw forecast for one metric.
#[async_trait]
pub trait ForecastInvoker: Send + Sync {
    /// Run the forecast.
    async fn invoke(&self, request: &InvocationRequest) -> EngineResult<RawForecast>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "forecaster"
    }
}

/// Forecast one metric, converting every failure into an invalid outcome.
#[instrument(skip(invoker, request), fields(application = %request.application, metric = %request.metric))]
pub async fn forecast_metric(
    invoker: &dyn ForecastInvoker,
    request: &InvocationRequest,
) -> PredictionOutcome {
    let start = Instant::now();
    let result = invoker.invoke(request).await;
    let elapsed = start.elapsed();

    match result {
        Ok(forecast) => {
            info!(
                value = forecast.value,
                interval = %forecast.interval,
                target = ?request.target,
                elapsed_ms = elapsed.as_millis() as u64,
                "Forecast produced"
            );
            PredictionOutcome::valid(forecast.value, forecast.interval, forecast.errors, elapsed)
        }
        Err(EngineError::Parse {
            reason,
            stdout,
            stderr,
            ..
        }) => {
            error!(
                invoker = invoker.name(),
                reason = %reason,
                stdout = %stdout,
                stderr = %stderr,
                "Forecasting executable produced no usable forecast"
            );
            PredictionOutcome::invalid(elapsed)
        }
        Err(e) => {
            error!(invoker = invoker.name(), error = %e, "Forecast invocation failed");
            PredictionOutcome::invalid(elapsed)
        }
    }
}

/// Runs the external forecasting executable.
///
/// The command line is `program leading_args... <data_file> <metric> [<target>]`.
pub struct ExternalForecaster {
    config: ExecutableConfig,
}

impl ExternalForecaster {
    pub fn new(config: ExecutableConfig) -> Self {
        Self { config }
    }

    fn command(&self, request: &InvocationRequest) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.leading_args)
            .arg(&request.data_file)
            .arg(request.metric.as_str());

        if let Some(target) = request.target {
            command.arg(target.to_string());
        }

        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command
    }
}

#[async_trait]
impl ForecastInvoker for ExternalForecaster {
    async fn invoke(&self, request: &InvocationRequest) -> EngineResult<RawForecast> {
        debug!(
            program = %self.config.program,
            data_file = %request.data_file.display(),
            metric = %request.metric,
            target = ?request.target,
            "Issuing forecast command"
        );

        let child = self.command(request).output();
        let output = match self.config.timeout() {
            Some(limit) => tokio::time::timeout(limit, child).await.map_err(|_| {
                EngineError::Timeout {
                    metric: request.metric.clone(),
                    timeout_secs: limit.as_secs(),
                }
            })?,
            None => child.await,
        }
        .map_err(|source| EngineError::Launch {
            metric: request.metric.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if stdout.trim().is_empty() {
            warn!(
                metric = %request.metric,
                status = %output.status,
                stderr = %stderr,
                "Empty output from forecasting executable"
            );
        }

        parse_forecast_output(&stdout).map_err(|reason| EngineError::Parse {
            metric: request.metric.clone(),
            reason,
            stdout,
            stderr,
        })
    }

    fn name(&self) -> &str {
        &self.config.program
    }
}

/// Parse the executable's token stream.
///
/// Tokens are whitespace separated and matched by prefix; later tokens win.
/// A forecast requires both a `Prediction:` and a `Confidence_interval:`
/// token. Error metrics are optional and default to zero.
pub fn parse_forecast_output(output: &str) -> Result<RawForecast, String> {
    let cleaned = output.replace("[1] ", "").replace('"', "");

    let mut value = None;
    let mut interval = None;
    let mut errors = ErrorMetrics::default();

    for token in cleaned.split_whitespace() {
        if let Some(raw) = token.strip_prefix(PREDICTION_PREFIX) {
            value = Some(raw);
        } else if let Some(raw) = token.strip_prefix(INTERVAL_PREFIX) {
            interval = Some(raw);
        } else if let Some(raw) = token.strip_prefix(MAE_PREFIX) {
            errors.mae = error_metric("mae", raw);
        } else if let Some(raw) = token.strip_prefix(MSE_PREFIX) {
            errors.mse = error_metric("mse", raw);
        } else if let Some(raw) = token.strip_prefix(MAPE_PREFIX) {
            errors.mape = error_metric("mape", raw);
        } else if let Some(raw) = token.strip_prefix(SMAPE_PREFIX) {
            errors.smape = error_metric("smape", raw);
        }
    }

    let (value, interval) = match (value, interval) {
        (Some(value), Some(interval)) => (value, interval),
        (None, None) => return Err("missing prediction and confidence interval".to_string()),
        (None, _) => return Err("missing prediction".to_string()),
        (_, None) => return Err("missing confidence interval".to_string()),
    };

    let value = parse_finite(value).map_err(|e| e.to_string())?;
    let interval = interval
        .parse::<ConfidenceInterval>()
        .map_err(|e| e.to_string())?;

    Ok(RawForecast {
        value,
        interval,
        errors,
    })
}

fn error_metric(name: &str, raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) => value,
        Err(_) => {
            debug!(metric = name, raw, "Unparseable error metric, using 0");
            0.0
        }
    }
}
