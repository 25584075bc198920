//! At-least-once publication of forecasts.
//!
//! Every forecast is published from its own task, so a stalled bus never
//! holds up the scheduler. Failed attempts are retried with backoff until
//! the bus accepts the message or the retry policy runs out.

use std::sync::Arc;

use forecast_engine::PredictionSink;
use forecast_types::{ApplicationName, ForecastMessage, MetricName, TopicLayout};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{Envelope, MessageBus};
use crate::error::{PublishError, PublishResult};
use crate::retry::RetryPolicy;

/// Publishes forecasts to their per-metric destination.
#[derive(Clone)]
pub struct PredictionPublisher {
    bus: Arc<dyn MessageBus>,
    layout: TopicLayout,
    policy: RetryPolicy,
}

impl PredictionPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, layout: TopicLayout, policy: RetryPolicy) -> Self {
        Self { bus, layout, policy }
    }

    /// Start delivering one forecast in the background.
    ///
    /// The handle resolves to the number of attempts it took.
    pub fn publish(
        &self,
        application: &ApplicationName,
        metric: &MetricName,
        forecast: &ForecastMessage,
    ) -> JoinHandle<PublishResult<u32>> {
        let address = self.layout.prediction_destination(metric);
        let envelope = serde_json::to_value(forecast)
            .map(|body| Envelope::new(address, body).for_application(application.clone()));

        let bus = self.bus.clone();
        let policy = self.policy.clone();
        let metric = metric.clone();

        tokio::spawn(async move {
            match envelope {
                Ok(envelope) => deliver_with_retry(bus.as_ref(), envelope, &policy, &metric).await,
                Err(e) => {
                    error!(metric = %metric, error = %e, "Forecast could not be encoded");
                    Err(e.into())
                }
            }
        })
    }
}

impl PredictionSink for PredictionPublisher {
    fn deliver(&self, application: &ApplicationName, metric: &MetricName, forecast: ForecastMessage) {
        // Detached; failures are logged by the task.
        let _ = self.publish(application, metric, &forecast);
    }
}

async fn deliver_with_retry(
    bus: &dyn MessageBus,
    envelope: Envelope,
    policy: &RetryPolicy,
    metric: &MetricName,
) -> PublishResult<u32> {
    let mut attempt: u32 = 1;

    loop {
        match bus.publish(&envelope).await {
            Ok(()) => {
                info!(
                    address = %envelope.address,
                    metric = %metric,
                    attempts = attempt,
                    body = %envelope.body,
                    "Forecast published"
                );
                return Ok(attempt);
            }
            Err(e) => {
                if !policy.allows_retry(attempt) {
                    error!(
                        address = %envelope.address,
                        metric = %metric,
                        attempts = attempt,
                        error = %e,
                        "Giving up on forecast"
                    );
                    return Err(PublishError::Exhausted {
                        address: envelope.address.clone(),
                        attempts: attempt,
                    });
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    address = %envelope.address,
                    metric = %metric,
                    attempt,
                    bus = bus.name(),
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Publishing forecast failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
                debug!(attempt, "Retrying forecast publication");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBus;
    use forecast_types::ConfidenceInterval;
    use std::time::Duration;

    fn forecast() -> ForecastMessage {
        ForecastMessage::new(0.0, ConfidenceInterval::new(0.0, 0.0), 1120, 1060)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_accepted() {
        let bus = Arc::new(InMemoryBus::new().failing_first(3));
        let publisher = PredictionPublisher::new(bus.clone(), TopicLayout::default(), RetryPolicy::default());

        let attempts = publisher
            .publish(&ApplicationName::new("shop"), &MetricName::new("cpu"), &forecast())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(attempts, 4);
        let published = bus
            .published_to("eu.nebulouscloud.preliminary_predicted.exponentialsmoothing.cpu")
            .await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].application, Some(ApplicationName::new("shop")));
        assert_eq!(published[0].body["metricValue"], 0.0);
        assert_eq!(published[0].body["predictionTime"], 1120);
        assert_eq!(published[0].body["level"], 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_policy_gives_up() {
        let bus = Arc::new(InMemoryBus::new().failing_first(10));
        let policy = RetryPolicy {
            max_attempts: Some(3),
            ..RetryPolicy::default()
        };
        let publisher = PredictionPublisher::new(bus.clone(), TopicLayout::default(), policy);

        let result = publisher
            .publish(&ApplicationName::new("shop"), &MetricName::new("cpu"), &forecast())
            .await
            .unwrap();

        assert!(matches!(result, Err(PublishError::Exhausted { attempts: 3, .. })));
        assert_eq!(bus.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deliver_does_not_wait_for_bus() {
        let bus = Arc::new(InMemoryBus::new().failing_first(1));
        let publisher = PredictionPublisher::new(bus.clone(), TopicLayout::default(), RetryPolicy::default());

        publisher.deliver(&ApplicationName::new("shop"), &MetricName::new("cpu"), forecast());
        assert!(bus.published().await.is_empty());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(bus.published().await.len(), 1);
    }
}
