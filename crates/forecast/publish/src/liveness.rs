//! Periodic liveness signal.

use std::sync::Arc;
use std::time::Duration;

use forecast_types::LivenessMessage;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::bus::{Envelope, MessageBus};

/// Signals logged at most once per this many sends.
pub const DEFAULT_LOG_EVERY: u64 = 3600;

pub struct LivenessPublisher {
    bus: Arc<dyn MessageBus>,
    address: String,
    period: Duration,
}

impl LivenessPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, address: impl Into<String>, period: Duration) -> Self {
        Self {
            bus,
            address: address.into(),
            period,
        }
    }

    /// Send signals until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let body = match serde_json::to_value(LivenessMessage::alive()) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Cannot encode liveness signal");
                return;
            }
        };

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sent: u64 = 0;

        loop {
            ticker.tick().await;

            let envelope = Envelope::new(self.address.clone(), body.clone());
            match self.bus.publish(&envelope).await {
                Ok(()) => {
                    sent += 1;
                    if sent % DEFAULT_LOG_EVERY == 0 {
                        info!(address = %self.address, sent, "Liveness signals sent");
                    }
                }
                Err(e) => warn!(address = %self.address, error = %e, "Liveness signal not sent"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBus;

    #[tokio::test(start_paused = true)]
    async fn test_signals_every_period() {
        let bus = Arc::new(InMemoryBus::new());
        let address = "eu.nebulouscloud.state.exponentialsmoothing.isalive";
        let handle = LivenessPublisher::new(bus.clone(), address, Duration::from_secs(1)).spawn();

        // Ticks at 0s, 1s, 2s and 3s.
        tokio::time::sleep(Duration::from_millis(3500)).await;
        handle.abort();

        let published = bus.published_to(address).await;
        assert_eq!(published.len(), 4);
        assert_eq!(published[0].body, serde_json::json!({"isalive": true}));
    }
}
