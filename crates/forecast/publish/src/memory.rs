//! Loopback bus.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::bus::{Envelope, MessageBus};
use crate::error::{PublishError, PublishResult};

const DEFAULT_HISTORY: usize = 1024;

/// Keeps the most recent envelopes in memory.
pub struct InMemoryBus {
    history: RwLock<VecDeque<Envelope>>,
    capacity: usize,
    failures_left: AtomicU32,
    attempts: AtomicU64,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            failures_left: AtomicU32::new(0),
            attempts: AtomicU64::new(0),
        }
    }

    /// Refuse the next `failures` publish attempts.
    pub fn failing_first(self, failures: u32) -> Self {
        self.failures_left.store(failures, Ordering::SeqCst);
        self
    }

    /// Envelopes accepted so far, oldest first.
    pub async fn published(&self) -> Vec<Envelope> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Envelopes accepted on `address`.
    pub async fn published_to(&self, address: &str) -> Vec<Envelope> {
        self.history
            .read()
            .await
            .iter()
            .filter(|envelope| envelope.address == address)
            .cloned()
            .collect()
    }

    /// Every publish call, accepted or not.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, envelope: &Envelope) -> PublishResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            return Err(PublishError::Unavailable(format!(
                "loopback bus refused {}",
                envelope.address
            )));
        }

        {
            let mut history = self.history.write().await;
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(envelope.clone());
        }

        debug!(address = %envelope.address, id = %envelope.id, "Envelope accepted");
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_history_is_bounded() {
        let bus = InMemoryBus::with_capacity(2);
        for n in 0..3 {
            bus.publish(&Envelope::new("t", json!(n))).await.unwrap();
        }
        let bodies: Vec<_> = bus.published().await.into_iter().map(|e| e.body).collect();
        assert_eq!(bodies, vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_failing_first() {
        let bus = InMemoryBus::new().failing_first(1);
        let envelope = Envelope::new("t", json!({}));
        assert!(bus.publish(&envelope).await.is_err());
        assert!(bus.publish(&envelope).await.is_ok());
        assert_eq!(bus.attempts(), 2);
        assert_eq!(bus.published_to("t").await.len(), 1);
    }
}
