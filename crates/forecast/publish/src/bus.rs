//! Message bus seam.

use async_trait::async_trait;
use forecast_types::ApplicationName;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PublishResult;

/// One message addressed to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    /// Full topic name, without transport scheme.
    pub address: String,
    /// Application the message concerns, sent as a message property.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationName>,
    pub body: serde_json::Value,
}

impl Envelope {
    pub fn new(address: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            address: address.into(),
            application: None,
            body,
        }
    }

    pub fn for_application(mut self, application: ApplicationName) -> Self {
        self.application = Some(application);
        self
    }
}

/// Sends envelopes to the outside world.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Send one envelope. An error means it was not accepted.
    async fn publish(&self, envelope: &Envelope) -> PublishResult<()>;

    /// Name used in logs.
    fn name(&self) -> &str;
}
