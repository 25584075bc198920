//! HTTP bridge to the broker.
//!
//! Each envelope is posted as JSON to `{base_url}/topics/{address}`. The
//! application travels in the `x-application` header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::bus::{Envelope, MessageBus};
use crate::error::{PublishError, PublishResult};

const APPLICATION_HEADER: &str = "x-application";
const MESSAGE_ID_HEADER: &str = "x-message-id";

pub struct HttpBus {
    client: Client,
    base_url: String,
}

impl HttpBus {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> PublishResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(PublishError::Config("broker url is empty".to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn url_for(&self, address: &str) -> String {
        format!("{}/topics/{}", self.base_url, address)
    }
}

#[async_trait]
impl MessageBus for HttpBus {
    async fn publish(&self, envelope: &Envelope) -> PublishResult<()> {
        let mut request = self
            .client
            .post(self.url_for(&envelope.address))
            .header(MESSAGE_ID_HEADER, envelope.id.to_string())
            .json(&envelope.body);

        if let Some(application) = &envelope.application {
            request = request.header(APPLICATION_HEADER, application.as_str());
        }

        let response = request.send().await?.error_for_status()?;
        debug!(
            address = %envelope.address,
            status = %response.status(),
            "Envelope posted"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_url() {
        let bus = HttpBus::new("http://broker:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            bus.url_for("eu.nebulouscloud.preliminary_predicted.exponentialsmoothing.cpu"),
            "http://broker:8080/topics/eu.nebulouscloud.preliminary_predicted.exponentialsmoothing.cpu"
        );
    }

    #[test]
    fn test_empty_url_rejected() {
        assert!(matches!(
            HttpBus::new("", Duration::from_secs(5)),
            Err(PublishError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_transport_error() {
        let bus = HttpBus::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let result = bus
            .publish(&Envelope::new("t", serde_json::json!({})))
            .await;
        assert!(matches!(result, Err(PublishError::Transport(_))));
    }
}
