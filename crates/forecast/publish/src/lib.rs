//! # Forecast Publish - Delivery to the Message Bus
//!
//! Everything that leaves the service goes through a [`MessageBus`].
//!
//! - [`PredictionPublisher`]: at-least-once delivery of forecasts, one
//!   background task per message, retried with capped exponential backoff
//! - [`LivenessPublisher`]: periodic `{"isalive": true}` signal
//! - [`HttpBus`]: posts envelopes to a broker bridge
//! - [`InMemoryBus`]: loopback bus for tests and broker-less runs

pub mod bus;
pub mod error;
pub mod http;
pub mod liveness;
pub mod memory;
pub mod publisher;
pub mod retry;

pub use bus::{Envelope, MessageBus};
pub use error::{PublishError, PublishResult};
pub use http::HttpBus;
pub use liveness::LivenessPublisher;
pub use memory::InMemoryBus;
pub use publisher::PredictionPublisher;
pub use retry::RetryPolicy;
