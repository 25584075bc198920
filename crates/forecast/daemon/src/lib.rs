//! Forecast Daemon library
//!
//! This module provides the components of the forecast daemon:
//! - Configuration and the shared properties file
//! - Control-plane dispatch of inbound bus messages
//! - REST bridge and status API
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod properties;
pub mod server;
pub mod snapshot;

pub use config::DaemonConfig;
pub use dispatcher::{DispatchOutcome, Dispatcher, Route};
pub use error::{ApiError, DaemonError, DaemonResult, DispatchError};
pub use properties::PropertiesStore;
pub use server::Server;
pub use snapshot::PropertiesSnapshot;
