//! Application state for API handlers

use crate::dispatcher::Dispatcher;
use forecast_registry::ApplicationRegistry;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Inbound message dispatcher
    pub dispatcher: Arc<Dispatcher>,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    pub fn registry(&self) -> &Arc<ApplicationRegistry> {
        self.dispatcher.registry()
    }

    /// Uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds().max(0);
        let (days, rem) = (secs / 86_400, secs % 86_400);
        let (hours, rem) = (rem / 3600, rem % 3600);
        let (minutes, seconds) = (rem / 60, rem % 60);
        if days > 0 {
            format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
        } else if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else {
            format!("{}m {}s", minutes, seconds)
        }
    }
}
