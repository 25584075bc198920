//! Engine configuration.
//!
//! Describes how the forecasting executable is launched and how the
//! scheduler seeds its processing-time estimate.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the forecasting engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// External executable configuration.
    #[serde(default)]
    pub executable: ExecutableConfig,

    /// Slots forecast per cycle when the configuration store sets none.
    #[serde(default = "default_batch_depth")]
    pub batch_depth: usize,

    /// Processing time assumed before any round has been observed, in seconds.
    #[serde(default = "default_safety_margin")]
    pub safety_margin_secs: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: ExecutableConfig::default(),
            batch_depth: default_batch_depth(),
            safety_margin_secs: default_safety_margin(),
        }
    }
}

/// How to launch the forecasting executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutableConfig {
    /// Interpreter or binary to run.
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the per-metric ones (typically the script).
    #[serde(default = "default_leading_args")]
    pub leading_args: Vec<String>,

    /// Working directory of the child process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Hard limit on one invocation, in seconds. Unset means no limit.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ExecutableConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            leading_args: default_leading_args(),
            working_dir: None,
            timeout_secs: None,
        }
    }
}

impl ExecutableConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_program() -> String {
    "Rscript".to_string()
}

fn default_leading_args() -> Vec<String> {
    vec!["forecasting_real_workload.R".to_string()]
}

fn default_batch_depth() -> usize {
    8
}

fn default_safety_margin() -> f64 {
    20.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.batch_depth, 8);
        assert_eq!(config.safety_margin_secs, 20.0);
        assert_eq!(config.executable.program, "Rscript");
        assert!(config.executable.timeout().is_none());
    }
}
