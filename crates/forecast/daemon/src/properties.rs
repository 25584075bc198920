//! Persisted key-value configuration in `.properties` format.
//!
//! The file is shared with the forecasting executable, so unknown keys are
//! kept and written back untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{DaemonError, DaemonResult};

/// Width of the monitoring aggregation window, seconds.
pub const AGGREGATION_WINDOW_KEY: &str = "number_of_seconds_to_aggregate_on";
/// Slots forecast per scheduling cycle.
pub const FORWARD_PREDICTIONS_KEY: &str = "number_of_forward_predictions";
/// Initial processing-time estimate, seconds.
pub const SAFETY_MARGIN_KEY: &str = "prediction_processing_time_safety_margin_seconds";

pub struct PropertiesStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl PropertiesStore {
    /// Load the store. A missing file yields an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> DaemonResult<Self> {
        let path = path.into();
        let entries = read_entries(&path).await?;
        debug!(path = %path.display(), keys = entries.len(), "Properties loaded");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, replacing everything held in memory.
    pub async fn reload(&self) -> DaemonResult<()> {
        let entries = read_entries(&self.path).await?;
        *self.entries.write().await = entries;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    /// Value of `key` parsed as `T`. Unparseable values are logged and ignored.
    pub async fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, value = %raw, "Ignoring unparseable property");
                None
            }
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write().await.insert(key.into(), value.into());
    }

    /// Write every entry back to the file.
    pub async fn store(&self) -> DaemonResult<()> {
        let entries = self.entries.read().await;
        tokio::fs::write(&self.path, render(&entries)).await?;
        Ok(())
    }

    pub async fn batch_depth(&self) -> Option<usize> {
        self.get_parsed::<usize>(FORWARD_PREDICTIONS_KEY)
            .await
            .filter(|depth| *depth > 0)
    }

    pub async fn safety_margin_secs(&self) -> Option<f64> {
        self.get_parsed::<f64>(SAFETY_MARGIN_KEY)
            .await
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
    }

    /// Shrink the aggregation window to `horizon` if it is wider, and persist.
    ///
    /// Reload, update and store happen under one write guard so a
    /// concurrent reload cannot drop the change.
    ///
    /// Returns the previous window when it was changed.
    pub async fn lower_aggregation_window(&self, horizon: u64) -> DaemonResult<Option<u64>> {
        let mut entries = self.entries.write().await;
        *entries = read_entries(&self.path).await?;

        let current = match entries.get(AGGREGATION_WINDOW_KEY).map(|raw| raw.trim().parse::<u64>()) {
            Some(Ok(current)) => current,
            Some(Err(_)) => {
                warn!(key = AGGREGATION_WINDOW_KEY, "Ignoring unparseable property");
                return Ok(None);
            }
            None => return Ok(None),
        };
        if horizon >= current {
            return Ok(None);
        }

        info!(from = current, to = horizon, "Lowering {}", AGGREGATION_WINDOW_KEY);
        entries.insert(AGGREGATION_WINDOW_KEY.to_string(), horizon.to_string());
        tokio::fs::write(&self.path, render(&entries)).await?;
        Ok(Some(current))
    }
}

async fn read_entries(path: &Path) -> DaemonResult<BTreeMap<String, String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(parse(&contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Properties file not found, using defaults");
            Ok(BTreeMap::new())
        }
        Err(e) => Err(DaemonError::Properties(format!("{}: {}", path.display(), e))),
    }
}

/// Parse `key=value` / `key: value` lines. `#` and `!` start comments.
fn parse(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = separator_index(line)?;
            let key = line[..split].trim();
            let value = line[split + 1..].trim();
            (!key.is_empty()).then(|| (unescape(key), unescape(value)))
        })
        .collect()
}

/// Byte index of the first unescaped `=` or `:`.
fn separator_index(line: &str) -> Option<usize> {
    let mut escaped = false;
    for (index, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '=' | ':' => return Some(index),
            _ => {}
        }
    }
    None
}

fn render(entries: &BTreeMap<String, String>) -> String {
    let mut contents = String::from("#Forecast service configuration\n");
    for (key, value) in entries {
        contents.push_str(&escape(key));
        contents.push('=');
        contents.push_str(&escape(value));
        contents.push('\n');
    }
    contents
}

fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('=', "\\=")
        .replace(':', "\\:")
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
#comment
! another
number_of_seconds_to_aggregate_on=120
number_of_forward_predictions = 4
path_to_datasets: /data
broker_address=tcp\\://broker
";

    async fn store_with(contents: &str) -> (tempfile::TempDir, PropertiesStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prediction.properties");
        tokio::fs::write(&path, contents).await.unwrap();
        let store = PropertiesStore::open(&path).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_parse_and_typed_access() {
        let (_dir, store) = store_with(SAMPLE).await;
        assert_eq!(store.get("path_to_datasets").await.as_deref(), Some("/data"));
        assert_eq!(store.get("broker_address").await.as_deref(), Some("tcp://broker"));
        assert_eq!(store.batch_depth().await, Some(4));
        assert_eq!(store.safety_margin_secs().await, None);
    }

    #[tokio::test]
    async fn test_lower_aggregation_window_persists() {
        let (_dir, store) = store_with(SAMPLE).await;

        assert_eq!(store.lower_aggregation_window(300).await.unwrap(), None);
        assert_eq!(store.lower_aggregation_window(60).await.unwrap(), Some(120));

        let reopened = PropertiesStore::open(store.path()).await.unwrap();
        assert_eq!(reopened.get_parsed::<u64>(AGGREGATION_WINDOW_KEY).await, Some(60));
        assert_eq!(reopened.get("path_to_datasets").await.as_deref(), Some("/data"));
        assert_eq!(reopened.get("broker_address").await.as_deref(), Some("tcp://broker"));
    }

    #[tokio::test]
    async fn test_escaped_separators_round_trip() {
        let (_dir, store) = store_with("").await;
        store.set("host:port=main", "tcp://broker:5672").await;
        store.set("plain", "a\\b").await;
        store.store().await.unwrap();

        let reopened = PropertiesStore::open(store.path()).await.unwrap();
        assert_eq!(
            reopened.get("host:port=main").await.as_deref(),
            Some("tcp://broker:5672")
        );
        assert_eq!(reopened.get("plain").await.as_deref(), Some("a\\b"));
        assert_eq!(reopened.get("host").await, None);
    }

    #[tokio::test]
    async fn test_concurrent_reload_keeps_lowered_window() {
        let (_dir, store) = store_with(SAMPLE).await;
        let store = std::sync::Arc::new(store);

        let reloads: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.reload().await.unwrap() })
            })
            .collect();
        assert_eq!(store.lower_aggregation_window(60).await.unwrap(), Some(120));
        for reload in reloads {
            reload.await.unwrap();
        }

        store.reload().await.unwrap();
        assert_eq!(store.get_parsed::<u64>(AGGREGATION_WINDOW_KEY).await, Some(60));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PropertiesStore::open(dir.path().join("absent.properties"))
            .await
            .unwrap();
        assert_eq!(store.get(AGGREGATION_WINDOW_KEY).await, None);
        assert_eq!(store.lower_aggregation_window(60).await.unwrap(), None);
    }
}
