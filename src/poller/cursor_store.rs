//! # Cursor Store
//!
//! Key-value persistence for the poller's resume cursor. The poller stores one
//! value, `{"cursor": "..."}`, under
//! [`POLLER_CURSOR_KEY`](crate::constants::POLLER_CURSOR_KEY).

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{BrokerError, BrokerResult};

/// Persistence collaborator for poller cursors
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Stored value, `None` when the key was never written
    async fn get(&self, key: &str) -> BrokerResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> BrokerResult<()>;
}

/// Process-local store; contents are lost on restart
#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    values: DashMap<String, Value>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for InMemoryCursorStore {
    async fn get(&self, key: &str) -> BrokerResult<Option<Value>> {
        Ok(self.values.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> BrokerResult<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Store backed by one JSON object on disk
///
/// Writes go to a sibling temp file that is then renamed over the target.
#[derive(Debug)]
pub struct JsonFileCursorStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> BrokerResult<Map<String, Value>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(BrokerError::cursor_store(
                    "read",
                    format!("{}: {e}", self.path.display()),
                ))
            }
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&contents)? {
            Value::Object(map) => Ok(map),
            other => Err(BrokerError::cursor_store(
                "read",
                format!(
                    "{} holds {} instead of a JSON object",
                    self.path.display(),
                    json_kind(&other)
                ),
            )),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl CursorStore for JsonFileCursorStore {
    async fn get(&self, key: &str) -> BrokerResult<Option<Value>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> BrokerResult<()> {
        let _guard = self.lock.lock().await;
        let mut all = self.read_all().await?;
        all.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BrokerError::cursor_store("write", format!("{}: {e}", parent.display())))?;
        }

        let body = serde_json::to_vec_pretty(&Value::Object(all))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| BrokerError::cursor_store("write", format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| BrokerError::cursor_store("write", format!("{}: {e}", self.path.display())))?;

        debug!(path = %self.path.display(), key = %key, "Cursor persisted");
        Ok(())
    }
}
