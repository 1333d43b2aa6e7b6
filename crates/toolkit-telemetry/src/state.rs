//! Persisted key-value state and the process environment slot
//!
//! Both are injected so that client id resolution can run without a live
//! host. [`FileState`] and [`ProcessEnv`] are the real implementations;
//! [`MemoryState`] and [`MemoryEnv`] back tests and embedders.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Result, TelemetryError};

/// Persisted state key holding the client id
pub const CLIENT_ID_STATE_KEY: &str = "telemetryClientId";

/// Persisted state key marking the Amazon Q telemetry setting migration
pub const AMAZON_Q_MIGRATED_STATE_KEY: &str = "amazonq.telemetry.migrated";

/// Process-wide environment variable shared by co-located extensions
pub const CLIENT_ID_ENV_KEY: &str = "__TELEMETRY_CLIENT_ID";

/// Durable per-installation key-value storage
#[async_trait]
pub trait GlobalState: Send + Sync {
    /// Read a value. Never fails; unreadable state reads as absent.
    fn try_get(&self, key: &str) -> Option<Value>;

    /// Write a value, logging instead of failing.
    fn try_update(&self, key: &str, value: Value);

    /// Write a value and report failures.
    async fn update(&self, key: &str, value: Value) -> Result<()>;

    fn try_get_bool(&self, key: &str, default: bool) -> bool {
        self.try_get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    fn try_get_string(&self, key: &str) -> Option<String> {
        match self.try_get(key)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// In-memory state
#[derive(Debug, Default)]
pub struct MemoryState {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: impl Into<Value>) -> Self {
        self.values.write().insert(key.to_string(), value.into());
        self
    }
}

#[async_trait]
impl GlobalState for MemoryState {
    fn try_get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    fn try_update(&self, key: &str, value: Value) {
        self.values.write().insert(key.to_string(), value);
    }

    async fn update(&self, key: &str, value: Value) -> Result<()> {
        self.try_update(key, value);
        Ok(())
    }
}

/// State persisted as a JSON object on disk
#[derive(Debug)]
pub struct FileState {
    path: PathBuf,
    values: RwLock<Map<String, Value>>,
}

impl FileState {
    /// Open `state.json` inside `dir`, creating the directory if needed.
    ///
    /// A missing or unparseable file starts empty.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join("state.json");

        let values = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Map<String, Value>>(&content) {
                Ok(values) => values,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "state: ignoring unreadable state file");
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize the state as it would be with `key` set, leaving the
    /// in-memory copy untouched until the write lands.
    fn render_with(&self, key: &str, value: &Value) -> Result<String> {
        let mut values = self.values.read().clone();
        values.insert(key.to_string(), value.clone());
        Ok(serde_json::to_string_pretty(&values)?)
    }

    fn commit(&self, key: &str, value: Value) {
        self.values.write().insert(key.to_string(), value);
    }
}

#[async_trait]
impl GlobalState for FileState {
    fn try_get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    fn try_update(&self, key: &str, value: Value) {
        let result = self
            .render_with(key, &value)
            .and_then(|content| fs::write(&self.path, content).map_err(TelemetryError::from));
        match result {
            Ok(()) => self.commit(key, value),
            Err(e) => warn!(key, error = %e, "state: failed to persist value"),
        }
    }

    async fn update(&self, key: &str, value: Value) -> Result<()> {
        let content = self.render_with(key, &value)?;
        tokio::fs::write(&self.path, content).await?;
        self.commit(key, value);
        Ok(())
    }
}

/// Environment variables visible to every extension in the host process
pub trait EnvVars: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;

    fn set(&self, name: &str, value: &str) -> Result<()>;
}

/// The real process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvVars for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        // std::env::set_var panics on these
        if name.is_empty() || name.contains(['=', '\0']) || value.contains('\0') {
            return Err(TelemetryError::Env(format!(
                "cannot set environment variable '{}'",
                name
            )));
        }
        env::set_var(name, value);
        Ok(())
    }
}

/// Environment variables held in memory
#[derive(Debug, Default)]
pub struct MemoryEnv {
    vars: RwLock<HashMap<String, String>>,
    read_only: bool,
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment that rejects every write
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn with(self, name: &str, value: &str) -> Self {
        self.vars.write().insert(name.to_string(), value.to_string());
        self
    }
}

impl EnvVars for MemoryEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.read().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        if self.read_only {
            return Err(TelemetryError::Env(format!(
                "environment is read-only, cannot set '{}'",
                name
            )));
        }
        self.vars.write().insert(name.to_string(), value.to_string());
        Ok(())
    }
}
