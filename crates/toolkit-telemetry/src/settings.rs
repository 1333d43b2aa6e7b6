//! Settings storage and legacy telemetry value coercion
//!
//! Older releases stored the telemetry flag as the strings `"Enable"` and
//! `"Disable"`. Every read of a telemetry flag goes through [`convert_legacy`]
//! so both shapes are accepted.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, TelemetryError};

const LEGACY_TELEMETRY_DISABLE: &str = "Disable";
const LEGACY_TELEMETRY_ENABLE: &str = "Enable";

/// Coerce a stored telemetry setting to a boolean.
pub fn convert_legacy(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == LEGACY_TELEMETRY_DISABLE => Ok(false),
        Value::String(s) if s == LEGACY_TELEMETRY_ENABLE => Ok(true),
        Value::String(s) => Err(TelemetryError::InvalidSetting { value: s.clone() }),
        other => Err(TelemetryError::InvalidSetting {
            value: other.to_string(),
        }),
    }
}

/// Named configuration values owned by the host
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read a value by dotted key (`aws.telemetry`)
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a value by dotted key
    async fn update(&self, key: &str, value: Value) -> Result<()>;

    /// Whether the key has an explicit value
    fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Read a telemetry flag, falling back to `default` when unset or invalid.
pub fn get_flag(store: &dyn SettingsStore, key: &str, default: bool) -> bool {
    match store.get(key) {
        None => default,
        Some(value) => match convert_legacy(&value) {
            Ok(flag) => flag,
            Err(e) => {
                warn!(key, error = %e, "settings: invalid value, using default");
                default
            }
        },
    }
}

/// Copy the boolean value of `from` into `to`.
///
/// Nothing is written when `to` already has an explicit value, when `from` is
/// unset, or when `from` does not hold a valid flag. Returns whether a value
/// was written.
pub async fn migrate_setting(store: &dyn SettingsStore, from: &str, to: &str) -> Result<bool> {
    if store.is_set(to) {
        debug!(from, to, "settings migration: target already set");
        return Ok(false);
    }

    let Some(previous) = store.get(from) else {
        return Ok(false);
    };

    let flag = match convert_legacy(&previous) {
        Ok(flag) => flag,
        Err(e) => {
            warn!(from, to, error = %e, "settings migration: cannot convert previous value");
            return Ok(false);
        }
    };

    store.update(to, Value::Bool(flag)).await?;
    debug!(from, to, value = flag, "settings migration: copied value");
    Ok(true)
}

/// In-memory settings, keyed by dotted name
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<BTreeMap<String, Value>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: impl Into<Value>) -> Self {
        self.values.write().insert(key.to_string(), value.into());
        self
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    async fn update(&self, key: &str, value: Value) -> Result<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// Settings backed by a TOML file
///
/// Dotted keys map onto nested tables, so `aws.telemetry` lives under
/// `[aws] telemetry = ...`. Updates rewrite the whole file.
#[derive(Debug)]
pub struct TomlSettings {
    path: PathBuf,
    table: RwLock<toml::Table>,
}

impl TomlSettings {
    /// Load settings from `path`. A missing file yields empty settings.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = if path.exists() {
            let content = fs::read_to_string(&path)?;
            content.parse::<toml::Table>()?
        } else {
            toml::Table::new()
        };

        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lookup<'a>(table: &'a toml::Table, key: &str) -> Option<&'a toml::Value> {
    let mut parts = key.split('.').peekable();
    let mut current = table;
    while let Some(part) = parts.next() {
        let value = current.get(part)?;
        if parts.peek().is_none() {
            return Some(value);
        }
        current = value.as_table()?;
    }
    None
}

fn insert(table: &mut toml::Table, key: &str, value: toml::Value) -> Result<()> {
    let (parents, leaf) = match key.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, key),
    };

    let mut current = table;
    for part in parents.into_iter().flat_map(|p| p.split('.')) {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        current = entry.as_table_mut().ok_or_else(|| {
            TelemetryError::State(format!("settings key '{}' is not a table", part))
        })?;
    }
    current.insert(leaf.to_string(), value);
    Ok(())
}

#[async_trait]
impl SettingsStore for TomlSettings {
    fn get(&self, key: &str) -> Option<Value> {
        let table = self.table.read();
        let value = lookup(&table, key)?;
        serde_json::to_value(value).ok()
    }

    async fn update(&self, key: &str, value: Value) -> Result<()> {
        let value = toml::Value::try_from(value)?;
        let mut updated = self.table.read().clone();
        insert(&mut updated, key, value.clone())?;
        let content = toml::to_string_pretty(&updated)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, content).await?;

        // Re-apply on the live table so concurrent updates to other keys survive
        insert(&mut self.table.write(), key, value)?;
        Ok(())
    }
}
