//! Telemetry configuration: the per-product telemetry flag and host config loading

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::settings::{get_flag, migrate_setting, SettingsStore};
use crate::state::{GlobalState, AMAZON_Q_MIGRATED_STATE_KEY};

/// Settings key for the AWS Toolkit telemetry flag
pub const TOOLKIT_TELEMETRY_KEY: &str = "aws.telemetry";

/// Settings key for the Amazon Q telemetry flag
pub const AMAZON_Q_TELEMETRY_KEY: &str = "amazonQ.telemetry";

/// The product surface the extension host is currently running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductSurface {
    #[default]
    Toolkit,
    #[serde(rename = "amazonq")]
    AmazonQ,
}

impl ProductSurface {
    pub fn as_str(&self) -> &str {
        match self {
            ProductSurface::Toolkit => "toolkit",
            ProductSurface::AmazonQ => "amazonq",
        }
    }

    /// Settings key holding this surface's telemetry flag
    pub fn telemetry_key(&self) -> &'static str {
        match self {
            ProductSurface::Toolkit => TOOLKIT_TELEMETRY_KEY,
            ProductSurface::AmazonQ => AMAZON_Q_TELEMETRY_KEY,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "toolkit" | "aws" => Some(ProductSurface::Toolkit),
            "amazonq" => Some(ProductSurface::AmazonQ),
            _ => None,
        }
    }
}

/// Telemetry flag accessor over the two product surfaces
///
/// Only the active surface's flag is consulted.
#[derive(Clone)]
pub struct TelemetryConfig {
    settings: Arc<dyn SettingsStore>,
    surface: ProductSurface,
    env_opt_out: bool,
}

impl TelemetryConfig {
    pub fn new(settings: Arc<dyn SettingsStore>, surface: ProductSurface) -> Self {
        Self {
            settings,
            surface,
            env_opt_out: false,
        }
    }

    /// Force telemetry off regardless of settings (see [`telemetry_disabled_by_env`])
    pub fn with_env_opt_out(mut self, opt_out: bool) -> Self {
        self.env_opt_out = opt_out;
        self
    }

    pub fn surface(&self) -> ProductSurface {
        self.surface
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    /// Whether telemetry is enabled for the active surface (default: true)
    pub fn is_enabled(&self) -> bool {
        if self.env_opt_out {
            return false;
        }
        get_flag(self.settings.as_ref(), self.surface.telemetry_key(), true)
    }

    pub fn toolkit_enabled(&self) -> bool {
        get_flag(self.settings.as_ref(), TOOLKIT_TELEMETRY_KEY, true)
    }

    pub fn amazon_q_enabled(&self) -> bool {
        get_flag(self.settings.as_ref(), AMAZON_Q_TELEMETRY_KEY, true)
    }

    /// Seed `amazonQ.telemetry` from `aws.telemetry`, once per installation.
    ///
    /// `aws.telemetry` stays in place; the state flag ensures a later user
    /// change to `amazonQ.telemetry` is never overwritten. Safe to call on
    /// every startup.
    pub async fn init_amazon_q_setting(&self, state: &dyn GlobalState) -> crate::Result<()> {
        if self.surface != ProductSurface::AmazonQ
            || state.try_get_bool(AMAZON_Q_MIGRATED_STATE_KEY, false)
        {
            return Ok(());
        }

        migrate_setting(
            self.settings.as_ref(),
            TOOLKIT_TELEMETRY_KEY,
            AMAZON_Q_TELEMETRY_KEY,
        )
        .await?;
        state
            .update(AMAZON_Q_MIGRATED_STATE_KEY, serde_json::Value::Bool(true))
            .await?;
        debug!("telemetry: initialized amazonQ.telemetry setting");
        Ok(())
    }
}

impl std::fmt::Debug for TelemetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryConfig")
            .field("surface", &self.surface)
            .field("env_opt_out", &self.env_opt_out)
            .finish()
    }
}

/// Static description of the host application
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    #[serde(default)]
    pub product: ProductSurface,

    /// Host application display name, e.g. "Visual Studio Code"
    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default = "default_host_version")]
    pub host_version: String,

    #[serde(default = "default_extension_version")]
    pub extension_version: String,

    /// Remote session name ("ssh-remote", "wsl", ...), absent when local
    pub remote_name: Option<String>,

    /// Restricted (browser) execution mode
    #[serde(default)]
    pub web: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            product: ProductSurface::default(),
            app_name: default_app_name(),
            host_version: default_host_version(),
            extension_version: default_extension_version(),
            remote_name: None,
            web: false,
        }
    }
}

fn default_app_name() -> String {
    "Visual Studio Code".to_string()
}

fn default_host_version() -> String {
    "1.83.0".to_string()
}

fn default_extension_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Load host configuration with precedence:
/// 1. Environment variables (highest priority)
/// 2. Explicit config file, if given
/// 3. User config (~/.toolkit/config.toml)
/// 4. Defaults
pub fn load_host_config(explicit: Option<&Path>) -> Result<HostConfig> {
    let mut config = HostConfig::default();

    if let Some(home_dir) = dirs::home_dir() {
        let user_config = home_dir.join(".toolkit/config.toml");
        if user_config.exists() {
            if let Ok(cfg) = load_config_from_file(&user_config) {
                config = cfg;
            }
        }
    }

    if let Some(path) = explicit {
        config = load_config_from_file(path)?;
    }

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load the `[host]` section of a TOML file
fn load_config_from_file(path: &Path) -> Result<HostConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;

    #[derive(Deserialize)]
    struct FullConfig {
        #[serde(default)]
        host: Option<HostConfig>,
    }

    let full_config: FullConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;

    Ok(full_config.host.unwrap_or_default())
}

fn apply_env_overrides(config: &mut HostConfig) {
    if let Some(product) = env::var("TOOLKIT_PRODUCT")
        .ok()
        .and_then(|p| ProductSurface::parse(&p))
    {
        config.product = product;
    }

    if let Ok(remote) = env::var("TOOLKIT_REMOTE_NAME") {
        config.remote_name = if remote.is_empty() { None } else { Some(remote) };
    }
}

/// Whether the user opted out through the environment
/// (`TOOLKIT_TELEMETRY_DISABLED` or the universal `DO_NOT_TRACK`).
pub fn telemetry_disabled_by_env() -> bool {
    env::var("TOOLKIT_TELEMETRY_DISABLED").is_ok() || env::var("DO_NOT_TRACK").is_ok()
}

/// Get the telemetry state directory
pub fn get_telemetry_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().context("Could not determine home directory")?;
    let telemetry_dir = home_dir.join(".toolkit").join("telemetry");
    fs::create_dir_all(&telemetry_dir)?;
    Ok(telemetry_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;
    use crate::state::{FileState, MemoryState};
    use serde_json::json;
    use serial_test::serial;
    use tempfile::TempDir;

    fn config_with(settings: MemorySettings, surface: ProductSurface) -> TelemetryConfig {
        TelemetryConfig::new(Arc::new(settings), surface)
    }

    #[test]
    fn test_enabled_by_default() {
        let config = config_with(MemorySettings::new(), ProductSurface::Toolkit);
        assert!(config.is_enabled());

        let config = config_with(MemorySettings::new(), ProductSurface::AmazonQ);
        assert!(config.is_enabled());
    }

    #[test]
    fn test_only_active_surface_is_consulted() {
        let settings = MemorySettings::new()
            .with(TOOLKIT_TELEMETRY_KEY, false)
            .with(AMAZON_Q_TELEMETRY_KEY, true);
        let settings: Arc<dyn SettingsStore> = Arc::new(settings);

        let toolkit = TelemetryConfig::new(settings.clone(), ProductSurface::Toolkit);
        assert!(!toolkit.is_enabled());

        let amazon_q = TelemetryConfig::new(settings, ProductSurface::AmazonQ);
        assert!(amazon_q.is_enabled());
        assert!(!amazon_q.toolkit_enabled());
        assert!(amazon_q.amazon_q_enabled());
    }

    #[test]
    fn test_legacy_values_are_honored() {
        let config = config_with(
            MemorySettings::new().with(TOOLKIT_TELEMETRY_KEY, "Disable"),
            ProductSurface::Toolkit,
        );
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_env_opt_out_wins() {
        let config = config_with(
            MemorySettings::new().with(TOOLKIT_TELEMETRY_KEY, true),
            ProductSurface::Toolkit,
        )
        .with_env_opt_out(true);
        assert!(!config.is_enabled());
    }

    #[tokio::test]
    async fn test_init_amazon_q_setting_runs_once() {
        let settings: Arc<dyn SettingsStore> =
            Arc::new(MemorySettings::new().with(TOOLKIT_TELEMETRY_KEY, false));
        let state = MemoryState::new();
        let config = TelemetryConfig::new(settings.clone(), ProductSurface::AmazonQ);

        config.init_amazon_q_setting(&state).await.unwrap();
        assert_eq!(settings.get(AMAZON_Q_TELEMETRY_KEY), Some(json!(false)));
        assert!(state.try_get_bool(AMAZON_Q_MIGRATED_STATE_KEY, false));

        // User re-enables Amazon Q telemetry; a second startup must not clobber it
        settings
            .update(AMAZON_Q_TELEMETRY_KEY, json!(true))
            .await
            .unwrap();
        settings
            .update(TOOLKIT_TELEMETRY_KEY, json!(false))
            .await
            .unwrap();

        config.init_amazon_q_setting(&state).await.unwrap();
        assert_eq!(settings.get(AMAZON_Q_TELEMETRY_KEY), Some(json!(true)));
        assert!(state.try_get_bool(AMAZON_Q_MIGRATED_STATE_KEY, false));
    }

    #[tokio::test]
    async fn test_init_amazon_q_setting_skipped_for_toolkit() {
        let settings: Arc<dyn SettingsStore> =
            Arc::new(MemorySettings::new().with(TOOLKIT_TELEMETRY_KEY, false));
        let state = MemoryState::new();
        let config = TelemetryConfig::new(settings.clone(), ProductSurface::Toolkit);

        config.init_amazon_q_setting(&state).await.unwrap();
        assert!(!settings.is_set(AMAZON_Q_TELEMETRY_KEY));
        assert!(!state.try_get_bool(AMAZON_Q_MIGRATED_STATE_KEY, false));
    }

    #[tokio::test]
    async fn test_init_amazon_q_setting_marks_even_without_source() {
        let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettings::new());
        let state = MemoryState::new();
        let config = TelemetryConfig::new(settings.clone(), ProductSurface::AmazonQ);

        config.init_amazon_q_setting(&state).await.unwrap();
        assert!(!settings.is_set(AMAZON_Q_TELEMETRY_KEY));
        assert!(state.try_get_bool(AMAZON_Q_MIGRATED_STATE_KEY, false));
    }

    #[tokio::test]
    async fn test_init_amazon_q_setting_retries_after_failed_state_write() {
        let temp_dir = TempDir::new().unwrap();
        let settings: Arc<dyn SettingsStore> =
            Arc::new(MemorySettings::new().with(TOOLKIT_TELEMETRY_KEY, false));
        let state = FileState::open(temp_dir.path()).unwrap();
        fs::create_dir(state.path()).unwrap();
        let config = TelemetryConfig::new(settings.clone(), ProductSurface::AmazonQ);

        assert!(config.init_amazon_q_setting(&state).await.is_err());
        assert!(!state.try_get_bool(AMAZON_Q_MIGRATED_STATE_KEY, false));

        // Once the state file is writable again the migration completes
        fs::remove_dir(state.path()).unwrap();
        config.init_amazon_q_setting(&state).await.unwrap();
        assert!(state.try_get_bool(AMAZON_Q_MIGRATED_STATE_KEY, false));
        assert_eq!(settings.get(AMAZON_Q_TELEMETRY_KEY), Some(json!(false)));
    }

    #[test]
    fn test_product_surface_parse() {
        assert_eq!(ProductSurface::parse("AmazonQ"), Some(ProductSurface::AmazonQ));
        assert_eq!(ProductSurface::parse("toolkit"), Some(ProductSurface::Toolkit));
        assert_eq!(ProductSurface::parse("aws"), Some(ProductSurface::Toolkit));
        assert_eq!(ProductSurface::parse("other"), None);
    }

    #[test]
    fn test_load_config_from_file_with_host_section() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");

        fs::write(
            &config_file,
            r#"
[host]
product = "amazonq"
app_name = "Code - OSS"
host_version = "1.90.0"
remote_name = "ssh-remote"
"#,
        )
        .unwrap();

        let config = load_config_from_file(&config_file).unwrap();
        assert_eq!(config.product, ProductSurface::AmazonQ);
        assert_eq!(config.app_name, "Code - OSS");
        assert_eq!(config.host_version, "1.90.0");
        assert_eq!(config.remote_name.as_deref(), Some("ssh-remote"));
        assert!(!config.web);
    }

    #[test]
    fn test_load_config_from_file_without_host_section() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        fs::write(&config_file, "[other]\nkey = 1\n").unwrap();

        let config = load_config_from_file(&config_file).unwrap();
        assert_eq!(config.product, ProductSurface::Toolkit);
        assert_eq!(config.app_name, "Visual Studio Code");
        assert!(config.remote_name.is_none());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        let original_product = env::var("TOOLKIT_PRODUCT").ok();
        let original_remote = env::var("TOOLKIT_REMOTE_NAME").ok();

        env::set_var("TOOLKIT_PRODUCT", "amazonq");
        env::set_var("TOOLKIT_REMOTE_NAME", "wsl");
        let mut config = HostConfig::default();
        apply_env_overrides(&mut config);
        assert_eq!(config.product, ProductSurface::AmazonQ);
        assert_eq!(config.remote_name.as_deref(), Some("wsl"));

        env::remove_var("TOOLKIT_PRODUCT");
        env::remove_var("TOOLKIT_REMOTE_NAME");
        if let Some(val) = original_product {
            env::set_var("TOOLKIT_PRODUCT", val);
        }
        if let Some(val) = original_remote {
            env::set_var("TOOLKIT_REMOTE_NAME", val);
        }
    }

    #[test]
    #[serial]
    fn test_do_not_track_disables_telemetry() {
        let original = env::var("DO_NOT_TRACK").ok();
        let original_disabled = env::var("TOOLKIT_TELEMETRY_DISABLED").ok();
        env::remove_var("TOOLKIT_TELEMETRY_DISABLED");

        env::set_var("DO_NOT_TRACK", "1");
        assert!(telemetry_disabled_by_env());
        env::remove_var("DO_NOT_TRACK");
        assert!(!telemetry_disabled_by_env());

        if let Some(val) = original {
            env::set_var("DO_NOT_TRACK", val);
        }
        if let Some(val) = original_disabled {
            env::set_var("TOOLKIT_TELEMETRY_DISABLED", val);
        }
    }
}
