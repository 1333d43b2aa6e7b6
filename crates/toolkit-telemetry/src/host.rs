//! Host environment predicates
//!
//! [`HostEnv`] is everything the telemetry helpers need to know about the
//! editor host: product, application name and version, remote session, and a
//! set of deployment checks. [`SystemHost`] probes the real machine;
//! [`StaticHost`] is fully scripted.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::process::Command;
use tracing::debug;

use crate::config::{HostConfig, ProductSurface};
use crate::error::{Result, TelemetryError};
use crate::machine_id::get_or_generate_machine_id;
use crate::state::{EnvVars, ProcessEnv};

/// Set inside CodeCatalyst dev environments
pub const DEV_ENVIRONMENT_ID_ENV_KEY: &str = "__DEV_ENVIRONMENT_ID";

/// Set by the test harness when running under automation
pub const AUTOMATION_ENV_KEY: &str = "AWS_TOOLKIT_AUTOMATION";

/// Set in SageMaker hosted editors
pub const SAGEMAKER_ENV_KEY: &str = "SAGEMAKER_APP_TYPE";

const CLOUD_DESKTOP_PROBE: &str = "/apollo/bin/getmyid";
const CLOUD_DESKTOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Flavor of the legacy Cloud9 IDE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cloud9Mode {
    Classic,
    CodeCatalyst,
}

#[async_trait]
pub trait HostEnv: Send + Sync {
    fn product(&self) -> ProductSurface;

    /// Host application display name
    fn app_name(&self) -> String;

    fn host_version(&self) -> String;

    fn extension_version(&self) -> String;

    /// Name of the remote session, if the host is attached to one
    fn remote_name(&self) -> Option<String>;

    /// Host-provided machine identifier
    fn machine_id(&self) -> Result<String>;

    /// Platform id in the `darwin` / `win32` / `linux` vocabulary
    fn platform(&self) -> String;

    fn is_cloud9(&self, mode: Cloud9Mode) -> bool;

    fn is_in_dev_env(&self) -> bool;

    fn is_sagemaker(&self) -> bool;

    fn is_remote_workspace(&self) -> bool;

    fn is_amazon_internal_os(&self) -> bool;

    async fn is_cloud_desktop(&self) -> bool;

    fn is_automation(&self) -> bool;

    /// Restricted (browser) execution mode
    fn is_web(&self) -> bool;
}

/// Map Rust's OS names onto the platform ids the editor reports
pub fn current_platform() -> String {
    match std::env::consts::OS {
        "macos" => "darwin".to_string(),
        "windows" => "win32".to_string(),
        other => other.to_string(),
    }
}

/// The machine the process runs on, described by a [`HostConfig`]
pub struct SystemHost {
    config: HostConfig,
    state_dir: PathBuf,
    env: Arc<dyn EnvVars>,
}

impl SystemHost {
    pub fn new(config: HostConfig, state_dir: PathBuf) -> Self {
        Self {
            config,
            state_dir,
            env: Arc::new(ProcessEnv),
        }
    }

    /// Read environment predicates from `env` instead of the process
    pub fn with_env(mut self, env: Arc<dyn EnvVars>) -> Self {
        self.env = env;
        self
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }
}

#[async_trait]
impl HostEnv for SystemHost {
    fn product(&self) -> ProductSurface {
        self.config.product
    }

    fn app_name(&self) -> String {
        self.config.app_name.clone()
    }

    fn host_version(&self) -> String {
        self.config.host_version.clone()
    }

    fn extension_version(&self) -> String {
        self.config.extension_version.clone()
    }

    fn remote_name(&self) -> Option<String> {
        self.config.remote_name.clone()
    }

    fn machine_id(&self) -> Result<String> {
        get_or_generate_machine_id(&self.state_dir)
            .map_err(|e| TelemetryError::State(format!("{:#}", e)))
    }

    fn platform(&self) -> String {
        current_platform()
    }

    fn is_cloud9(&self, mode: Cloud9Mode) -> bool {
        if !self.config.app_name.contains("Cloud9") {
            return false;
        }
        let codecatalyst = self.is_in_dev_env();
        match mode {
            Cloud9Mode::Classic => !codecatalyst,
            Cloud9Mode::CodeCatalyst => codecatalyst,
        }
    }

    fn is_in_dev_env(&self) -> bool {
        self.env
            .get(DEV_ENVIRONMENT_ID_ENV_KEY)
            .is_some_and(|id| !id.is_empty())
    }

    fn is_sagemaker(&self) -> bool {
        self.config.app_name.contains("SageMaker") || self.env.get(SAGEMAKER_ENV_KEY).is_some()
    }

    fn is_remote_workspace(&self) -> bool {
        self.config.remote_name.as_deref() == Some("ssh-remote")
    }

    fn is_amazon_internal_os(&self) -> bool {
        cfg!(target_os = "linux")
            && System::kernel_version().is_some_and(|release| release.contains("amzn2int"))
    }

    async fn is_cloud_desktop(&self) -> bool {
        if !self.is_amazon_internal_os() {
            return false;
        }

        let probe = Command::new(CLOUD_DESKTOP_PROBE).kill_on_drop(true).output();
        match tokio::time::timeout(CLOUD_DESKTOP_TIMEOUT, probe).await {
            Ok(Ok(output)) => output.status.success(),
            Ok(Err(e)) => {
                debug!(error = %e, "host: cloud desktop probe failed to run");
                false
            }
            Err(_) => {
                debug!("host: cloud desktop probe timed out");
                false
            }
        }
    }

    fn is_automation(&self) -> bool {
        self.env.get(AUTOMATION_ENV_KEY).is_some()
    }

    fn is_web(&self) -> bool {
        self.config.web
    }
}

/// A host whose every answer is fixed up front
#[derive(Debug)]
pub struct StaticHost {
    pub product: ProductSurface,
    pub app_name: String,
    pub host_version: String,
    pub extension_version: String,
    pub remote_name: Option<String>,
    /// `None` makes [`HostEnv::machine_id`] fail
    pub machine_id: Option<String>,
    pub platform: String,
    pub cloud9: Option<Cloud9Mode>,
    pub dev_env: bool,
    pub sagemaker: bool,
    pub remote_workspace: bool,
    pub internal_os: bool,
    pub cloud_desktop: bool,
    pub automation: bool,
    pub web: bool,
    /// Incremented by every [`HostEnv::is_cloud_desktop`] call
    pub cloud_desktop_checks: AtomicUsize,
}

impl Default for StaticHost {
    fn default() -> Self {
        Self {
            product: ProductSurface::Toolkit,
            app_name: "Visual Studio Code".to_string(),
            host_version: "1.83.0".to_string(),
            extension_version: "3.0.0".to_string(),
            remote_name: None,
            machine_id: Some("host-machine-id".to_string()),
            platform: "linux".to_string(),
            cloud9: None,
            dev_env: false,
            sagemaker: false,
            remote_workspace: false,
            internal_os: false,
            cloud_desktop: false,
            automation: false,
            web: false,
            cloud_desktop_checks: AtomicUsize::new(0),
        }
    }
}

impl StaticHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times the async cloud desktop check ran
    pub fn cloud_desktop_checks(&self) -> usize {
        self.cloud_desktop_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostEnv for StaticHost {
    fn product(&self) -> ProductSurface {
        self.product
    }

    fn app_name(&self) -> String {
        self.app_name.clone()
    }

    fn host_version(&self) -> String {
        self.host_version.clone()
    }

    fn extension_version(&self) -> String {
        self.extension_version.clone()
    }

    fn remote_name(&self) -> Option<String> {
        self.remote_name.clone()
    }

    fn machine_id(&self) -> Result<String> {
        self.machine_id
            .clone()
            .ok_or_else(|| TelemetryError::State("machine id unavailable".to_string()))
    }

    fn platform(&self) -> String {
        self.platform.clone()
    }

    fn is_cloud9(&self, mode: Cloud9Mode) -> bool {
        self.cloud9 == Some(mode)
    }

    fn is_in_dev_env(&self) -> bool {
        self.dev_env
    }

    fn is_sagemaker(&self) -> bool {
        self.sagemaker
    }

    fn is_remote_workspace(&self) -> bool {
        self.remote_workspace
    }

    fn is_amazon_internal_os(&self) -> bool {
        self.internal_os
    }

    async fn is_cloud_desktop(&self) -> bool {
        self.cloud_desktop_checks.fetch_add(1, Ordering::SeqCst);
        self.cloud_desktop
    }

    fn is_automation(&self) -> bool {
        self.automation
    }

    fn is_web(&self) -> bool {
        self.web
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryEnv;
    use tempfile::TempDir;

    fn system_host(config: HostConfig, env: MemoryEnv) -> (SystemHost, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let host = SystemHost::new(config, temp_dir.path().to_path_buf()).with_env(Arc::new(env));
        (host, temp_dir)
    }

    #[test]
    fn test_cloud9_modes() {
        let config = HostConfig {
            app_name: "AWS Cloud9".to_string(),
            ..HostConfig::default()
        };

        let (classic, _dir) = system_host(config.clone(), MemoryEnv::new());
        assert!(classic.is_cloud9(Cloud9Mode::Classic));
        assert!(!classic.is_cloud9(Cloud9Mode::CodeCatalyst));

        let (codecatalyst, _dir) = system_host(
            config,
            MemoryEnv::new().with(DEV_ENVIRONMENT_ID_ENV_KEY, "dev-env-1"),
        );
        assert!(!codecatalyst.is_cloud9(Cloud9Mode::Classic));
        assert!(codecatalyst.is_cloud9(Cloud9Mode::CodeCatalyst));
        assert!(codecatalyst.is_in_dev_env());
    }

    #[test]
    fn test_not_cloud9_in_vscode() {
        let (host, _dir) = system_host(
            HostConfig::default(),
            MemoryEnv::new().with(DEV_ENVIRONMENT_ID_ENV_KEY, "dev-env-1"),
        );
        assert!(!host.is_cloud9(Cloud9Mode::Classic));
        assert!(!host.is_cloud9(Cloud9Mode::CodeCatalyst));
    }

    #[test]
    fn test_empty_dev_env_id_is_ignored() {
        let (host, _dir) = system_host(
            HostConfig::default(),
            MemoryEnv::new().with(DEV_ENVIRONMENT_ID_ENV_KEY, ""),
        );
        assert!(!host.is_in_dev_env());
    }

    #[test]
    fn test_remote_workspace_requires_ssh_remote() {
        let (ssh, _dir) = system_host(
            HostConfig {
                remote_name: Some("ssh-remote".to_string()),
                ..HostConfig::default()
            },
            MemoryEnv::new(),
        );
        assert!(ssh.is_remote_workspace());

        let (wsl, _dir) = system_host(
            HostConfig {
                remote_name: Some("wsl".to_string()),
                ..HostConfig::default()
            },
            MemoryEnv::new(),
        );
        assert!(!wsl.is_remote_workspace());
    }

    #[test]
    fn test_automation_and_sagemaker_from_env() {
        let (host, _dir) = system_host(
            HostConfig::default(),
            MemoryEnv::new()
                .with(AUTOMATION_ENV_KEY, "1")
                .with(SAGEMAKER_ENV_KEY, "JupyterLab"),
        );
        assert!(host.is_automation());
        assert!(host.is_sagemaker());

        let (plain, _dir) = system_host(HostConfig::default(), MemoryEnv::new());
        assert!(!plain.is_automation());
        assert!(!plain.is_sagemaker());
    }

    #[test]
    fn test_system_host_machine_id_is_stable() {
        let (host, _dir) = system_host(HostConfig::default(), MemoryEnv::new());
        let first = host.machine_id().unwrap();
        assert_eq!(first, host.machine_id().unwrap());
    }

    #[test]
    fn test_current_platform_vocabulary() {
        let platform = current_platform();
        assert_ne!(platform, "macos");
        assert_ne!(platform, "windows");
        assert!(!platform.is_empty());
    }

    #[tokio::test]
    async fn test_static_host_counts_cloud_desktop_checks() {
        let host = StaticHost {
            cloud_desktop: true,
            ..StaticHost::default()
        };
        assert_eq!(host.cloud_desktop_checks(), 0);
        assert!(host.is_cloud_desktop().await);
        assert_eq!(host.cloud_desktop_checks(), 1);
    }

    #[test]
    fn test_static_host_machine_id_failure() {
        let host = StaticHost {
            machine_id: None,
            ..StaticHost::default()
        };
        assert!(host.machine_id().is_err());
    }
}
