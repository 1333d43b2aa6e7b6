//! Compute environment classification and related telemetry enums

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::host::{Cloud9Mode, HostEnv};

/// Every environment the extension can run in
///
/// Environments internal to Amazon carry an `-amzn` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvType {
    #[serde(rename = "cloud9")]
    Cloud9,
    #[serde(rename = "cloud9-codecatalyst")]
    Cloud9CodeCatalyst,
    #[serde(rename = "cloudDesktop-amzn")]
    CloudDesktopAmzn,
    #[serde(rename = "codecatalyst")]
    CodeCatalyst,
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "ec2")]
    Ec2,
    /// EC2 with an internal Amazon OS
    #[serde(rename = "ec2-amzn")]
    Ec2Amzn,
    #[serde(rename = "sagemaker")]
    SageMaker,
    #[serde(rename = "test")]
    Test,
    #[serde(rename = "wsl")]
    Wsl,
    #[serde(rename = "unknown")]
    Unknown,
}

impl EnvType {
    pub fn as_str(&self) -> &str {
        match self {
            EnvType::Cloud9 => "cloud9",
            EnvType::Cloud9CodeCatalyst => "cloud9-codecatalyst",
            EnvType::CloudDesktopAmzn => "cloudDesktop-amzn",
            EnvType::CodeCatalyst => "codecatalyst",
            EnvType::Local => "local",
            EnvType::Ec2 => "ec2",
            EnvType::Ec2Amzn => "ec2-amzn",
            EnvType::SageMaker => "sagemaker",
            EnvType::Test => "test",
            EnvType::Wsl => "wsl",
            EnvType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EnvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identify the environment the extension is running in.
///
/// The checks overlap (a dev environment is also a remote workspace), so the
/// first match wins and the order must not change.
pub async fn get_compute_env_type(host: &dyn HostEnv) -> EnvType {
    let remote_name = host.remote_name();

    if host.is_cloud9(Cloud9Mode::Classic) {
        EnvType::Cloud9
    } else if host.is_cloud9(Cloud9Mode::CodeCatalyst) {
        EnvType::Cloud9CodeCatalyst
    } else if host.is_in_dev_env() {
        EnvType::CodeCatalyst
    } else if host.is_sagemaker() {
        EnvType::SageMaker
    } else if host.is_remote_workspace() {
        if host.is_amazon_internal_os() {
            if host.is_cloud_desktop().await {
                return EnvType::CloudDesktopAmzn;
            }
            return EnvType::Ec2Amzn;
        }
        EnvType::Ec2
    } else if remote_name.as_deref().is_some_and(|name| !name.is_empty()) {
        EnvType::Wsl
    } else if host.is_automation() {
        EnvType::Test
    } else if remote_name.as_deref().map_or(true, str::is_empty) {
        EnvType::Local
    } else {
        EnvType::Unknown
    }
}

/// Operating system values accepted by the CodeWhisperer telemetry API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperatingSystem {
    Mac,
    Windows,
    Linux,
}

impl OperatingSystem {
    /// Map a `darwin` / `win32` / ... platform id; anything else is Linux.
    pub fn from_platform(platform: &str) -> Self {
        match platform {
            "darwin" => OperatingSystem::Mac,
            "win32" => OperatingSystem::Windows,
            _ => OperatingSystem::Linux,
        }
    }

    /// The operating system the host reports.
    pub fn from_host(host: &dyn HostEnv) -> Self {
        Self::from_platform(&host.platform())
    }

    pub fn as_str(&self) -> &str {
        match self {
            OperatingSystem::Mac => "MAC",
            OperatingSystem::Windows => "WINDOWS",
            OperatingSystem::Linux => "LINUX",
        }
    }
}

/// Opt-out preference values accepted by the CodeWhisperer telemetry API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptOutPreference {
    OptIn,
    OptOut,
}

impl OptOutPreference {
    pub fn from_enabled(telemetry_enabled: bool) -> Self {
        if telemetry_enabled {
            OptOutPreference::OptIn
        } else {
            OptOutPreference::OptOut
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OptOutPreference::OptIn => "OPTIN",
            OptOutPreference::OptOut => "OPTOUT",
        }
    }
}

/// Values for the `source` field of startup metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtStartUpSource {
    FirstStartUp,
    Update,
    Reload,
    None,
}

impl ExtStartUpSource {
    pub fn as_str(&self) -> &str {
        match self {
            ExtStartUpSource::FirstStartUp => "firstStartUp",
            ExtStartUpSource::Update => "update",
            ExtStartUpSource::Reload => "reload",
            ExtStartUpSource::None => "none",
        }
    }
}
