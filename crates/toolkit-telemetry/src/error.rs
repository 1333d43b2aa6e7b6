//! Error types for telemetry helpers

use thiserror::Error;

/// Errors raised by the telemetry helpers.
///
/// Most operations in this crate degrade instead of failing; these variants
/// cover the paths that are expected to surface to the caller.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A telemetry setting holds neither a boolean nor a legacy string value
    #[error("Unknown telemetry setting: {value}")]
    InvalidSetting { value: String },

    /// A metric failed shape validation
    #[error("{message}")]
    InvalidMetric { metric: String, message: String },

    /// Persisted state could not be read or written
    #[error("state error: {0}")]
    State(String),

    /// The process environment rejected a read or write
    #[error("environment error: {0}")]
    Env(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("failed to parse TOML: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("failed to write TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
