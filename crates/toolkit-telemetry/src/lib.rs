//! # Toolkit Telemetry
//!
//! Identity and environment helpers for the telemetry subsystem of an editor
//! extension that hosts two products (AWS Toolkit and Amazon Q).
//!
//! ## What's Here
//!
//! - **Client id**: a stable per-installation id with fixed sentinels for
//!   test runs, disabled telemetry and resolution failures
//! - **User agent**: product, platform and client id segments
//! - **Environment**: which deployment (local, WSL, EC2, Cloud9, ...) the
//!   extension runs in
//! - **Metric validation**: `result`/`reason` rules for emitted metrics
//! - **Call tracing**: wrap a function so calls are recorded on the tracer's
//!   function stack
//! - **Config**: the per-product telemetry flag, including legacy
//!   `"Enable"`/`"Disable"` values and the one-time Amazon Q migration
//!
//! Everything stateful (settings, persisted state, environment variables,
//! host checks) is reached through the traits in [`settings`], [`state`] and
//! [`host`], so the helpers run the same against a live host or in-memory
//! doubles.
//!
//! ## Opt-Out
//!
//! ```toml
//! # settings.toml
//! [aws]
//! telemetry = false
//!
//! [amazonQ]
//! telemetry = false
//! ```
//!
//! `TOOLKIT_TELEMETRY_DISABLED=1` or `DO_NOT_TRACK=1` also disables telemetry
//! for the CLI.

pub mod client_id;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod host;
pub mod machine_id;
pub mod metrics;
pub mod settings;
pub mod state;
pub mod tracer;
pub mod user_agent;

pub use client_id::{
    resolve_client_id, ClientIdCache, ClientIdContext, DISABLED_CLIENT_ID, ERROR_CLIENT_ID,
    TEST_CLIENT_ID,
};
pub use config::{HostConfig, ProductSurface, TelemetryConfig};
pub use context::TelemetryContext;
pub use environment::{
    get_compute_env_type, EnvType, ExtStartUpSource, OperatingSystem, OptOutPreference,
};
pub use error::{Result, TelemetryError};
pub use host::{Cloud9Mode, HostEnv, StaticHost, SystemHost};
pub use metrics::{validate_metric_event, MetadataEntry, MetricDatum};
pub use settings::{convert_legacy, MemorySettings, SettingsStore, TomlSettings};
pub use state::{EnvVars, FileState, GlobalState, MemoryEnv, MemoryState, ProcessEnv};
pub use tracer::{with_telemetry_context, FunctionEntry, FunctionTracer, SpanOptions, SpanRunner};
pub use user_agent::{get_user_agent, platform_pair, UserAgentOptions};
