//! The host context the telemetry helpers run against

use std::sync::Arc;

use crate::client_id::{ClientIdCache, ClientIdContext};
use crate::config::TelemetryConfig;
use crate::environment::{get_compute_env_type, EnvType, OperatingSystem, OptOutPreference};
use crate::host::HostEnv;
use crate::state::{EnvVars, GlobalState};
use crate::user_agent::{get_user_agent, UserAgentOptions};

/// Host, settings, persisted state and environment bundled together
///
/// Each context owns its client id cache, so two contexts never share a
/// memoized id.
pub struct TelemetryContext {
    host: Arc<dyn HostEnv>,
    config: TelemetryConfig,
    state: Arc<dyn GlobalState>,
    env: Arc<dyn EnvVars>,
    client_ids: ClientIdCache,
}

impl TelemetryContext {
    pub fn new(
        host: Arc<dyn HostEnv>,
        config: TelemetryConfig,
        state: Arc<dyn GlobalState>,
        env: Arc<dyn EnvVars>,
    ) -> Self {
        Self {
            host,
            config,
            state,
            env,
            client_ids: ClientIdCache::new(),
        }
    }

    pub fn host(&self) -> &dyn HostEnv {
        self.host.as_ref()
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn state(&self) -> &dyn GlobalState {
        self.state.as_ref()
    }

    fn client_id_context(&self) -> ClientIdContext<'_> {
        ClientIdContext {
            host: self.host.as_ref(),
            state: self.state.as_ref(),
            env: self.env.as_ref(),
        }
    }

    /// The memoized client id for the current telemetry setting
    pub fn client_id(&self) -> String {
        self.client_id_with(self.config.is_enabled(), None)
    }

    /// The memoized client id for explicit inputs
    pub fn client_id_with(&self, telemetry_enabled: bool, is_test: Option<bool>) -> String {
        self.client_ids
            .get_or_resolve(&self.client_id_context(), telemetry_enabled, is_test)
    }

    /// Drop memoized client ids
    pub fn reset_client_id(&self) {
        self.client_ids.reset();
    }

    pub fn user_agent(&self, options: UserAgentOptions) -> String {
        get_user_agent(self.host.as_ref(), options, || self.client_id())
    }

    pub async fn compute_env_type(&self) -> EnvType {
        get_compute_env_type(self.host.as_ref()).await
    }

    pub fn operating_system(&self) -> OperatingSystem {
        OperatingSystem::from_host(self.host.as_ref())
    }

    pub fn opt_out_preference(&self) -> OptOutPreference {
        OptOutPreference::from_enabled(self.config.is_enabled())
    }

    /// Startup hook: run one-time settings migrations.
    pub async fn initialize(&self) -> crate::Result<()> {
        self.config.init_amazon_q_setting(self.state.as_ref()).await
    }
}
