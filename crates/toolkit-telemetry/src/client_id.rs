//! Client id resolution
//!
//! The client id identifies one installation across sessions. Resolution
//! follows a fixed precedence and never fails:
//!
//! 1. Under test automation, [`TEST_CLIENT_ID`].
//! 2. With telemetry disabled, [`DISABLED_CLIENT_ID`].
//! 3. In web mode: the persisted id, else the host machine id.
//! 4. Otherwise: the `__TELEMETRY_CLIENT_ID` environment variable, else the
//!    persisted id, else a random UUID. The result is written back to the
//!    environment variable when it was absent, so other extensions in the same
//!    host converge on it.
//!
//! The resolved id is always written back to persisted state. Any failure
//! yields [`ERROR_CLIENT_ID`].

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::Result;
use crate::host::HostEnv;
use crate::state::{EnvVars, GlobalState, CLIENT_ID_ENV_KEY, CLIENT_ID_STATE_KEY};

/// Client id reported under test automation
pub const TEST_CLIENT_ID: &str = "ffffffff-ffff-ffff-ffff-ffffffffffff";

/// Client id reported when telemetry is disabled
pub const DISABLED_CLIENT_ID: &str = "11111111-1111-1111-1111-111111111111";

/// Client id reported when resolution failed
pub const ERROR_CLIENT_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Everything client id resolution reads from or writes to
#[derive(Clone, Copy)]
pub struct ClientIdContext<'a> {
    pub host: &'a dyn HostEnv,
    pub state: &'a dyn GlobalState,
    pub env: &'a dyn EnvVars,
}

/// Resolve the client id without memoization.
///
/// `is_test` overrides the host's automation check when given.
pub fn resolve_client_id(
    ctx: &ClientIdContext<'_>,
    telemetry_enabled: bool,
    is_test: Option<bool>,
) -> String {
    if is_test.unwrap_or_else(|| ctx.host.is_automation()) {
        return TEST_CLIENT_ID.to_string();
    }
    if !telemetry_enabled {
        return DISABLED_CLIENT_ID.to_string();
    }

    match try_resolve_client_id(ctx) {
        Ok(client_id) => client_id,
        Err(e) => {
            error!(error = %e, "getClientId: failed to create client id");
            ERROR_CLIENT_ID.to_string()
        }
    }
}

fn try_resolve_client_id(ctx: &ClientIdContext<'_>) -> Result<String> {
    let local_client_id = ctx.state.try_get_string(CLIENT_ID_STATE_KEY);

    let client_id = if ctx.host.is_web() {
        // Web mode never touches the environment variable slot
        let client_id = match &local_client_id {
            Some(id) => id.clone(),
            None => ctx.host.machine_id()?,
        };
        debug!(
            client_id = %client_id,
            stored = ?local_client_id,
            "getClientId: web mode determined clientId"
        );
        client_id
    } else {
        let global_client_id = ctx.env.get(CLIENT_ID_ENV_KEY);
        let client_id = global_client_id
            .clone()
            .or_else(|| local_client_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        debug!(
            client_id = %client_id,
            env = ?global_client_id,
            stored = ?local_client_id,
            "getClientId: determined clientId"
        );

        if global_client_id.as_deref().map_or(true, str::is_empty) {
            debug!(client_id = %client_id, "getClientId: setting clientId in process env");
            ctx.env.set(CLIENT_ID_ENV_KEY, &client_id)?;
        }
        client_id
    };

    ctx.state
        .try_update(CLIENT_ID_STATE_KEY, Value::String(client_id.clone()));
    Ok(client_id)
}

/// Memoized client ids, keyed by the resolution inputs
///
/// One cache per [`TelemetryContext`](crate::context::TelemetryContext), which
/// lives as long as the extension host. Tests create their own cache or
/// [`reset`](ClientIdCache::reset) it.
#[derive(Debug, Default)]
pub struct ClientIdCache {
    resolved: Mutex<HashMap<(bool, Option<bool>), String>>,
}

impl ClientIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized id for these inputs, resolving it on first use.
    pub fn get_or_resolve(
        &self,
        ctx: &ClientIdContext<'_>,
        telemetry_enabled: bool,
        is_test: Option<bool>,
    ) -> String {
        let mut resolved = self.resolved.lock();
        resolved
            .entry((telemetry_enabled, is_test))
            .or_insert_with(|| resolve_client_id(ctx, telemetry_enabled, is_test))
            .clone()
    }

    pub fn reset(&self) {
        self.resolved.lock().clear();
    }
}
