//! Metric records and shape validation
//!
//! Every emitted metric must carry a `result` property, and a `reason`
//! property when `result` is `Failed`. Metrics on the exemption list and
//! metrics without metadata are not checked.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::error::{Result, TelemetryError};

/// `result` value marking a failed operation
pub const RESULT_FAILED: &str = "Failed";

const TELEMETRY_RUN_DOCS: &str = " Consider using `.run()` instead of `.emit()`, which will set these properties automatically. \
See https://github.com/aws/aws-toolkit-vscode/blob/master/docs/telemetry.md#guidelines";

/// Metrics allowed to omit `result`/`reason`
pub const VALIDATION_EXEMPT_METRICS: &[&str] = &[
    "amazonq_enterFocusConversation",
    "amazonq_exitFocusConversation",
    "amazonq_startConversation",
    "codewhisperer_clientComponentLatency",
    "codewhisperer_serviceInvocation",
    "codewhisperer_userDecision",
    "codewhisperer_userTriggerDecision",
    "function_call",
    "ide_editCodeFile",
    "session_start",
    "session_end",
];

pub fn is_validation_exempt_metric(metric_name: &str) -> bool {
    VALIDATION_EXEMPT_METRICS.contains(&metric_name)
}

/// One key/value pair of metric metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetadataEntry {
    pub key: Option<String>,
    pub value: Option<String>,
}

/// A metric as sent to the client telemetry service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDatum {
    pub metric_name: String,
    /// Milliseconds since the Unix epoch
    pub epoch_timestamp: i64,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default = "default_value")]
    pub value: f64,
    #[serde(default)]
    pub passive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<MetadataEntry>>,
}

fn default_unit() -> String {
    "None".to_string()
}

fn default_value() -> f64 {
    1.0
}

impl MetricDatum {
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            epoch_timestamp: Utc::now().timestamp_millis(),
            unit: default_unit(),
            value: default_value(),
            passive: false,
            metadata: None,
        }
    }

    /// Append a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(Vec::new)
            .push(MetadataEntry {
                key: Some(key.into()),
                value: Some(value.into()),
            });
        self
    }
}

/// Flatten metadata entries into a map, dropping `exclude`d keys and
/// entries without a key or value. Later entries win.
pub fn map_metadata(entries: &[MetadataEntry], exclude: &[&str]) -> HashMap<String, String> {
    entries
        .iter()
        .filter_map(|entry| match (&entry.key, &entry.value) {
            (Some(key), Some(value)) if !exclude.contains(&key.as_str()) => {
                Some((key.clone(), value.clone()))
            }
            _ => None,
        })
        .collect()
}

/// Check that a metric carries `result`, and `reason` on failure.
///
/// A violation is returned as [`TelemetryError::InvalidMetric`] when `fatal`,
/// and logged as a warning otherwise.
pub fn validate_metric_event(event: &MetricDatum, fatal: bool) -> Result<()> {
    if is_validation_exempt_metric(&event.metric_name) {
        return Ok(());
    }
    let Some(entries) = &event.metadata else {
        return Ok(());
    };

    let metadata = map_metadata(entries, &[]);
    let mut msg = String::from("telemetry: invalid Metric: ");

    match metadata.get("result").map(String::as_str) {
        None => msg.push_str(&format!(
            "\"{}\" emitted without the `result` property, which is always required.",
            event.metric_name
        )),
        Some(RESULT_FAILED) if !metadata.contains_key("reason") => msg.push_str(&format!(
            "\"{}\" emitted with result=Failed but without the `reason` property.",
            event.metric_name
        )),
        Some(_) => return Ok(()),
    }

    msg.push_str(TELEMETRY_RUN_DOCS);
    if fatal {
        return Err(TelemetryError::InvalidMetric {
            metric: event.metric_name.clone(),
            message: msg,
        });
    }
    warn!(metric = %event.metric_name, "{}", msg);
    Ok(())
}
