use std::collections::{BTreeMap, HashMap};

use tracing::info;

use crate::core::ports::TelemetrySink;

/// Round lifecycle events (`round_submitted`, `ratings_saved`, ...) as
/// structured `info` records under the `evalbench::telemetry` target.
#[derive(Debug, Default)]
pub struct TracingTelemetrySink;

impl TracingTelemetrySink {
    pub fn new() -> Self {
        Self
    }
}

impl TelemetrySink for TracingTelemetrySink {
    fn record_event(&self, event_name: &str, properties: HashMap<String, String>) {
        let round_id = properties.get("round_id").map(String::as_str).unwrap_or("-");
        info!(
            target: "evalbench::telemetry",
            event = event_name,
            round_id,
            details = %render_properties(&properties),
        );
    }
}

/// `key=value` pairs in key order, skipping `round_id` which gets its own field.
fn render_properties(properties: &HashMap<String, String>) -> String {
    properties
        .iter()
        .filter(|(key, _)| key.as_str() != "round_id")
        .collect::<BTreeMap<_, _>>()
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}
