//! Lookups into loosely structured status payloads.
//!
//! Dish clients of different vintages name the same reading differently, so
//! every logical field is described by an ordered list of key paths. The
//! first path that resolves to a present value wins, and a present value is
//! any non-null JSON value: `0`, `false` and `""` all count.

use serde_json::Value;

/// A path of object keys from the payload root, e.g. `["obstruction_stats", "fraction_obstructed"]`.
pub type KeyPath = &'static [&'static str];

/// Follow `path` through nested objects.
pub fn resolve<'a>(payload: &'a Value, path: KeyPath) -> Option<&'a Value> {
    let mut current = payload;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Value at the first alternative that resolves. Later alternatives are not
/// consulted once one is present, even if its value turns out to be unusable.
pub fn first_present<'a>(payload: &'a Value, alternatives: &[KeyPath]) -> Option<&'a Value> {
    alternatives.iter().find_map(|path| resolve(payload, path))
}

/// Numeric reading: JSON numbers and numeric strings. Non-finite values are rejected.
pub fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

pub fn as_bool(value: &Value) -> Option<bool> {
    value.as_bool()
}

/// Textual reading. Scalars are rendered, containers are not text.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn number_at(payload: &Value, alternatives: &[KeyPath]) -> Option<f64> {
    first_present(payload, alternatives).and_then(as_number)
}

/// Non-blank text at the first present alternative.
pub fn text_at(payload: &Value, alternatives: &[KeyPath]) -> Option<String> {
    first_present(payload, alternatives)
        .and_then(as_text)
        .filter(|s| !s.trim().is_empty())
}

/// Known spellings of the fields shared by the normalizer and the classifier.
pub mod paths {
    use super::KeyPath;

    pub const DISH_STATE: &[KeyPath] = &[
        &["dish_state"],
        &["state"],
        &["status", "dish_state"],
        &["deviceState", "state"],
    ];

    pub const OBSTRUCTION_FRACTION: &[KeyPath] = &[
        &["obstruction_fraction"],
        &["obstruction_stats", "fraction_obstructed"],
        &["obstruction_stats", "obstruction_fraction"],
        &["obstructionStats", "fractionObstructed"],
    ];

    pub const BORESIGHT_ERROR_DEG: &[KeyPath] = &[
        &["boresight_error_deg"],
        &["alignment_stats", "boresight_error_deg"],
        &["pointing_stats", "boresight_error_deg"],
        &["pointing", "boresight_error_deg"],
        &["alignmentStats", "boresightErrorDeg"],
    ];

    pub const CURRENTLY_OBSTRUCTED: &[KeyPath] = &[
        &["currently_obstructed"],
        &["obstruction_stats", "currently_obstructed"],
        &["obstructionStats", "currentlyObstructed"],
    ];

    pub const POP_PING_LATENCY_MS: &[KeyPath] = &[
        &["pop_ping_latency_ms"],
        &["ping_latency_ms"],
        &["popPingLatencyMs"],
    ];

    pub const POP_PING_DROP_RATE: &[KeyPath] = &[&["pop_ping_drop_rate"], &["popPingDropRate"]];

    pub const DOWNLINK_THROUGHPUT_BPS: &[KeyPath] = &[
        &["downlink_throughput_bps"],
        &["download_throughput_bps"],
        &["downlinkThroughputBps"],
    ];

    pub const UPLINK_THROUGHPUT_BPS: &[KeyPath] = &[
        &["uplink_throughput_bps"],
        &["upload_throughput_bps"],
        &["uplinkThroughputBps"],
    ];

    pub const SECONDS_SINCE_LAST_1S_OUTAGE: &[KeyPath] = &[&["seconds_since_last_1s_outage"]];
    pub const SECONDS_SINCE_LAST_2S_OUTAGE: &[KeyPath] = &[&["seconds_since_last_2s_outage"]];
    pub const SECONDS_SINCE_LAST_5S_OUTAGE: &[KeyPath] = &[&["seconds_since_last_5s_outage"]];
}
