use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::{number_at, paths, text_at};

/// The handful of link-quality readings the dashboard plots, pulled out of
/// whatever shape the dish client returned. Rebuilt on every poll.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct NormalizedSummary {
    pub dish_state: Option<String>,
    pub pop_ping_latency_ms: Option<f64>,
    pub pop_ping_drop_rate: Option<f64>,
    pub downlink_throughput_bps: Option<f64>,
    pub uplink_throughput_bps: Option<f64>,
    pub obstruction_fraction: Option<f64>,
    pub seconds_since_last_1s_outage: Option<f64>,
    pub seconds_since_last_2s_outage: Option<f64>,
    pub seconds_since_last_5s_outage: Option<f64>,
}

impl NormalizedSummary {
    /// Never fails: anything missing or malformed is left as `None`.
    pub fn from_payload(raw: &Value) -> Self {
        Self {
            dish_state: text_at(raw, paths::DISH_STATE),
            pop_ping_latency_ms: number_at(raw, paths::POP_PING_LATENCY_MS),
            pop_ping_drop_rate: number_at(raw, paths::POP_PING_DROP_RATE),
            downlink_throughput_bps: number_at(raw, paths::DOWNLINK_THROUGHPUT_BPS),
            uplink_throughput_bps: number_at(raw, paths::UPLINK_THROUGHPUT_BPS),
            obstruction_fraction: number_at(raw, paths::OBSTRUCTION_FRACTION),
            seconds_since_last_1s_outage: number_at(raw, paths::SECONDS_SINCE_LAST_1S_OUTAGE),
            seconds_since_last_2s_outage: number_at(raw, paths::SECONDS_SINCE_LAST_2S_OUTAGE),
            seconds_since_last_5s_outage: number_at(raw, paths::SECONDS_SINCE_LAST_5S_OUTAGE),
        }
    }
}
