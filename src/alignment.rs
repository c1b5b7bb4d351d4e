use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::{as_bool, first_present, number_at, paths, text_at};

/// Boresight error above this many degrees means the dish is mispointed.
pub const BORESIGHT_LIMIT_DEG: f64 = 2.5;
/// Obstruction fraction above this is reported as HIGH.
pub const OBSTRUCTION_HIGH: f64 = 0.10;
/// Obstruction fraction above this is reported as MED.
pub const OBSTRUCTION_MED: f64 = 0.02;

const OK_STATES: &[&str] = &["ONLINE", "CONNECTED"];

/// States the terminal reports while it is not serving traffic. Any other
/// unrecognized state is treated the same way.
pub const BAD_STATES: &[&str] = &[
    "STOWED",
    "STOWING",
    "UNSTOWING",
    "BOOTING",
    "STARTING",
    "CALIBRATING",
    "SEARCHING",
    "NO_SATS",
    "IDLE",
];

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Aligned,
    NotOk,
    Unknown,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AlignmentVerdict {
    pub aligned: bool,
    pub verdict: Verdict,
    pub explain: String,
    pub dish_state: Option<String>,
    pub boresight_error_deg: Option<f64>,
    pub obstruction_fraction: Option<f64>,
    pub currently_obstructed: Option<bool>,
    pub reasons: Vec<String>,
}

/// Accumulates failed rules. Once the verdict leaves ALIGNED it never comes back.
struct Rules {
    verdict: Verdict,
    reasons: Vec<String>,
}

impl Rules {
    fn fail(&mut self, reason: String) {
        if self.verdict == Verdict::Aligned {
            self.verdict = Verdict::NotOk;
        }
        self.reasons.push(reason);
    }
}

/// Classify the raw status payload. Pure and total: missing or malformed
/// fields degrade the verdict to UNKNOWN, they never error.
pub fn classify(raw: &Value) -> AlignmentVerdict {
    let dish_state = text_at(raw, paths::DISH_STATE);

    let mut rules = match dish_state.as_deref().map(str::to_uppercase) {
        Some(state) if OK_STATES.contains(&state.as_str()) => Rules {
            verdict: Verdict::Aligned,
            reasons: Vec::new(),
        },
        // Known-bad and unrecognized states are both NOT_OK.
        Some(state) => {
            if !BAD_STATES.contains(&state.as_str()) {
                log::debug!("[ALIGN] unrecognized dish state {:?}", state);
            }
            Rules {
                verdict: Verdict::NotOk,
                reasons: vec![format!("state={}", state)],
            }
        }
        None => Rules {
            verdict: Verdict::Unknown,
            reasons: vec!["state=unknown".to_string()],
        },
    };

    let boresight_error_deg = number_at(raw, paths::BORESIGHT_ERROR_DEG);
    if let Some(deg) = boresight_error_deg {
        if deg > BORESIGHT_LIMIT_DEG {
            rules.fail(format!("boresight>2.5deg ({:.2}°)", deg));
        }
    }

    let currently_obstructed = first_present(raw, paths::CURRENTLY_OBSTRUCTED).and_then(as_bool);
    if currently_obstructed == Some(true) {
        rules.fail("currently_obstructed=true".to_string());
    }

    let obstruction_fraction = number_at(raw, paths::OBSTRUCTION_FRACTION);
    if let Some(fraction) = obstruction_fraction {
        if fraction > OBSTRUCTION_HIGH {
            rules.fail(format!("obstruction=HIGH ({:.3})", fraction));
        } else if fraction > OBSTRUCTION_MED {
            rules.fail(format!("obstruction=MED ({:.3})", fraction));
        }
    }

    let aligned = rules.verdict == Verdict::Aligned;
    let explain = if aligned {
        "OK".to_string()
    } else if rules.reasons.is_empty() {
        "Not okay".to_string()
    } else {
        rules.reasons.join("; ")
    };

    AlignmentVerdict {
        aligned,
        verdict: rules.verdict,
        explain,
        dish_state,
        boresight_error_deg,
        obstruction_fraction,
        currently_obstructed,
        reasons: rules.reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connected_without_readings_is_aligned() {
        let result = classify(&json!({"state": "CONNECTED"}));
        assert!(result.aligned);
        assert_eq!(result.verdict, Verdict::Aligned);
        assert_eq!(result.explain, "OK");
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn test_lowercase_online_is_aligned() {
        let result = classify(&json!({"dish_state": "online"}));
        assert_eq!(result.verdict, Verdict::Aligned);
        assert_eq!(result.dish_state.as_deref(), Some("online"));
    }

    #[test]
    fn test_missing_state_is_unknown() {
        for raw in [
            json!({}),
            json!({"status": {}}),
            json!({"dish_state": ""}),
            json!({"obstruction_fraction": 0.5, "currently_obstructed": true}),
            json!("not even an object"),
        ] {
            let result = classify(&raw);
            assert_eq!(result.verdict, Verdict::Unknown, "payload {raw}");
            assert!(!result.aligned);
            assert_eq!(result.reasons[0], "state=unknown");
        }
    }

    #[test]
    fn test_unknown_still_lists_failed_rules() {
        let result = classify(&json!({"obstruction_fraction": 0.5, "currently_obstructed": true}));
        assert_eq!(
            result.reasons,
            vec!["state=unknown", "currently_obstructed=true", "obstruction=HIGH (0.500)"]
        );
        assert_eq!(
            result.explain,
            "state=unknown; currently_obstructed=true; obstruction=HIGH (0.500)"
        );
    }

    #[test]
    fn test_bad_and_unrecognized_states() {
        let result = classify(&json!({"state": "searching"}));
        assert_eq!(result.verdict, Verdict::NotOk);
        assert_eq!(result.reasons, vec!["state=SEARCHING"]);

        let result = classify(&json!({"status": {"dish_state": "WARMING_UP"}}));
        assert_eq!(result.verdict, Verdict::NotOk);
        assert_eq!(result.explain, "state=WARMING_UP");
    }

    #[test]
    fn test_boresight_boundary() {
        let at_limit = classify(&json!({"state": "ONLINE", "boresight_error_deg": 2.5}));
        assert_eq!(at_limit.verdict, Verdict::Aligned);
        assert_eq!(at_limit.boresight_error_deg, Some(2.5));

        let over = classify(&json!({"state": "ONLINE", "pointing": {"boresight_error_deg": 2.5001}}));
        assert_eq!(over.verdict, Verdict::NotOk);
        assert_eq!(over.reasons, vec!["boresight>2.5deg (2.50°)"]);
    }

    #[test]
    fn test_non_numeric_boresight_is_ignored() {
        let result = classify(&json!({"state": "ONLINE", "boresight_error_deg": "tilted"}));
        assert_eq!(result.verdict, Verdict::Aligned);
        assert_eq!(result.boresight_error_deg, None);
    }

    #[test]
    fn test_obstruction_boundaries() {
        let cases = [
            (0.02, Verdict::Aligned, None),
            (0.0201, Verdict::NotOk, Some("obstruction=MED (0.020)")),
            (0.10, Verdict::NotOk, Some("obstruction=MED (0.100)")),
            (0.1001, Verdict::NotOk, Some("obstruction=HIGH (0.100)")),
        ];
        for (fraction, verdict, reason) in cases {
            let result = classify(&json!({"state": "CONNECTED", "obstruction_fraction": fraction}));
            assert_eq!(result.verdict, verdict, "fraction {fraction}");
            assert_eq!(result.reasons.first().map(String::as_str), reason);
            assert_eq!(result.obstruction_fraction, Some(fraction));
        }
    }

    #[test]
    fn test_zero_fraction_is_recorded() {
        let result = classify(&json!({
            "state": "CONNECTED",
            "obstruction_fraction": 0.0,
            "obstruction_stats": {"fraction_obstructed": 0.5}
        }));
        assert_eq!(result.verdict, Verdict::Aligned);
        assert_eq!(result.obstruction_fraction, Some(0.0));
    }

    #[test]
    fn test_currently_obstructed() {
        let result = classify(&json!({
            "state": "CONNECTED",
            "obstruction_stats": {"currently_obstructed": true}
        }));
        assert_eq!(result.verdict, Verdict::NotOk);
        assert_eq!(result.currently_obstructed, Some(true));
        assert_eq!(result.reasons, vec!["currently_obstructed=true"]);

        let clear = classify(&json!({"state": "CONNECTED", "currently_obstructed": false}));
        assert_eq!(clear.verdict, Verdict::Aligned);
        assert_eq!(clear.currently_obstructed, Some(false));
    }

    #[test]
    fn test_later_rules_never_restore_alignment() {
        let result = classify(&json!({
            "state": "STOWED",
            "boresight_error_deg": 0.1,
            "currently_obstructed": false,
            "obstruction_fraction": 0.0,
        }));
        assert_eq!(result.verdict, Verdict::NotOk);
        assert!(!result.aligned);
        assert_eq!(result.reasons, vec!["state=STOWED"]);
    }

    #[test]
    fn test_every_failed_rule_is_reported_in_order() {
        let result = classify(&json!({
            "state": "ONLINE",
            "alignment_stats": {"boresight_error_deg": 4.123},
            "currently_obstructed": true,
            "obstruction_stats": {"obstruction_fraction": 0.05},
        }));
        assert_eq!(
            result.explain,
            "boresight>2.5deg (4.12°); currently_obstructed=true; obstruction=MED (0.050)"
        );
    }

    #[test]
    fn test_verdict_wire_names() {
        let value = serde_json::to_value(classify(&json!({"state": "IDLE"}))).unwrap();
        assert_eq!(value["verdict"], "NOT_OK");
        assert_eq!(value["aligned"], false);
        assert_eq!(serde_json::to_value(Verdict::Aligned).unwrap(), "ALIGNED");
        assert_eq!(serde_json::to_value(Verdict::Unknown).unwrap(), "UNKNOWN");
    }
}
