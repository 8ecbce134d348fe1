//! Scorer stdout parsing.
//!
//! A scorer may print anything. The score document is the last non-empty
//! stdout line that parses as a JSON object with a `metrics` and/or an
//! `artifacts` key:
//!
//! ```text
//! {"metrics": {"combined_score": 0.82, "runtime_ms": 12.5}, "artifacts": {"log": "..."}}
//! ```

use std::collections::BTreeMap;

use evolve_core::MetricValue;
use serde_json::Value;
use tracing::debug;

/// Metrics and artifacts extracted from scorer output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreDocument {
    pub metrics: BTreeMap<String, MetricValue>,
    pub artifacts: BTreeMap<String, Vec<u8>>,
}

/// Find and decode the score document in `stdout`.
///
/// Returns an empty document when no line qualifies.
pub fn parse_score_document(stdout: &str) -> ScoreDocument {
    let found = stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(|line| match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(obj)) if obj.contains_key("metrics") || obj.contains_key("artifacts") => {
                Some(obj)
            }
            _ => None,
        });

    let Some(mut obj) = found else {
        debug!("scorer printed no score document");
        return ScoreDocument::default();
    };

    ScoreDocument {
        metrics: obj.remove("metrics").map(decode_metrics).unwrap_or_default(),
        artifacts: obj
            .remove("artifacts")
            .map(decode_artifacts)
            .unwrap_or_default(),
    }
}

fn decode_metrics(value: Value) -> BTreeMap<String, MetricValue> {
    let Value::Object(map) = value else {
        debug!("ignoring non-object metrics");
        return BTreeMap::new();
    };

    map.into_iter()
        .filter_map(|(name, value)| match value {
            Value::Number(n) => n.as_f64().map(|f| (name, MetricValue::Number(f))),
            Value::String(s) => Some((name, MetricValue::Text(s))),
            other => {
                debug!(metric = %name, value = %other, "ignoring metric that is neither number nor string");
                None
            }
        })
        .collect()
}

fn decode_artifacts(value: Value) -> BTreeMap<String, Vec<u8>> {
    let Value::Object(map) = value else {
        debug!("ignoring non-object artifacts");
        return BTreeMap::new();
    };

    map.into_iter()
        .map(|(name, value)| {
            let bytes = match value {
                Value::String(s) => s.into_bytes(),
                other => other.to_string().into_bytes(),
            };
            (name, bytes)
        })
        .collect()
}
