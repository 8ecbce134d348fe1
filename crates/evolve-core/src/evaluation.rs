//! Evaluation outcome types shared by the harness and the version lineage.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Conventional metric name for the overall score of a candidate.
pub const COMBINED_SCORE: &str = "combined_score";

/// A single metric value reported by a scorer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Numeric value, if this metric is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) if n.fract() != 0.0 => write!(f, "{n:.4}"),
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

/// Terminal state of one scorer attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// Scorer exited cleanly; the score itself may still be low.
    Succeeded,
    /// Scorer exceeded the wall-clock limit and was killed.
    TimedOut,
    /// Scorer exited non-zero or was killed by a signal.
    Crashed,
}

impl AttemptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptState::Succeeded => "succeeded",
            AttemptState::TimedOut => "timed_out",
            AttemptState::Crashed => "crashed",
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvaluationResult {
    /// Opaque scorer metrics.
    pub metrics: BTreeMap<String, MetricValue>,

    /// Captured scorer stdout.
    pub stdout: String,

    /// Captured scorer stderr.
    pub stderr: String,

    /// Named auxiliary blobs emitted by the scorer.
    #[serde(with = "artifact_bytes")]
    pub artifacts: BTreeMap<String, Vec<u8>>,

    /// Scorer exit code (None when killed by a signal).
    pub exit_status: Option<i32>,

    /// Attempts used, including the successful one.
    pub attempts: u32,

    /// Wall-clock time of the successful attempt in milliseconds.
    pub duration_ms: u64,
}

impl EvaluationResult {
    /// The `combined_score` metric, when present and numeric.
    pub fn combined_score(&self) -> Option<f64> {
        self.metrics.get(COMBINED_SCORE).and_then(MetricValue::as_f64)
    }

    pub fn has_artifacts(&self) -> bool {
        !self.artifacts.is_empty()
    }
}

/// Artifacts are persisted as UTF-8 text when possible, hex otherwise.
mod artifact_bytes {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
    enum Encoded {
        Utf8(String),
        Hex(String),
    }

    pub fn serialize<S>(map: &BTreeMap<String, Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: BTreeMap<&String, Encoded> = map
            .iter()
            .map(|(k, v)| {
                let value = match std::str::from_utf8(v) {
                    Ok(s) => Encoded::Utf8(s.to_string()),
                    Err(_) => Encoded::Hex(hex::encode(v)),
                };
                (k, value)
            })
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = BTreeMap::<String, Encoded>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(k, v)| {
                let bytes = match v {
                    Encoded::Utf8(s) => s.into_bytes(),
                    Encoded::Hex(h) => hex::decode(h).map_err(serde::de::Error::custom)?,
                };
                Ok((k, bytes))
            })
            .collect()
    }
}
