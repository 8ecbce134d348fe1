//! Version lineage records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EvolveError, Result};
use crate::evaluation::EvaluationResult;

/// Evaluation status of a version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VersionStatus {
    /// Materialized, not yet scored.
    Pending,

    /// Scored successfully.
    Evaluated { result: EvaluationResult },

    /// Scoring failed after exhausting retries. Counts as a zero score.
    Failed { reason: String, attempts: u32 },
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Pending => "pending",
            VersionStatus::Evaluated { .. } => "evaluated",
            VersionStatus::Failed { .. } => "failed",
        }
    }
}

/// One materialized program version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionRecord {
    /// Dense version number; 0 is the initial program.
    pub version: u32,

    /// Path of the materialized program file.
    pub file_path: PathBuf,

    /// Version whose region contents this one was derived from.
    pub parent: Option<u32>,

    /// SHA-256 hex of the program text.
    pub content_digest: String,

    pub created_at: DateTime<Utc>,

    pub status: VersionStatus,
}

impl VersionRecord {
    /// Create a pending record.
    pub fn new(version: u32, file_path: PathBuf, parent: Option<u32>, content_digest: String) -> Self {
        Self {
            version,
            file_path,
            parent,
            content_digest,
            created_at: Utc::now(),
            status: VersionStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, VersionStatus::Pending)
    }

    /// Attach the final status. Allowed exactly once, and only with a
    /// non-pending status.
    pub fn finalize(&mut self, status: VersionStatus) -> Result<()> {
        if !self.is_pending() || matches!(status, VersionStatus::Pending) {
            return Err(EvolveError::AlreadyFinalized(self.version));
        }
        self.status = status;
        Ok(())
    }

    /// Overall score: the `combined_score` metric for evaluated versions,
    /// zero for failed ones, none while pending.
    pub fn combined_score(&self) -> Option<f64> {
        match &self.status {
            VersionStatus::Pending => None,
            VersionStatus::Evaluated { result } => result.combined_score(),
            VersionStatus::Failed { .. } => Some(0.0),
        }
    }

    /// One-line summary for context building and logs.
    pub fn summary_line(&self) -> String {
        let parent = self
            .parent
            .map(|p| format!("v{p:03}"))
            .unwrap_or_else(|| "-".to_string());
        let score = self
            .combined_score()
            .map(|s| format!("{s:.4}"))
            .unwrap_or_else(|| "n/a".to_string());
        let name = self
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!(
            "v{:03} {} parent={} status={} combined_score={}",
            self.version,
            name,
            parent,
            self.status.as_str(),
            score
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{MetricValue, COMBINED_SCORE};

    fn evaluated(score: f64) -> VersionStatus {
        let mut result = EvaluationResult::default();
        result
            .metrics
            .insert(COMBINED_SCORE.to_string(), MetricValue::Number(score));
        VersionStatus::Evaluated { result }
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = VersionRecord::new(1, PathBuf::from("iteration_001.py"), Some(0), "ab".into());
        assert!(record.is_pending());
        assert_eq!(record.combined_score(), None);
    }

    #[test]
    fn test_finalize_once() {
        let mut record =
            VersionRecord::new(1, PathBuf::from("iteration_001.py"), Some(0), "ab".into());
        record.finalize(evaluated(0.9)).unwrap();
        assert_eq!(record.combined_score(), Some(0.9));

        let err = record
            .finalize(VersionStatus::Failed {
                reason: "late".into(),
                attempts: 1,
            })
            .unwrap_err();
        assert!(matches!(err, EvolveError::AlreadyFinalized(1)));
        assert_eq!(record.combined_score(), Some(0.9));
    }

    #[test]
    fn test_finalize_rejects_pending() {
        let mut record = VersionRecord::new(2, PathBuf::from("x.py"), Some(1), "cd".into());
        assert!(record.finalize(VersionStatus::Pending).is_err());
    }

    #[test]
    fn test_failed_counts_as_zero() {
        let mut record = VersionRecord::new(3, PathBuf::from("x.py"), Some(0), "ef".into());
        record
            .finalize(VersionStatus::Failed {
                reason: "timed out".into(),
                attempts: 2,
            })
            .unwrap();
        assert_eq!(record.combined_score(), Some(0.0));
    }

    #[test]
    fn test_summary_line() {
        let mut record = VersionRecord::new(
            4,
            PathBuf::from("/out/programs/iteration_004.py"),
            Some(2),
            "00".into(),
        );
        record.finalize(evaluated(0.5)).unwrap();
        assert_eq!(
            record.summary_line(),
            "v004 iteration_004.py parent=v002 status=evaluated combined_score=0.5000"
        );
    }

    #[test]
    fn test_status_serializes_with_state_tag() {
        let raw = serde_json::to_value(VersionStatus::Failed {
            reason: "crashed".into(),
            attempts: 3,
        })
        .unwrap();
        assert_eq!(raw["state"], "failed");
        assert_eq!(raw["attempts"], 3);
    }
}
