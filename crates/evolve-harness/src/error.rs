//! Harness and controller error types.

use std::fmt;
use std::io;

use evolve_core::{AttemptState, EvolveError};
use serde::{Deserialize, Serialize};

use crate::runner::AttemptOutcome;

/// How the last failed scorer attempt ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptFailure {
    pub state: AttemptState,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    /// Last non-empty stderr line, if any.
    pub detail: Option<String>,
}

impl From<&AttemptOutcome> for AttemptFailure {
    fn from(outcome: &AttemptOutcome) -> Self {
        Self {
            state: outcome.state,
            exit_code: outcome.exit_code,
            duration_ms: outcome.duration_ms,
            detail: outcome
                .stderr
                .lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string),
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.state, self.exit_code) {
            (AttemptState::TimedOut, _) => write!(f, "timed out after {} ms", self.duration_ms)?,
            (_, Some(code)) => write!(f, "crashed with exit code {code}")?,
            (_, None) => f.write_str("killed by signal")?,
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

/// Terminal evaluation failure.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// Every attempt timed out or crashed.
    #[error("scorer failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: AttemptFailure },

    /// The scorer could not be started at all. Not retried.
    #[error("failed to spawn scorer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl EvaluationError {
    /// Attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Spawn { .. } => 1,
        }
    }
}

pub type HarnessResult<T> = std::result::Result<T, EvaluationError>;

/// Errors that end an evolution run.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The initial program failed pre-flight.
    #[error("invalid initial program: {0}")]
    Structural(#[source] EvolveError),

    /// A proposal does not fit the program skeleton.
    #[error("proposal rejected: {0}")]
    Contract(#[source] EvolveError),

    #[error("proposer failed: {0:#}")]
    Proposer(#[source] anyhow::Error),

    #[error(transparent)]
    Store(EvolveError),
}

impl From<EvolveError> for ControllerError {
    fn from(e: EvolveError) -> Self {
        match e {
            EvolveError::Structural(_) | EvolveError::NoRegions(_) => Self::Structural(e),
            EvolveError::Contract(_)
            | EvolveError::Modification(_)
            | EvolveError::UnknownVersion(_) => Self::Contract(e),
            other => Self::Store(other),
        }
    }
}

pub type ControllerResult<T> = std::result::Result<T, ControllerError>;
