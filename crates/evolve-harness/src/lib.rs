//! Evolve Harness - scoring and iteration control
//!
//! Provides:
//! - An evaluation harness that runs an external scorer under a timeout,
//!   retries failed attempts with exponential backoff and writes a report
//! - The proposer seam (command-backed or scripted)
//! - The iteration controller that turns proposals into scored versions

pub mod context;
pub mod controller;
pub mod error;
pub mod harness;
pub mod output;
pub mod proposer;
pub mod report;
pub mod runner;
pub mod scorer;

// Re-export key types
pub use context::{RunContext, DEFAULT_TASK};
pub use controller::{ControllerConfig, IterationController, RunManifest, RunSummary, StopReason};
pub use error::{AttemptFailure, ControllerError, EvaluationError};
pub use harness::EvaluationHarness;
pub use output::{parse_score_document, ScoreDocument};
pub use proposer::{
    CommandProposer, Proposal, ProposalRequest, Proposer, ProposerAction, ScriptedProposer,
};
pub use runner::{AttemptOutcome, ScorerRunner};
pub use scorer::{HarnessConfig, ScorerCommand};
