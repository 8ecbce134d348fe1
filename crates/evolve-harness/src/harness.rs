//! Evaluation harness: run the scorer under timeout and retry controls.

use std::path::Path;

use evolve_core::obs::emit_evaluation_attempt;
use evolve_core::EvaluationResult;
use tracing::{info, warn};

use crate::error::{AttemptFailure, EvaluationError, HarnessResult};
use crate::output::parse_score_document;
use crate::report::{render_failure, render_success, write_report};
use crate::runner::{AttemptOutcome, ScorerRunner};
use crate::scorer::HarnessConfig;

/// Scores candidate programs. Holds no state beyond its config, so one
/// harness can serve any number of runs.
#[derive(Debug, Clone)]
pub struct EvaluationHarness {
    config: HarnessConfig,
}

impl EvaluationHarness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Evaluate `candidate`.
    ///
    /// Timed-out and crashed attempts are retried up to `max_retries` times
    /// with exponential backoff; the first success returns. A report is
    /// written beside the candidate either way.
    pub async fn evaluate(&self, candidate: &Path) -> HarnessResult<EvaluationResult> {
        let max_attempts = self.config.max_attempts();
        let label = candidate.display().to_string();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome =
                ScorerRunner::run_attempt(&self.config.scorer, candidate, self.config.timeout())
                    .await
                    .map_err(|source| EvaluationError::Spawn {
                        program: self.config.scorer.program.clone(),
                        source,
                    });
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.report(candidate, render_failure(candidate, &err, None));
                    return Err(err);
                }
            };
            emit_evaluation_attempt(&label, attempt, outcome.state.as_str(), outcome.duration_ms);

            if outcome.succeeded() {
                let result = into_result(outcome, attempt);
                info!(
                    candidate = %label,
                    attempts = attempt,
                    combined_score = ?result.combined_score(),
                    "evaluation succeeded"
                );
                self.report(candidate, render_success(candidate, &result));
                return Ok(result);
            }

            if attempt >= max_attempts {
                let err = EvaluationError::Exhausted {
                    attempts: attempt,
                    last: AttemptFailure::from(&outcome),
                };
                warn!(candidate = %label, error = %err, "evaluation failed");
                self.report(candidate, render_failure(candidate, &err, Some(&outcome)));
                return Err(err);
            }

            // Exponential backoff before retry
            tokio::time::sleep(self.config.backoff(attempt)).await;
        }
    }

    /// Reports are best-effort; a write failure never changes the outcome.
    fn report(&self, candidate: &Path, body: String) {
        match write_report(candidate, &body) {
            Ok(path) => info!(report = %path.display(), "evaluation report written"),
            Err(e) => warn!(error = %format!("{e:#}"), "could not save evaluation report"),
        }
    }
}

fn into_result(outcome: AttemptOutcome, attempts: u32) -> EvaluationResult {
    let doc = parse_score_document(&outcome.stdout);
    EvaluationResult {
        metrics: doc.metrics,
        stdout: outcome.stdout,
        stderr: outcome.stderr,
        artifacts: doc.artifacts,
        exit_status: outcome.exit_code,
        attempts,
        duration_ms: outcome.duration_ms,
    }
}
