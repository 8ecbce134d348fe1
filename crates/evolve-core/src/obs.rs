//! Structured observability hooks for evolution run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via `run_span`
//! - Emission functions for key lifecycle events: run start/finish,
//!   version materialized/finalized, evaluation attempts
//!
//! Events are emitted at `info!` level (`warn!` for failed attempts) and
//! filtered through `RUST_LOG`. Pass `--json` to the CLI for JSON lines.

use tracing::{info, info_span, warn, Span};

/// Span tagged with the run id, for instrumenting a whole run.
///
/// # Example
///
/// ```ignore
/// controller_loop().instrument(run_span(&run_id)).await
/// ```
pub fn run_span(run_id: &str) -> Span {
    info_span!("evolve.run", run_id = %run_id)
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, program: &str, max_iterations: u32, max_steps: u32) {
    info!(
        event = "run.started",
        run_id = %run_id,
        program = %program,
        max_iterations = max_iterations,
        max_steps = max_steps,
    );
}

/// Emit event: run finished.
pub fn emit_run_finished(run_id: &str, versions: usize, steps: u32, stop_reason: &str, duration_ms: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        versions = versions,
        steps = steps,
        stop_reason = %stop_reason,
        duration_ms = duration_ms,
    );
}

/// Emit event: a new program version was written to disk.
pub fn emit_version_materialized(version: u32, parent: Option<u32>, path: &str, digest: &str) {
    info!(
        event = "version.materialized",
        version = version,
        parent = ?parent,
        path = %path,
        digest = %digest,
    );
}

/// Emit event: a version received its final status.
pub fn emit_version_finalized(version: u32, status: &str, combined_score: Option<f64>) {
    info!(
        event = "version.finalized",
        version = version,
        status = %status,
        combined_score = ?combined_score,
    );
}

/// Emit event: one scorer attempt finished.
pub fn emit_evaluation_attempt(candidate: &str, attempt: u32, state: &str, duration_ms: u64) {
    if state == "succeeded" {
        info!(
            event = "evaluation.attempt",
            candidate = %candidate,
            attempt = attempt,
            state = %state,
            duration_ms = duration_ms,
        );
    } else {
        warn!(
            event = "evaluation.attempt",
            candidate = %candidate,
            attempt = attempt,
            state = %state,
            duration_ms = duration_ms,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitters_do_not_panic_without_subscriber() {
        let _span = run_span("run-test").entered();
        emit_run_started("run-test", "prog.py", 3, 6);
        emit_version_materialized(1, Some(0), "programs/iteration_001.py", "abc123");
        emit_evaluation_attempt("programs/iteration_001.py", 1, "timed_out", 1000);
        emit_evaluation_attempt("programs/iteration_001.py", 2, "succeeded", 20);
        emit_version_finalized(1, "evaluated", Some(0.5));
        emit_run_finished("run-test", 2, 3, "iteration_budget", 1234);
    }
}
