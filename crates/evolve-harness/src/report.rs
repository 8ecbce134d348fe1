//! Plain-text evaluation reports written beside each candidate.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;
use evolve_core::{write_atomic, EvaluationResult};

use crate::error::EvaluationError;
use crate::runner::AttemptOutcome;

const RULE_WIDTH: usize = 60;

/// `<dir>/<stem>_evaluation.txt` for a candidate at `<dir>/<stem>.<ext>`.
pub fn report_path(candidate: &Path) -> PathBuf {
    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "candidate".to_string());
    candidate.with_file_name(format!("{stem}_evaluation.txt"))
}

/// Report for a scored candidate.
pub fn render_success(candidate: &Path, result: &EvaluationResult) -> String {
    let mut out = header(candidate);

    out.push_str("Metrics:\n");
    for (name, value) in &result.metrics {
        let _ = writeln!(out, "  {name}: {value}");
    }
    push_streams(&mut out, &result.stdout, &result.stderr);

    if result.has_artifacts() {
        out.push_str("\nArtifacts:\n");
        for (name, bytes) in &result.artifacts {
            let _ = writeln!(out, "  {name}: {} bytes", bytes.len());
        }
    }
    out
}

/// Report for a candidate whose evaluation failed.
pub fn render_failure(
    candidate: &Path,
    error: &EvaluationError,
    last: Option<&AttemptOutcome>,
) -> String {
    let mut out = header(candidate);
    let _ = writeln!(out, "Evaluation failed: {error}");
    if let Some(outcome) = last {
        push_streams(&mut out, &outcome.stdout, &outcome.stderr);
    }
    out
}

/// Write `body` to the report path of `candidate`.
pub fn write_report(candidate: &Path, body: &str) -> anyhow::Result<PathBuf> {
    let path = report_path(candidate);
    write_atomic(&path, body.as_bytes())
        .with_context(|| format!("failed to write evaluation report {}", path.display()))?;
    Ok(path)
}

fn header(candidate: &Path) -> String {
    format!(
        "Evaluation Results for {}:\n{}\n\n",
        candidate.display(),
        "=".repeat(RULE_WIDTH)
    )
}

fn push_streams(out: &mut String, stdout: &str, stderr: &str) {
    if !stdout.is_empty() {
        out.push_str("\nProgram Output (stdout):\n");
        out.push_str(&"-".repeat(RULE_WIDTH));
        out.push('\n');
        out.push_str(stdout);
        out.push('\n');
    }
    if !stderr.is_empty() {
        out.push_str("\nProgram Errors (stderr):\n");
        out.push_str(&"-".repeat(RULE_WIDTH));
        out.push('\n');
        out.push_str(stderr);
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttemptFailure;
    use evolve_core::{AttemptState, MetricValue};

    #[test]
    fn test_report_path() {
        assert_eq!(
            report_path(Path::new("/out/programs/iteration_003.py")),
            PathBuf::from("/out/programs/iteration_003_evaluation.txt")
        );
        assert_eq!(
            report_path(Path::new("v000_initial_program.py")),
            PathBuf::from("v000_initial_program_evaluation.txt")
        );
    }

    #[test]
    fn test_render_success() {
        let mut result = EvaluationResult::default();
        result
            .metrics
            .insert("combined_score".into(), MetricValue::Number(0.123456));
        result
            .metrics
            .insert("algorithm".into(), MetricValue::Text("timsort".into()));
        result.stdout = "Total time: 12.5 ms".into();
        result.artifacts.insert("log".into(), vec![0u8; 42]);

        let report = render_success(Path::new("iteration_001.py"), &result);
        assert!(report.starts_with("Evaluation Results for iteration_001.py:\n"));
        assert!(report.contains("Metrics:\n  algorithm: timsort\n  combined_score: 0.1235\n"));
        assert!(report.contains("Program Output (stdout):"));
        assert!(!report.contains("Program Errors (stderr):"));
        assert!(report.contains("  log: 42 bytes\n"));
    }

    #[test]
    fn test_render_failure_includes_streams() {
        let outcome = AttemptOutcome {
            state: AttemptState::Crashed,
            exit_code: Some(2),
            stdout: String::new(),
            stderr: "boom".into(),
            duration_ms: 5,
        };
        let error = EvaluationError::Exhausted {
            attempts: 2,
            last: AttemptFailure::from(&outcome),
        };
        let report = render_failure(Path::new("iteration_002.py"), &error, Some(&outcome));
        assert!(report.contains("Evaluation failed: scorer failed after 2 attempt(s): crashed with exit code 2: boom"));
        assert!(report.contains("Program Errors (stderr):\n"));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("iteration_001.py");
        let path = write_report(&candidate, "hello\n").unwrap();
        assert_eq!(path, dir.path().join("iteration_001_evaluation.txt"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello\n");
    }
}
