//! Iteration controller: propose, materialize, evaluate, record.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use evolve_core::obs::{emit_run_finished, emit_run_started, run_span};
use evolve_core::version::RECORDS_DIR;
use evolve_core::{
    merge_changes, write_atomic, EvolveError, Markers, VersionRecord, VersionStatus, VersionStore,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::context::{RunContext, DEFAULT_TASK};
use crate::error::{ControllerError, ControllerResult};
use crate::harness::EvaluationHarness;
use crate::proposer::{Proposal, ProposalRequest, Proposer, ProposerAction};
use crate::scorer::HarnessConfig;

/// Manifest file name under `records/`.
pub const MANIFEST_FILE: &str = "run.json";

/// Run configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerConfig {
    pub initial_program: PathBuf,
    pub output_dir: PathBuf,

    /// Maximum number of versions produced (version 0 excluded).
    pub max_iterations: u32,

    /// Maximum number of proposer calls.
    pub max_steps: u32,

    /// Evaluate version 0 before the first step.
    pub baseline: bool,

    pub task: String,
    pub markers: Markers,
}

impl ControllerConfig {
    /// Config with `max_steps = 2 * max_iterations`, baseline on, default
    /// task and markers.
    pub fn new(initial_program: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, max_iterations: u32) -> Self {
        Self {
            initial_program: initial_program.into(),
            output_dir: output_dir.into(),
            max_iterations,
            max_steps: max_iterations.saturating_mul(2),
            baseline: true,
            task: DEFAULT_TASK.to_string(),
            markers: Markers::default(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_baseline(mut self, baseline: bool) -> Self {
        self.baseline = baseline;
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }

    pub fn with_markers(mut self, markers: Markers) -> Self {
        self.markers = markers;
        self
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    IterationBudget,
    StepBudget,
    ProposerFinished,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::IterationBudget => "iteration_budget",
            StopReason::StepBudget => "step_budget",
            StopReason::ProposerFinished => "proposer_finished",
        }
    }
}

/// `records/run.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunManifest {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub evolve_version: String,
    pub controller: ControllerConfig,
    pub harness: HarnessConfig,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub output_dir: PathBuf,
    pub stop_reason: StopReason,

    /// Proposer calls made.
    pub steps: u32,

    /// Versions produced, version 0 excluded.
    pub iterations: u32,

    pub versions: Vec<VersionRecord>,

    /// Highest-scoring version, if any was evaluated.
    pub best_version: Option<u32>,

    pub duration_ms: u64,
}

/// Drives one evolution run.
pub struct IterationController<P> {
    config: ControllerConfig,
    harness: EvaluationHarness,
    proposer: P,
}

impl<P: Proposer> IterationController<P> {
    pub fn new(config: ControllerConfig, harness: EvaluationHarness, proposer: P) -> Self {
        Self {
            config,
            harness,
            proposer,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn proposer(&self) -> &P {
        &self.proposer
    }

    /// Run until a budget is spent or the proposer finishes.
    pub async fn run(&mut self) -> ControllerResult<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let span = run_span(&run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&mut self, run_id: String) -> ControllerResult<RunSummary> {
        let started = Instant::now();
        let mut store = VersionStore::open(
            &self.config.output_dir,
            &self.config.initial_program,
            self.config.markers.clone(),
        )?;
        self.write_manifest(&store, &run_id)?;

        let program_name = file_name(store.base_path());
        emit_run_started(
            &run_id,
            &program_name,
            self.config.max_iterations,
            self.config.max_steps,
        );

        let mut context = RunContext::new(
            &program_name,
            &self.config.task,
            store.programs_dir(),
            store.skeleton(),
        );
        if self.config.baseline {
            if let Some(record) = self.evaluate_version(&mut store, 0).await? {
                context.record(&record);
            }
        }

        let mut steps = 0u32;
        let mut iterations = 0u32;
        let stop_reason = loop {
            if iterations >= self.config.max_iterations {
                break StopReason::IterationBudget;
            }
            if steps >= self.config.max_steps {
                break StopReason::StepBudget;
            }
            steps += 1;

            let request = ProposalRequest {
                step: steps,
                context: context.as_str(),
                lineage: store.records(),
            };
            let action = self
                .proposer
                .propose(request)
                .await
                .map_err(ControllerError::Proposer)?;

            let proposal = match action {
                ProposerAction::Finish => break StopReason::ProposerFinished,
                ProposerAction::Pass => {
                    info!(step = steps, "proposer passed");
                    continue;
                }
                ProposerAction::Propose(proposal) => proposal,
            };

            let version = match materialize(&mut store, &proposal) {
                Ok(version) => version,
                Err(e @ EvolveError::Io { .. }) => {
                    warn!(step = steps, error = %e, "could not write version, skipping iteration");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            iterations += 1;

            if let Some(record) = self.evaluate_version(&mut store, version).await? {
                context.record(&record);
            }
        };

        let best_version = store.best().map(|r| r.version);
        let duration_ms = started.elapsed().as_millis() as u64;
        emit_run_finished(
            &run_id,
            store.records().len(),
            steps,
            stop_reason.as_str(),
            duration_ms,
        );
        info!(
            stop_reason = stop_reason.as_str(),
            iterations,
            steps,
            best_version = ?best_version,
            "run finished"
        );

        Ok(RunSummary {
            run_id,
            output_dir: store.output_dir().to_path_buf(),
            stop_reason,
            steps,
            iterations,
            versions: store.records().to_vec(),
            best_version,
            duration_ms,
        })
    }

    /// Score `version` and attach the outcome. Evaluation failures become a
    /// failed record. `None` when the lineage append failed; the version
    /// then stays pending.
    async fn evaluate_version(
        &self,
        store: &mut VersionStore,
        version: u32,
    ) -> ControllerResult<Option<VersionRecord>> {
        let path = store
            .record(version)
            .map(|r| r.file_path.clone())
            .ok_or(EvolveError::UnknownVersion(version))?;

        let status = match self.harness.evaluate(&path).await {
            Ok(result) => VersionStatus::Evaluated { result },
            Err(e) => {
                warn!(version, error = %e, "evaluation failed, recording as failed version");
                VersionStatus::Failed {
                    reason: e.to_string(),
                    attempts: e.attempts(),
                }
            }
        };
        match store.finalize(version, status) {
            Ok(record) => Ok(Some(record.clone())),
            Err(e @ EvolveError::Io { .. }) => {
                warn!(version, error = %e, "could not record version, leaving it pending");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_manifest(&self, store: &VersionStore, run_id: &str) -> ControllerResult<()> {
        let manifest = RunManifest {
            run_id: run_id.to_string(),
            started_at: Utc::now(),
            evolve_version: evolve_core::VERSION.to_string(),
            controller: self.config.clone(),
            harness: self.harness.config().clone(),
        };
        let path = store.output_dir().join(RECORDS_DIR).join(MANIFEST_FILE);
        let body = serde_json::to_vec_pretty(&manifest).map_err(EvolveError::from)?;
        write_atomic(&path, &body).map_err(|e| EvolveError::io(&path, e))?;
        debug!(manifest = %path.display(), "run manifest written");
        Ok(())
    }
}

/// Fill unchanged regions from the parent and write the next version.
fn materialize(store: &mut VersionStore, proposal: &Proposal) -> evolve_core::Result<u32> {
    let parent = proposal
        .parent
        .unwrap_or_else(|| store.next_version_number().saturating_sub(1));
    let current = store.regions_of(parent)?;
    let replacements = merge_changes(&current, &proposal.changes)?;

    let version = store.next_version_number();
    store.next_version(&replacements, version, parent)?;
    Ok(version)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_config_defaults() {
        let cfg = ControllerConfig::new("prog.py", "out", 5);
        assert_eq!(cfg.max_steps, 10);
        assert!(cfg.baseline);
        assert_eq!(cfg.markers, Markers::default());

        let cfg = cfg.with_max_steps(3).with_baseline(false);
        assert_eq!(cfg.max_steps, 3);
        assert!(!cfg.baseline);
    }

    #[test]
    fn test_stop_reason_serde() {
        assert_eq!(
            serde_json::to_string(&StopReason::ProposerFinished).unwrap(),
            "\"proposer_finished\""
        );
        assert_eq!(StopReason::StepBudget.as_str(), "step_budget");
    }
}
