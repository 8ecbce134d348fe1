//! Proposal sources.
//!
//! The controller treats the proposer as a message-passing collaborator:
//! it sends the current context and lineage and gets back an action. It
//! never looks at how the proposal was produced.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use evolve_core::{parse_modifications, RegionChange, VersionRecord};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::runner::{drain, own_process_group, read_stream, GroupKillGuard};

/// Stdout line that ends the run early.
pub const FINISH_TOKEN: &str = "FINISH";

/// Region replacements on top of a parent version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Parent version. `None` means the most recent version.
    pub parent: Option<u32>,

    /// New contents for some regions; the rest come from the parent.
    pub changes: Vec<RegionChange>,
}

impl Proposal {
    pub fn new(parent: Option<u32>, changes: Vec<RegionChange>) -> Self {
        Self { parent, changes }
    }
}

/// What the proposer wants to do at this step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposerAction {
    Propose(Proposal),
    /// Step produced nothing.
    Pass,
    /// End the run.
    Finish,
}

/// Input for one proposer call.
#[derive(Debug, Clone, Copy)]
pub struct ProposalRequest<'a> {
    /// 1-based step number.
    pub step: u32,
    pub context: &'a str,
    pub lineage: &'a [VersionRecord],
}

#[async_trait]
pub trait Proposer: Send {
    async fn propose(&mut self, request: ProposalRequest<'_>) -> anyhow::Result<ProposerAction>;
}

/// Proposer backed by an external command.
///
/// The context goes to stdin; `EVOLVE_OUTPUT_DIR` and `EVOLVE_STEP` are set
/// in the environment. Stdout is a modification document, empty for a
/// pass, or `FINISH`. The command runs in its own process group, which is
/// killed when a call times out or is cancelled.
#[derive(Debug, Clone)]
pub struct CommandProposer {
    program: String,
    args: Vec<String>,
    output_dir: PathBuf,
    timeout: Duration,
}

impl CommandProposer {
    pub const DEFAULT_TIMEOUT_MS: u64 = 600_000;

    pub fn new(program: impl Into<String>, args: Vec<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            output_dir: output_dir.into(),
            timeout: Duration::from_millis(Self::DEFAULT_TIMEOUT_MS),
        }
    }

    /// Wall-clock limit for one proposer call.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Duration::from_millis(timeout_ms);
        self
    }

    /// Run `command` through `sh -c`.
    pub fn shell(command: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self::new("sh", vec!["-c".to_string(), command.into()], output_dir)
    }
}

#[async_trait]
impl Proposer for CommandProposer {
    async fn propose(&mut self, request: ProposalRequest<'_>) -> anyhow::Result<ProposerAction> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("EVOLVE_OUTPUT_DIR", &self.output_dir)
            .env("EVOLVE_STEP", request.step.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        own_process_group(&mut command);

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn proposer `{}`", self.program))?;
        let group = GroupKillGuard::new(&child);

        if let Some(mut stdin) = child.stdin.take() {
            let context = request.context.as_bytes().to_vec();
            tokio::spawn(async move {
                // The proposer may exit without reading its input.
                if let Err(e) = stdin.write_all(&context).await {
                    debug!(error = %e, "proposer did not consume context");
                }
            });
        }

        let stdout_handle = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_handle = tokio::spawn(read_stream(child.stderr.take()));

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status.context("failed to wait for proposer")?,
            Err(_elapsed) => {
                group.kill();
                child.start_kill().ok();
                child.wait().await.ok();
                bail!(
                    "proposer timed out after {} ms at step {}",
                    self.timeout.as_millis(),
                    request.step
                );
            }
        };
        group.disarm();

        let stdout = drain(stdout_handle).await;
        let stderr = drain(stderr_handle).await;
        let stderr = String::from_utf8_lossy(&stderr);
        if !stderr.trim().is_empty() {
            debug!(step = request.step, stderr = %stderr.trim(), "proposer stderr");
        }
        if !status.success() {
            bail!(
                "proposer exited with {} at step {}: {}",
                status,
                request.step,
                stderr.trim()
            );
        }

        parse_action(&String::from_utf8_lossy(&stdout))
    }
}

/// Decode proposer stdout into an action.
pub fn parse_action(stdout: &str) -> anyhow::Result<ProposerAction> {
    let first = stdout.lines().map(str::trim).find(|l| !l.is_empty());
    match first {
        None => Ok(ProposerAction::Pass),
        Some(FINISH_TOKEN) => Ok(ProposerAction::Finish),
        Some(_) => {
            let mods = parse_modifications(stdout).context("malformed modification document")?;
            if mods.is_empty() {
                warn!("modification document names no regions");
            }
            Ok(ProposerAction::Propose(Proposal::new(mods.parent, mods.changes)))
        }
    }
}

/// Proposer that replays a fixed list of actions, then finishes.
///
/// Keeps every context it was shown.
#[derive(Debug, Default)]
pub struct ScriptedProposer {
    actions: VecDeque<ProposerAction>,
    contexts: Vec<String>,
}

impl ScriptedProposer {
    pub fn new(actions: impl IntoIterator<Item = ProposerAction>) -> Self {
        Self {
            actions: actions.into_iter().collect(),
            contexts: Vec::new(),
        }
    }

    /// Contexts received so far, one per step.
    pub fn contexts(&self) -> &[String] {
        &self.contexts
    }
}

#[async_trait]
impl Proposer for ScriptedProposer {
    async fn propose(&mut self, request: ProposalRequest<'_>) -> anyhow::Result<ProposerAction> {
        self.contexts.push(request.context.to_string());
        Ok(self.actions.pop_front().unwrap_or(ProposerAction::Finish))
    }
}
