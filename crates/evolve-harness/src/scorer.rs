//! Scorer command and harness configuration.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// External scorer invocation: `<program> [args...] <candidate>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScorerCommand {
    /// Executable to run.
    pub program: String,

    /// Arguments placed before the candidate path.
    pub args: Vec<String>,
}

impl ScorerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Run an evaluator script, picking the interpreter from its extension.
    ///
    /// `.py` runs under `python3`, `.sh` under `sh`, `.js` under `node`;
    /// anything else is executed directly.
    pub fn for_evaluator(path: &Path) -> Self {
        let interpreter = match path.extension().and_then(|e| e.to_str()) {
            Some("py") => Some("python3"),
            Some("sh") => Some("sh"),
            Some("js") => Some("node"),
            _ => None,
        };
        let script = path.display().to_string();

        match interpreter {
            Some(interp) => Self::new(interp, vec![script]),
            None => Self::new(script, Vec::new()),
        }
    }

    /// Full argument vector for scoring `candidate`.
    pub fn argv(&self, candidate: &Path) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv.push(candidate.display().to_string());
        argv
    }
}

impl fmt::Display for ScorerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Evaluation policy. Passed explicitly to every harness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessConfig {
    pub scorer: ScorerCommand,

    /// Maximum wall-clock time for a single attempt (milliseconds).
    pub timeout_ms: u64,

    /// Maximum number of retries (0 = no retries, run once).
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
}

impl HarnessConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
    pub const DEFAULT_MAX_RETRIES: u32 = 1;
    pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

    /// Config with default timeout and retry policy.
    pub fn new(scorer: ScorerCommand) -> Self {
        Self {
            scorer,
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            backoff_base_ms: Self::DEFAULT_BACKOFF_BASE_MS,
        }
    }

    /// Config for an evaluator script path.
    pub fn for_evaluator(path: &Path) -> Self {
        Self::new(ScorerCommand::for_evaluator(path))
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_base_ms(mut self, backoff_base_ms: u64) -> Self {
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay before retrying after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}
