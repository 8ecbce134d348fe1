//! evolve - marked-region program evolution CLI
//!
//! ## Commands
//!
//! - `run`: Evolve a program for a number of iterations
//! - `validate`: Check that a program has well-formed EVOLVE-BLOCKs
//! - `regions`: List the EVOLVE-BLOCKs of a program
//! - `apply`: Apply one modification document to a program
//! - `evaluate`: Score one program with an evaluator

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use tracing::info;

use evolve_core::telemetry::level_for;
use evolve_core::{
    describe_regions, locate_with, merge_changes, parse_modifications, rewrite_file,
    validate_with, Markers, DEFAULT_END_MARKER, DEFAULT_START_MARKER,
};
use evolve_harness::{
    CommandProposer, ControllerConfig, EvaluationHarness, HarnessConfig, IterationController,
    RunSummary,
};

/// Exit code after Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "evolve")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evolve EVOLVE-BLOCK regions of a program against an evaluator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Token marking the start of a region
    #[arg(long, global = true, env = "EVOLVE_START_MARKER", default_value = DEFAULT_START_MARKER)]
    start_marker: String,

    /// Token marking the end of a region
    #[arg(long, global = true, env = "EVOLVE_END_MARKER", default_value = DEFAULT_END_MARKER)]
    end_marker: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evolve a program for a number of iterations
    Run {
        /// Program containing EVOLVE-BLOCK regions
        #[arg(long, env = "EVOLVE_INITIAL_PROGRAM")]
        initial_program: PathBuf,

        /// Evaluator script (invoked with the candidate path as last argument)
        #[arg(long, env = "EVOLVE_EVALUATOR")]
        evaluator: PathBuf,

        /// Number of versions to produce
        #[arg(long, env = "EVOLVE_ITERATIONS")]
        iterations: u32,

        /// Output directory (default: evolution_output_<timestamp> next to the program)
        #[arg(long, env = "EVOLVE_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Proposer command, run through `sh -c`
        #[arg(long, env = "EVOLVE_PROPOSER")]
        proposer: String,

        /// Wall-clock limit for one proposer call in milliseconds
        #[arg(long, env = "EVOLVE_PROPOSER_TIMEOUT_MS", default_value_t = CommandProposer::DEFAULT_TIMEOUT_MS)]
        proposer_timeout_ms: u64,

        /// Per-attempt evaluation timeout in milliseconds
        #[arg(long, env = "EVOLVE_TIMEOUT_MS", default_value_t = HarnessConfig::DEFAULT_TIMEOUT_MS)]
        timeout_ms: u64,

        /// Evaluation retries after a timeout or crash
        #[arg(long, env = "EVOLVE_MAX_RETRIES", default_value_t = HarnessConfig::DEFAULT_MAX_RETRIES)]
        max_retries: u32,

        /// Maximum proposer calls (default: twice the iterations)
        #[arg(long, env = "EVOLVE_MAX_STEPS")]
        max_steps: Option<u32>,

        /// Task description given to the proposer
        #[arg(long, env = "EVOLVE_TASK")]
        task: Option<String>,

        /// Skip evaluating the initial program
        #[arg(long)]
        no_baseline: bool,
    },

    /// Check that a program has well-formed EVOLVE-BLOCKs
    Validate {
        /// Program to check
        program: PathBuf,
    },

    /// List the EVOLVE-BLOCKs of a program
    Regions {
        /// Program to inspect
        program: PathBuf,
    },

    /// Apply one modification document to a program
    Apply {
        /// Program to rewrite (left untouched)
        program: PathBuf,

        /// Modification document (BLOCK_ID sections)
        #[arg(short, long)]
        modifications: PathBuf,

        /// Where to write the rewritten program
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Score one program with an evaluator
    Evaluate {
        /// Program to score
        program: PathBuf,

        /// Evaluator script
        #[arg(long, env = "EVOLVE_EVALUATOR")]
        evaluator: PathBuf,

        /// Per-attempt timeout in milliseconds
        #[arg(long, env = "EVOLVE_TIMEOUT_MS", default_value_t = HarnessConfig::DEFAULT_TIMEOUT_MS)]
        timeout_ms: u64,

        /// Retries after a timeout or crash
        #[arg(long, env = "EVOLVE_MAX_RETRIES", default_value_t = HarnessConfig::DEFAULT_MAX_RETRIES)]
        max_retries: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    evolve_core::init_tracing(cli.json, level_for(cli.verbose));

    let markers = Markers::new(cli.start_marker, cli.end_marker);
    tokio::select! {
        result = dispatch(cli.command, markers) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{}", render_error_box(&err));
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted; versions written so far are kept.");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

async fn dispatch(command: Commands, markers: Markers) -> Result<()> {
    match command {
        Commands::Run {
            initial_program,
            evaluator,
            iterations,
            output_dir,
            proposer,
            proposer_timeout_ms,
            timeout_ms,
            max_retries,
            max_steps,
            task,
            no_baseline,
        } => {
            let output_dir =
                output_dir.unwrap_or_else(|| default_output_dir(&initial_program, Local::now()));
            let mut config = ControllerConfig::new(&initial_program, output_dir, iterations)
                .with_baseline(!no_baseline)
                .with_markers(markers);
            if let Some(max_steps) = max_steps {
                config = config.with_max_steps(max_steps);
            }
            if let Some(task) = task {
                config = config.with_task(task);
            }
            let harness = HarnessConfig::for_evaluator(&evaluator)
                .with_timeout_ms(timeout_ms)
                .with_max_retries(max_retries);
            let proposer = CommandProposer::shell(proposer, &config.output_dir)
                .with_timeout_ms(proposer_timeout_ms);
            cmd_run(config, &evaluator, harness, proposer).await
        }
        Commands::Validate { program } => cmd_validate(&program, &markers),
        Commands::Regions { program } => cmd_regions(&program, &markers),
        Commands::Apply {
            program,
            modifications,
            output,
        } => cmd_apply(&program, &modifications, &output, &markers),
        Commands::Evaluate {
            program,
            evaluator,
            timeout_ms,
            max_retries,
        } => {
            let harness = HarnessConfig::for_evaluator(&evaluator)
                .with_timeout_ms(timeout_ms)
                .with_max_retries(max_retries);
            cmd_evaluate(&program, &evaluator, harness).await
        }
    }
}

/// Evolve a program end to end
async fn cmd_run(
    config: ControllerConfig,
    evaluator: &Path,
    harness: HarnessConfig,
    proposer: CommandProposer,
) -> Result<()> {
    ensure_readable(&config.initial_program, "initial program")?;
    ensure_readable(evaluator, "evaluator")?;

    println!("Evolving {}", config.initial_program.display());
    println!("Evaluator: {}", harness.scorer);
    println!("Output: {}", config.output_dir.display());
    println!(
        "Budget: {} iterations, {} steps",
        config.max_iterations, config.max_steps
    );
    println!();

    let mut controller =
        IterationController::new(config, EvaluationHarness::new(harness), proposer);
    let summary = controller.run().await.context("evolution run failed")?;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Run ID: {}", summary.run_id);
    println!("Stop reason: {}", summary.stop_reason.as_str());
    println!(
        "Steps: {}, iterations: {}, duration: {}ms",
        summary.steps, summary.iterations, summary.duration_ms
    );
    println!();
    for record in &summary.versions {
        println!("  {}", record.summary_line());
    }
    println!();
    match summary
        .best_version
        .and_then(|v| summary.versions.get(v as usize))
    {
        Some(best) => println!(
            "Best: {} ({})",
            best.file_path.display(),
            best.combined_score()
                .map(|s| format!("combined_score {s:.4}"))
                .unwrap_or_else(|| "no combined_score".to_string())
        ),
        None => println!("Best: none evaluated"),
    }
}

/// Pre-flight a program
fn cmd_validate(program: &Path, markers: &Markers) -> Result<()> {
    let text = read_program(program)?;

    let regions = locate_with(&text, markers)
        .with_context(|| format!("{} has malformed EVOLVE-BLOCKs", program.display()))?;
    if !validate_with(&text, markers) {
        bail!("{} has no EVOLVE-BLOCK regions", program.display());
    }

    println!("✓ {}: {} EVOLVE-BLOCK(s)", program.display(), regions.len());
    Ok(())
}

/// List regions with 1-based line numbers
fn cmd_regions(program: &Path, markers: &Markers) -> Result<()> {
    let text = read_program(program)?;
    let regions = locate_with(&text, markers)
        .with_context(|| format!("{} has malformed EVOLVE-BLOCKs", program.display()))?;

    print!("{}", describe_regions(&program.display().to_string(), &regions));
    Ok(())
}

/// Rewrite a program from a modification document
fn cmd_apply(program: &Path, modifications: &Path, output: &Path, markers: &Markers) -> Result<()> {
    let text = read_program(program)?;
    ensure_readable(modifications, "modification document")?;
    let doc = std::fs::read_to_string(modifications)
        .with_context(|| format!("failed to read {}", modifications.display()))?;

    let mods = parse_modifications(&doc)
        .with_context(|| format!("malformed modification document {}", modifications.display()))?;
    if mods.parent.is_some() {
        info!("ignoring PARENT header outside of a run");
    }

    let current = locate_with(&text, markers)
        .with_context(|| format!("{} has malformed EVOLVE-BLOCKs", program.display()))?;
    let replacements = merge_changes(&current, &mods.changes)?;
    rewrite_file(program, &replacements, output, markers)?;

    println!(
        "✓ Wrote {} ({} of {} region(s) changed)",
        output.display(),
        mods.changes.len(),
        current.len()
    );
    Ok(())
}

/// Score a single program
async fn cmd_evaluate(program: &Path, evaluator: &Path, harness: HarnessConfig) -> Result<()> {
    ensure_readable(program, "program")?;
    ensure_readable(evaluator, "evaluator")?;

    let result = EvaluationHarness::new(harness)
        .evaluate(program)
        .await
        .with_context(|| format!("evaluation of {} failed", program.display()))?;

    println!("✓ Evaluated {} in {} attempt(s)", program.display(), result.attempts);
    for (name, value) in &result.metrics {
        println!("  {name}: {value}");
    }
    Ok(())
}

/// `<program-dir>/evolution_output_<YYYYmmdd_HHMMSS>`
fn default_output_dir(program: &Path, now: DateTime<Local>) -> PathBuf {
    let dir = program
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    dir.join(format!("evolution_output_{}", now.format("%Y%m%d_%H%M%S")))
}

fn ensure_readable(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!("{what} not found: {}", path.display());
    }
    if !path.is_file() {
        bail!("{what} is not a file: {}", path.display());
    }
    File::open(path).with_context(|| format!("{what} is not readable: {}", path.display()))?;
    Ok(())
}

fn read_program(program: &Path) -> Result<String> {
    ensure_readable(program, "program")?;
    std::fs::read_to_string(program).with_context(|| format!("failed to read {}", program.display()))
}

/// Boxed summary of an error and its causes.
fn render_error_box(err: &anyhow::Error) -> String {
    let mut lines = vec![format!("error: {err}")];
    lines.extend(err.chain().skip(1).map(|cause| format!("caused by: {cause}")));

    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let mut out = format!("┌{}┐\n", "─".repeat(width + 2));
    for line in &lines {
        let pad = width - line.chars().count();
        out.push_str(&format!("│ {line}{} │\n", " ".repeat(pad)));
    }
    out.push_str(&format!("└{}┘", "─".repeat(width + 2)));
    out
}
