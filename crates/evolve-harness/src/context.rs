//! Textual context handed to the proposer.

use std::path::Path;

use evolve_core::{describe_regions, Region, VersionRecord};

/// Default task description.
pub const DEFAULT_TASK: &str = "Analyze the program and propose improvements to the EVOLVE-BLOCK \
sections. Form a hypothesis, implement changes, analyze results, and document findings.";

/// Growing context: header, region listing, then one line per finalized
/// version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    text: String,
}

impl RunContext {
    pub fn new(program_name: &str, task: &str, programs_dir: &Path, skeleton: &[Region]) -> Self {
        let mut text = format!("Program to Evolve: {program_name}\n\nTASK:\n{task}\n");
        text.push_str(&format!(
            "Successive versions are written to {}/iteration_NNN.<ext>.\n",
            programs_dir.display()
        ));
        text.push_str("Reply with BLOCK_ID sections; an optional first line PARENT: <version> picks the parent.\n\n");
        text.push_str(&describe_regions(program_name, skeleton));
        text.push_str("\nLINEAGE:\n");
        Self { text }
    }

    /// Append the summary line of a finalized version.
    pub fn record(&mut self, record: &VersionRecord) {
        self.text.push_str(&record.summary_line());
        self.text.push('\n');
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}
