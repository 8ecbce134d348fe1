//! Region value type and marker configuration.

use serde::{Deserialize, Serialize};

/// Default token that opens an evolvable region.
pub const DEFAULT_START_MARKER: &str = "EVOLVE-BLOCK-START";

/// Default token that closes an evolvable region.
pub const DEFAULT_END_MARKER: &str = "EVOLVE-BLOCK-END";

/// Start/end marker tokens.
///
/// Detection is a substring match within a line, so the tokens can sit
/// behind whatever comment prefix the host language uses
/// (`# EVOLVE-BLOCK-START`, `// EVOLVE-BLOCK-START`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Markers {
    /// Token identifying a start-marker line.
    pub start: String,

    /// Token identifying an end-marker line.
    pub end: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_MARKER.to_string(),
            end: DEFAULT_END_MARKER.to_string(),
        }
    }
}

impl Markers {
    /// Create a marker pair from custom tokens.
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Whether `line` is a start-marker line. Checked before
    /// [`Markers::is_end`], so a line carrying both tokens opens a region.
    pub fn is_start(&self, line: &str) -> bool {
        line.contains(self.start.as_str())
    }

    /// Whether `line` is an end-marker line.
    pub fn is_end(&self, line: &str) -> bool {
        line.contains(self.end.as_str())
    }
}

/// One marker-delimited region of a program snapshot.
///
/// `start_line` and `end_line` are the zero-based indices of the start and
/// end marker lines in the snapshot the region was located in. `content` is
/// the text strictly between them, line terminators included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Region {
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    pub id: usize,
}

impl Region {
    /// Create a region.
    ///
    /// # Panics
    ///
    /// Panics if `end_line < start_line`.
    pub fn new(id: usize, start_line: usize, end_line: usize, content: impl Into<String>) -> Self {
        assert!(
            end_line >= start_line,
            "region {id}: end_line ({end_line}) must be >= start_line ({start_line})"
        );
        Self {
            start_line,
            end_line,
            content: content.into(),
            id,
        }
    }

    /// Same location and identity, different body.
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            start_line: self.start_line,
            end_line: self.end_line,
            content: content.into(),
            id: self.id,
        }
    }

    /// Number of body lines between the markers.
    pub fn body_lines(&self) -> usize {
        (self.end_line - self.start_line).saturating_sub(1)
    }
}
