//! Error types for the region protocol.

/// Structural problems found while scanning program text for markers.
///
/// Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unbalanced nesting at line {line}: start marker while region opened at line {open_line} is unclosed")]
    NestedStart { line: usize, open_line: usize },

    #[error("unbalanced nesting at line {line}: end marker without a matching start marker")]
    UnmatchedEnd { line: usize },

    #[error("region starting at line {line} has no matching end marker")]
    MissingEndMarker { line: usize },
}

/// Errors produced while substituting region bodies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewriteError {
    #[error("invalid program structure: {0}")]
    Structure(#[from] ParseError),

    #[error("region count mismatch: expected {expected}, got {got}")]
    CountMismatch { expected: usize, got: usize },

    #[error("region id mismatch: expected {expected:?}, got {got:?}")]
    IdMismatch { expected: Vec<usize>, got: Vec<usize> },

    /// Replacement content carries marker tokens of its own.
    #[error("replacement content changes the region skeleton: expected {expected} region(s), {found}")]
    SkeletonChanged { expected: usize, found: String },
}

/// Errors produced while parsing a modification document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModificationError {
    #[error("expected 'BLOCK_ID: <id>' but got: {header}")]
    MissingHeader { header: String },

    #[error("invalid block id in: {header}")]
    InvalidBlockId { header: String },

    #[error("invalid parent version in: {header}")]
    InvalidParent { header: String },

    #[error("block id {id} appears more than once")]
    DuplicateBlockId { id: usize },
}

/// Result type for locate operations.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Result type for rewrite operations.
pub type RewriteResult<T> = std::result::Result<T, RewriteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::MissingEndMarker { line: 7 };
        assert_eq!(
            err.to_string(),
            "region starting at line 7 has no matching end marker"
        );

        let err = ParseError::NestedStart {
            line: 9,
            open_line: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("unbalanced nesting"));
        assert!(msg.contains("line 9"));
        assert!(msg.contains("line 4"));
    }

    #[test]
    fn test_count_mismatch_names_both_counts() {
        let err = RewriteError::CountMismatch {
            expected: 2,
            got: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected 2"));
        assert!(msg.contains("got 3"));
    }
}
