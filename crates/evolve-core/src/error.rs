//! Crate-level error taxonomy for evolve.

use std::path::{Path, PathBuf};

use crate::region::{ModificationError, ParseError, RewriteError};

/// evolve core errors.
#[derive(Debug, thiserror::Error)]
pub enum EvolveError {
    /// Program markers are missing, mismatched, nested or unclosed.
    #[error("invalid program structure: {0}")]
    Structural(ParseError),

    /// The program contains no marked regions at all.
    #[error("no EVOLVE-BLOCK regions found in {0}")]
    NoRegions(PathBuf),

    /// A replacement set does not match the region skeleton.
    #[error("replacement contract violated: {0}")]
    Contract(RewriteError),

    #[error("invalid modifications: {0}")]
    Modification(#[from] ModificationError),

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid iteration number {iteration}: {reason}")]
    InvalidIteration { iteration: u32, reason: String },

    #[error("unknown version: {0}")]
    UnknownVersion(u32),

    #[error("version {0} already has a final status")]
    AlreadyFinalized(u32),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EvolveError {
    /// Wrap an IO error with the path it concerns.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Structural and contract errors mean a broken precondition rather
    /// than a flaky dependency.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Structural(_) | Self::NoRegions(_) | Self::Contract(_) | Self::Modification(_)
        )
    }
}

impl From<ParseError> for EvolveError {
    fn from(e: ParseError) -> Self {
        Self::Structural(e)
    }
}

impl From<RewriteError> for EvolveError {
    fn from(e: RewriteError) -> Self {
        match e {
            RewriteError::Structure(p) => Self::Structural(p),
            other => Self::Contract(other),
        }
    }
}

/// Result type for evolve core operations.
pub type Result<T> = std::result::Result<T, EvolveError>;
