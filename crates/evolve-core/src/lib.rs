//! Evolve Core Library
//!
//! Marked-region protocol, evaluation result types and program version
//! bookkeeping shared by the harness and the CLI.

pub mod digest;
pub mod error;
pub mod evaluation;
pub mod obs;
pub mod region;
pub mod telemetry;
pub mod version;

pub use digest::ContentDigest;

pub use error::{EvolveError, Result};

pub use evaluation::{AttemptState, EvaluationResult, MetricValue, COMBINED_SCORE};

pub use region::{
    describe_regions, locate, locate_with, merge_changes, parse_modifications, rewrite,
    rewrite_file, rewrite_with, validate, validate_with, write_atomic, Markers,
    ModificationError, Modifications, ParseError, Region, RegionChange, RewriteError,
    DEFAULT_END_MARKER, DEFAULT_START_MARKER,
};

pub use version::{
    materialize_version, version_file_name, VersionRecord, VersionStatus, VersionStore,
};

pub use telemetry::init_tracing;

/// Crate version, reported by the CLI and recorded in run manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
