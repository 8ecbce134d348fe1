//! Program version lineage: dense numbering, file layout and records.

pub mod record;
pub mod store;

pub use record::{VersionRecord, VersionStatus};
pub use store::{
    baseline_file_name, materialize_version, preflight, version_file_name, VersionStore,
    LINEAGE_FILE, PROGRAMS_DIR, RECORDS_DIR,
};
