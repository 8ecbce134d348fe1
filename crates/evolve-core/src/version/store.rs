//! Filesystem-backed version store.
//!
//! Layout:
//!
//! ```text
//! <output_dir>/
//!   programs/v000_<initial-name>     version 0, verbatim copy
//!   programs/iteration_001.<ext>     version 1, ...
//!   records/lineage.jsonl            one finalized VersionRecord per line
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::record::{VersionRecord, VersionStatus};
use crate::digest::ContentDigest;
use crate::error::{EvolveError, Result};
use crate::obs::{emit_version_finalized, emit_version_materialized};
use crate::region::{locate_with, rewrite_file, validate_with, write_atomic, Markers, Region, RewriteError};

pub const PROGRAMS_DIR: &str = "programs";
pub const RECORDS_DIR: &str = "records";
pub const LINEAGE_FILE: &str = "lineage.jsonl";

/// File name of version 0: `v000_<initial-name>`.
pub fn baseline_file_name(initial_program: &Path) -> String {
    let name = initial_program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "program".to_string());
    format!("v000_{name}")
}

/// File name of version `iteration`: `iteration_<NNN><ext>`, keeping the
/// base program's extension.
pub fn version_file_name(base_program: &Path, iteration: u32) -> String {
    let ext = base_program
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    format!("iteration_{iteration:03}{ext}")
}

/// Check that `text` has at least one well-formed region and return the
/// region skeleton.
pub fn preflight(text: &str, path: &Path, markers: &Markers) -> Result<Vec<Region>> {
    let regions = locate_with(text, markers)?;
    if regions.is_empty() || !validate_with(text, markers) {
        return Err(EvolveError::NoRegions(path.to_path_buf()));
    }
    Ok(regions)
}

/// Materialize version `iteration` of `base_program` into `programs_dir`.
///
/// Replacements are always applied to the base program itself, never to a
/// previous version. Returns the path of the new file.
pub fn materialize_version(
    base_program: &Path,
    replacements: &[Region],
    iteration: u32,
    programs_dir: &Path,
    markers: &Markers,
) -> Result<(PathBuf, String)> {
    if iteration < 1 {
        return Err(EvolveError::InvalidIteration {
            iteration,
            reason: "iteration 0 is reserved for the initial program".to_string(),
        });
    }

    fs::create_dir_all(programs_dir).map_err(|e| EvolveError::io(programs_dir, e))?;
    let path = programs_dir.join(version_file_name(base_program, iteration));
    let text = rewrite_file(base_program, replacements, &path, markers)?;
    Ok((path, text))
}

/// Dense, append-only store of program versions for one run.
pub struct VersionStore {
    output_dir: PathBuf,
    programs_dir: PathBuf,
    records_dir: PathBuf,
    base_path: PathBuf,
    markers: Markers,
    skeleton: Vec<Region>,
    records: Vec<VersionRecord>,
}

impl VersionStore {
    /// Create the output layout and seed version 0 from `initial_program`.
    pub fn open(output_dir: impl AsRef<Path>, initial_program: &Path, markers: Markers) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        let programs_dir = output_dir.join(PROGRAMS_DIR);
        let records_dir = output_dir.join(RECORDS_DIR);

        let text = fs::read_to_string(initial_program)
            .map_err(|e| EvolveError::io(initial_program, e))?;
        let skeleton = preflight(&text, initial_program, &markers)?;

        fs::create_dir_all(&programs_dir).map_err(|e| EvolveError::io(&programs_dir, e))?;
        fs::create_dir_all(&records_dir).map_err(|e| EvolveError::io(&records_dir, e))?;
        debug!(output_dir = %output_dir.display(), "output layout ready");

        let base_path = programs_dir.join(baseline_file_name(initial_program));
        write_atomic(&base_path, text.as_bytes()).map_err(|e| EvolveError::io(&base_path, e))?;

        let digest = ContentDigest::compute(text.as_bytes());
        emit_version_materialized(0, None, &base_path.display().to_string(), &digest.short());
        info!(
            regions = skeleton.len(),
            base = %base_path.display(),
            "seeded version 0"
        );

        Ok(Self {
            output_dir,
            programs_dir,
            records_dir,
            records: vec![VersionRecord::new(0, base_path.clone(), None, digest.to_hex())],
            base_path,
            markers,
            skeleton,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn programs_dir(&self) -> &Path {
        &self.programs_dir
    }

    pub fn records_dir(&self) -> &Path {
        &self.records_dir
    }

    /// Path of version 0, the canonical skeleton every version derives from.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    /// Regions of the base program.
    pub fn skeleton(&self) -> &[Region] {
        &self.skeleton
    }

    pub fn records(&self) -> &[VersionRecord] {
        &self.records
    }

    pub fn record(&self, version: u32) -> Option<&VersionRecord> {
        self.records.get(version as usize)
    }

    /// Number the next materialized version will get.
    pub fn next_version_number(&self) -> u32 {
        self.records.len() as u32
    }

    /// Highest-scoring finalized version, earliest first on ties.
    pub fn best(&self) -> Option<&VersionRecord> {
        self.records
            .iter()
            .filter_map(|r| r.combined_score().map(|s| (r, s)))
            .fold(None, |best: Option<(&VersionRecord, f64)>, (r, s)| match best {
                Some((_, bs)) if bs >= s => best,
                _ => Some((r, s)),
            })
            .map(|(r, _)| r)
    }

    /// Current region contents of `version`, checked against the skeleton.
    pub fn regions_of(&self, version: u32) -> Result<Vec<Region>> {
        let record = self
            .record(version)
            .ok_or(EvolveError::UnknownVersion(version))?;
        let text = fs::read_to_string(&record.file_path)
            .map_err(|e| EvolveError::io(&record.file_path, e))?;
        let regions = locate_with(&text, &self.markers).map_err(|e| RewriteError::SkeletonChanged {
            expected: self.skeleton.len(),
            found: e.to_string(),
        })?;

        if regions.len() != self.skeleton.len() {
            return Err(RewriteError::CountMismatch {
                expected: self.skeleton.len(),
                got: regions.len(),
            }
            .into());
        }
        Ok(regions)
    }

    /// Materialize the next version from a full replacement set.
    ///
    /// `iteration` must be the next dense version number (at least 1) and
    /// `parent` an existing version.
    pub fn next_version(&mut self, replacements: &[Region], iteration: u32, parent: u32) -> Result<PathBuf> {
        let expected = self.next_version_number();
        if iteration != expected {
            return Err(EvolveError::InvalidIteration {
                iteration,
                reason: format!("next version is {expected}"),
            });
        }
        if self.record(parent).is_none() {
            return Err(EvolveError::UnknownVersion(parent));
        }

        let (path, text) = materialize_version(
            &self.base_path,
            replacements,
            iteration,
            &self.programs_dir,
            &self.markers,
        )?;

        let digest = ContentDigest::compute(text.as_bytes());
        if let Some(same) = self.records.iter().find(|r| r.content_digest == digest.to_hex()) {
            debug!(version = iteration, identical_to = same.version, "candidate repeats an earlier version");
        }
        emit_version_materialized(iteration, Some(parent), &path.display().to_string(), &digest.short());

        self.records.push(VersionRecord::new(
            iteration,
            path.clone(),
            Some(parent),
            digest.to_hex(),
        ));
        Ok(path)
    }

    /// Attach the final status to `version` and append it to the lineage log.
    ///
    /// The in-memory record only changes once the lineage line is on disk;
    /// a failed append leaves the version pending.
    pub fn finalize(&mut self, version: u32, status: VersionStatus) -> Result<&VersionRecord> {
        let lineage = self.records_dir.join(LINEAGE_FILE);
        let slot = self
            .records
            .get_mut(version as usize)
            .ok_or(EvolveError::UnknownVersion(version))?;
        let mut record = slot.clone();
        record.finalize(status)?;

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&lineage)
            .map_err(|e| EvolveError::io(&lineage, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| EvolveError::io(&lineage, e))?;

        emit_version_finalized(version, record.status.as_str(), record.combined_score());
        *slot = record;
        Ok(&*slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{EvaluationResult, MetricValue, COMBINED_SCORE};

    const PROGRAM: &str = "\
import random

# EVOLVE-BLOCK-START
def sort_array(arr):
    return sorted(arr)
# EVOLVE-BLOCK-END

print(sort_array([3, 1, 2]))
";

    fn setup() -> (tempfile::TempDir, VersionStore) {
        let dir = tempfile::tempdir().unwrap();
        let initial = dir.path().join("initial_program.py");
        fs::write(&initial, PROGRAM).unwrap();
        let store = VersionStore::open(dir.path().join("out"), &initial, Markers::default()).unwrap();
        (dir, store)
    }

    fn scored(score: f64) -> VersionStatus {
        let mut result = EvaluationResult::default();
        result
            .metrics
            .insert(COMBINED_SCORE.to_string(), MetricValue::Number(score));
        VersionStatus::Evaluated { result }
    }

    #[test]
    fn test_file_names() {
        assert_eq!(
            baseline_file_name(Path::new("/x/initial_program.py")),
            "v000_initial_program.py"
        );
        assert_eq!(
            version_file_name(Path::new("v000_initial_program.py"), 1),
            "iteration_001.py"
        );
        assert_eq!(version_file_name(Path::new("prog.rs"), 42), "iteration_042.rs");
        assert_eq!(version_file_name(Path::new("prog"), 1234), "iteration_1234");
    }

    #[test]
    fn test_open_seeds_version_zero() {
        let (dir, store) = setup();
        let base = dir.path().join("out/programs/v000_initial_program.py");
        assert_eq!(store.base_path(), base.as_path());
        assert_eq!(fs::read_to_string(&base).unwrap(), PROGRAM);
        assert!(dir.path().join("out/records").is_dir());
        assert_eq!(store.records().len(), 1);
        assert_eq!(store.next_version_number(), 1);
        assert_eq!(store.skeleton().len(), 1);
    }

    #[test]
    fn test_open_rejects_program_without_markers() {
        let dir = tempfile::tempdir().unwrap();
        let initial = dir.path().join("plain.py");
        fs::write(&initial, "print('hi')\n").unwrap();

        let err = VersionStore::open(dir.path().join("out"), &initial, Markers::default())
            .err()
            .unwrap();
        assert!(matches!(err, EvolveError::NoRegions(_)));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_open_missing_program_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = VersionStore::open(dir.path().join("out"), &dir.path().join("nope.py"), Markers::default())
            .err()
            .unwrap();
        assert!(matches!(err, EvolveError::Io { .. }));
    }

    #[test]
    fn test_next_version_materializes_from_base() {
        let (dir, mut store) = setup();
        let replacement = store.skeleton()[0].with_content("def sort_array(arr):\n    return list(arr)\n");
        let path = store.next_version(&[replacement], 1, 0).unwrap();

        assert_eq!(path, dir.path().join("out/programs/iteration_001.py"));
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("return list(arr)"));
        assert!(text.starts_with("import random\n\n# EVOLVE-BLOCK-START\n"));
        assert!(text.ends_with("# EVOLVE-BLOCK-END\n\nprint(sort_array([3, 1, 2]))\n"));

        let record = store.record(1).unwrap();
        assert_eq!(record.parent, Some(0));
        assert!(record.is_pending());
    }

    #[test]
    fn test_next_version_requires_dense_numbering() {
        let (_dir, mut store) = setup();
        let regions = store.skeleton().to_vec();

        let err = store.next_version(&regions, 0, 0).unwrap_err();
        assert!(matches!(err, EvolveError::InvalidIteration { iteration: 0, .. }));

        let err = store.next_version(&regions, 2, 0).unwrap_err();
        assert!(matches!(err, EvolveError::InvalidIteration { iteration: 2, .. }));
    }

    #[test]
    fn test_next_version_rejects_unknown_parent() {
        let (_dir, mut store) = setup();
        let regions = store.skeleton().to_vec();
        let err = store.next_version(&regions, 1, 7).unwrap_err();
        assert!(matches!(err, EvolveError::UnknownVersion(7)));
    }

    #[test]
    fn test_contract_error_leaves_no_file() {
        let (dir, mut store) = setup();
        let err = store.next_version(&[], 1, 0).unwrap_err();
        assert!(matches!(err, EvolveError::Contract(_)));
        assert!(!dir.path().join("out/programs/iteration_001.py").exists());
        assert_eq!(store.next_version_number(), 1);
    }

    #[test]
    fn test_finalize_appends_lineage() {
        let (dir, mut store) = setup();
        store.finalize(0, scored(0.2)).unwrap();
        let regions = store.skeleton().to_vec();
        store.next_version(&regions, 1, 0).unwrap();
        store
            .finalize(
                1,
                VersionStatus::Failed {
                    reason: "timed out".into(),
                    attempts: 2,
                },
            )
            .unwrap();

        let lineage = fs::read_to_string(dir.path().join("out/records/lineage.jsonl")).unwrap();
        let lines: Vec<&str> = lineage.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: VersionRecord = serde_json::from_str(lines[0]).unwrap();
        let second: VersionRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(first.version, 0);
        assert_eq!(second.version, 1);
        assert_eq!(second.combined_score(), Some(0.0));

        assert!(matches!(
            store.finalize(1, scored(1.0)),
            Err(EvolveError::AlreadyFinalized(1))
        ));
    }

    #[test]
    fn test_failed_lineage_append_leaves_version_pending() {
        let (dir, mut store) = setup();
        let lineage = dir.path().join("out/records/lineage.jsonl");
        fs::create_dir(&lineage).unwrap();

        let err = store.finalize(0, scored(0.4)).unwrap_err();
        assert!(matches!(err, EvolveError::Io { .. }));
        assert!(store.record(0).unwrap().is_pending());

        fs::remove_dir(&lineage).unwrap();
        store.finalize(0, scored(0.4)).unwrap();
        assert_eq!(store.record(0).unwrap().combined_score(), Some(0.4));
        assert_eq!(fs::read_to_string(&lineage).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_markers_in_replacement_leave_no_file() {
        let (dir, mut store) = setup();
        let bad = store.skeleton()[0].with_content("x = 1\n# EVOLVE-BLOCK-END\ny = 2\n");
        let err = store.next_version(&[bad], 1, 0).unwrap_err();

        assert!(matches!(err, EvolveError::Contract(RewriteError::SkeletonChanged { .. })));
        assert!(!dir.path().join("out/programs/iteration_001.py").exists());
        assert_eq!(store.next_version_number(), 1);
    }

    #[test]
    fn test_regions_of_reads_version_content() {
        let (_dir, mut store) = setup();
        let replacement = store.skeleton()[0].with_content("def sort_array(arr):\n    return arr\n");
        store.next_version(&[replacement], 1, 0).unwrap();

        let regions = store.regions_of(1).unwrap();
        assert_eq!(regions[0].content, "def sort_array(arr):\n    return arr\n");
        assert!(matches!(store.regions_of(9), Err(EvolveError::UnknownVersion(9))));
    }

    #[test]
    fn test_regions_of_detects_skeleton_drift() {
        let (_dir, mut store) = setup();
        let regions = store.skeleton().to_vec();
        let path = store.next_version(&regions, 1, 0).unwrap();
        fs::write(&path, "# EVOLVE-BLOCK-START\na\n# EVOLVE-BLOCK-END\n# EVOLVE-BLOCK-START\nb\n# EVOLVE-BLOCK-END\n").unwrap();

        let err = store.regions_of(1).unwrap_err();
        assert!(matches!(err, EvolveError::Contract(RewriteError::CountMismatch { expected: 1, got: 2 })));

        fs::write(&path, "# EVOLVE-BLOCK-START\n# EVOLVE-BLOCK-START\n# EVOLVE-BLOCK-END\n").unwrap();
        let err = store.regions_of(1).unwrap_err();
        assert!(matches!(err, EvolveError::Contract(RewriteError::SkeletonChanged { expected: 1, .. })));
    }

    #[test]
    fn test_best_prefers_highest_then_earliest() {
        let (_dir, mut store) = setup();
        store.finalize(0, scored(0.3)).unwrap();
        let regions = store.skeleton().to_vec();
        store.next_version(&regions, 1, 0).unwrap();
        store.finalize(1, scored(0.7)).unwrap();
        store.next_version(&regions, 2, 1).unwrap();
        store.finalize(2, scored(0.7)).unwrap();

        assert_eq!(store.best().unwrap().version, 1);
    }

    #[test]
    fn test_materialize_version_rejects_zero() {
        let dir = tempfile::tempdir().unwrap();
        let err = materialize_version(
            &dir.path().join("base.py"),
            &[],
            0,
            dir.path(),
            &Markers::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EvolveError::InvalidIteration { iteration: 0, .. }));
    }
}
