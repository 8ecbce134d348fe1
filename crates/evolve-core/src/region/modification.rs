//! Modification documents: per-region replacement text.
//!
//! Format:
//!
//! ```text
//! PARENT: 2
//! BLOCK_ID: 0
//! <new content for region 0>
//! ---
//! BLOCK_ID: 1
//! <new content for region 1>
//! ```
//!
//! `PARENT` is optional and must come first. Sections are separated by a
//! line holding only `---`. Content lines are kept verbatim.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::error::{ModificationError, RewriteError, RewriteResult};
use super::model::Region;

const BLOCK_HEADER: &str = "BLOCK_ID:";
const PARENT_HEADER: &str = "PARENT:";
const SEPARATOR: &str = "---";

/// New content for one region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegionChange {
    pub id: usize,
    pub content: String,
}

impl RegionChange {
    pub fn new(id: usize, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }
}

/// A parsed modification document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modifications {
    /// Version the changes apply on top of, if stated.
    pub parent: Option<u32>,
    pub changes: Vec<RegionChange>,
}

impl Modifications {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Parse a modification document.
pub fn parse_modifications(text: &str) -> Result<Modifications, ModificationError> {
    let mut mods = Modifications::default();
    let mut seen = BTreeSet::new();
    let mut current: Option<RegionChange> = None;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();

        if trimmed == SEPARATOR {
            if let Some(change) = current.take() {
                push_change(&mut mods, &mut seen, change)?;
            }
            continue;
        }

        if let Some(change) = current.as_mut() {
            change.content.push_str(line);
            continue;
        }

        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix(PARENT_HEADER) {
            if mods.parent.is_some() || !mods.changes.is_empty() {
                return Err(ModificationError::MissingHeader {
                    header: trimmed.to_string(),
                });
            }
            let parent = rest
                .trim()
                .parse::<u32>()
                .map_err(|_| ModificationError::InvalidParent {
                    header: trimmed.to_string(),
                })?;
            mods.parent = Some(parent);
        } else if let Some(rest) = trimmed.strip_prefix(BLOCK_HEADER) {
            let id = rest
                .trim()
                .parse::<usize>()
                .map_err(|_| ModificationError::InvalidBlockId {
                    header: trimmed.to_string(),
                })?;
            current = Some(RegionChange::new(id, String::new()));
        } else {
            return Err(ModificationError::MissingHeader {
                header: trimmed.to_string(),
            });
        }
    }

    if let Some(change) = current.take() {
        push_change(&mut mods, &mut seen, change)?;
    }

    Ok(mods)
}

fn push_change(
    mods: &mut Modifications,
    seen: &mut BTreeSet<usize>,
    change: RegionChange,
) -> Result<(), ModificationError> {
    if !seen.insert(change.id) {
        return Err(ModificationError::DuplicateBlockId { id: change.id });
    }
    mods.changes.push(change);
    Ok(())
}

/// Build a full replacement set: regions named in `changes` get the new
/// content, every other region keeps its content from `current`.
///
/// A change naming an id outside `current` is an id mismatch.
pub fn merge_changes(current: &[Region], changes: &[RegionChange]) -> RewriteResult<Vec<Region>> {
    let known = |id: usize| current.iter().any(|r| r.id == id);
    if !changes.iter().all(|c| known(c.id)) {
        let mut got: Vec<usize> = changes.iter().map(|c| c.id).collect();
        got.sort_unstable();
        return Err(RewriteError::IdMismatch {
            expected: current.iter().map(|r| r.id).collect(),
            got,
        });
    }

    Ok(current
        .iter()
        .map(|region| match changes.iter().find(|c| c.id == region.id) {
            Some(change) => region.with_content(change.content.as_str()),
            None => region.clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_blocks() {
        let doc = "BLOCK_ID: 0\ndef a():\n    return 1\n---\nBLOCK_ID: 1\ndef b():\n    return 2\n";
        let mods = parse_modifications(doc).unwrap();
        assert_eq!(mods.parent, None);
        assert_eq!(
            mods.changes,
            vec![
                RegionChange::new(0, "def a():\n    return 1\n"),
                RegionChange::new(1, "def b():\n    return 2\n"),
            ]
        );
    }

    #[test]
    fn test_parse_keeps_indentation() {
        let doc = "BLOCK_ID: 0\n    indented = True\n";
        let mods = parse_modifications(doc).unwrap();
        assert_eq!(mods.changes[0].content, "    indented = True\n");
    }

    #[test]
    fn test_parse_parent() {
        let doc = "PARENT: 3\n\nBLOCK_ID: 0\nx = 1\n---\n";
        let mods = parse_modifications(doc).unwrap();
        assert_eq!(mods.parent, Some(3));
        assert_eq!(mods.changes.len(), 1);
    }

    #[test]
    fn test_parse_empty_document() {
        let mods = parse_modifications("  \n\n").unwrap();
        assert!(mods.is_empty());
        assert_eq!(mods.parent, None);
    }

    #[test]
    fn test_parse_rejects_missing_header() {
        let err = parse_modifications("def a():\n    pass\n").unwrap_err();
        assert_eq!(
            err,
            ModificationError::MissingHeader {
                header: "def a():".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_block_id() {
        let err = parse_modifications("BLOCK_ID: one\nx\n").unwrap_err();
        assert!(matches!(err, ModificationError::InvalidBlockId { .. }));
    }

    #[test]
    fn test_parse_rejects_late_parent() {
        let err = parse_modifications("BLOCK_ID: 0\nx\n---\nPARENT: 1\n").unwrap_err();
        assert!(matches!(err, ModificationError::MissingHeader { .. }));
    }

    #[test]
    fn test_parse_rejects_duplicate_id() {
        let err = parse_modifications("BLOCK_ID: 0\nx\n---\nBLOCK_ID: 0\ny\n").unwrap_err();
        assert_eq!(err, ModificationError::DuplicateBlockId { id: 0 });
    }

    #[test]
    fn test_merge_fills_unchanged_regions() {
        let current = vec![Region::new(0, 0, 2, "a\n"), Region::new(1, 3, 5, "b\n")];
        let merged = merge_changes(&current, &[RegionChange::new(1, "B\n")]).unwrap();
        assert_eq!(merged[0].content, "a\n");
        assert_eq!(merged[1].content, "B\n");
        assert_eq!(merged[1].start_line, 3);
    }

    #[test]
    fn test_merge_applies_first_change_for_a_region() {
        let current = vec![Region::new(0, 0, 2, "a\n")];
        let changes = [RegionChange::new(0, "first\n"), RegionChange::new(0, "second\n")];
        let merged = merge_changes(&current, &changes).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "first\n");
    }

    #[test]
    fn test_merge_rejects_unknown_id() {
        let current = vec![Region::new(0, 0, 2, "a\n")];
        let err = merge_changes(&current, &[RegionChange::new(4, "x\n")]).unwrap_err();
        assert_eq!(
            err,
            RewriteError::IdMismatch {
                expected: vec![0],
                got: vec![4]
            }
        );
    }
}
