//! Marker scanning: validation and region extraction.

use std::ops::Range;

use tracing::debug;

use super::error::{ParseError, ParseResult};
use super::model::{Markers, Region};

/// Location of one region inside a program text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Span {
    pub id: usize,
    pub start_line: usize,
    pub end_line: usize,
    /// Byte range of the body (between the marker lines).
    pub body: Range<usize>,
    /// Whether the start-marker line is terminated by `\r\n`.
    pub crlf: bool,
}

/// Iterate over lines with their terminators and byte offsets.
fn lines_with_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split_inclusive('\n').scan(0usize, |offset, line| {
        let start = *offset;
        *offset += line.len();
        Some((start, line))
    })
}

/// Walk `text` with a single-entry nesting stack, reporting every closed
/// region to `on_region`. Returns the number of regions.
pub(crate) fn walk<F>(text: &str, markers: &Markers, mut on_region: F) -> ParseResult<usize>
where
    F: FnMut(Span),
{
    // (line index, body start offset, crlf)
    let mut open: Option<(usize, usize, bool)> = None;
    let mut count = 0usize;

    for (index, (offset, line)) in lines_with_offsets(text).enumerate() {
        if markers.is_start(line) {
            if let Some((open_line, _, _)) = open {
                return Err(ParseError::NestedStart {
                    line: index + 1,
                    open_line: open_line + 1,
                });
            }
            open = Some((index, offset + line.len(), line.ends_with("\r\n")));
        } else if markers.is_end(line) {
            let Some((start_line, body_start, crlf)) = open.take() else {
                return Err(ParseError::UnmatchedEnd { line: index + 1 });
            };
            on_region(Span {
                id: count,
                start_line,
                end_line: index,
                body: body_start..offset,
                crlf,
            });
            count += 1;
        }
    }

    match open {
        Some((start_line, _, _)) => Err(ParseError::MissingEndMarker {
            line: start_line + 1,
        }),
        None => Ok(count),
    }
}

/// Collect the spans of every region in `text`.
pub(crate) fn scan(text: &str, markers: &Markers) -> ParseResult<Vec<Span>> {
    let mut spans = Vec::new();
    walk(text, markers, |span| spans.push(span))?;
    Ok(spans)
}

/// Extract all regions from `text` using the default markers.
pub fn locate(text: &str) -> ParseResult<Vec<Region>> {
    locate_with(text, &Markers::default())
}

/// Extract all regions from `text`, ids assigned in order of appearance.
///
/// A text without any markers yields an empty list; use [`validate`] to
/// require at least one region.
pub fn locate_with(text: &str, markers: &Markers) -> ParseResult<Vec<Region>> {
    let mut regions = Vec::new();
    walk(text, markers, |span| {
        regions.push(Region::new(
            span.id,
            span.start_line,
            span.end_line,
            &text[span.body],
        ));
    })?;
    debug!(regions = regions.len(), "located regions");
    Ok(regions)
}

/// Check that `text` holds at least one well-formed, non-nested region,
/// using the default markers.
pub fn validate(text: &str) -> bool {
    validate_with(text, &Markers::default())
}

/// Check that `text` holds at least one well-formed, non-nested region.
///
/// True iff the start and end marker counts are equal, both are at least
/// one, and every start is closed before the next one opens.
pub fn validate_with(text: &str, markers: &Markers) -> bool {
    let starts = text.matches(markers.start.as_str()).count();
    let ends = text.matches(markers.end.as_str()).count();
    debug!(starts, ends, "marker counts");

    if starts == 0 || ends == 0 || starts != ends {
        return false;
    }

    match walk(text, markers, |_| {}) {
        Ok(count) => count == starts,
        Err(e) => {
            debug!(error = %e, "structure check failed");
            false
        }
    }
}

/// Render a human-readable listing of regions (1-based line numbers).
pub fn describe_regions(label: &str, regions: &[Region]) -> String {
    if regions.is_empty() {
        return format!("No EVOLVE-BLOCKs found in {label}\n");
    }

    let mut out = format!("Found {} EVOLVE-BLOCK(s) in {label}:\n\n", regions.len());
    for region in regions {
        out.push_str(&format!("Block ID: {}\n", region.id));
        out.push_str(&format!(
            "Lines: {} to {}\n",
            region.start_line + 1,
            region.end_line + 1
        ));
        out.push_str(&format!("Content:\n{}\n", region.content));
        out.push_str(&"-".repeat(60));
        out.push_str("\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_REGIONS: &str = "\
import random

# EVOLVE-BLOCK-START
def a():
    return 1
# EVOLVE-BLOCK-END

# EVOLVE-BLOCK-START
def b():
    return 2
# EVOLVE-BLOCK-END
print(a() + b())
";

    #[test]
    fn test_locate_two_regions() {
        let regions = locate(TWO_REGIONS).unwrap();
        assert_eq!(regions.len(), 2);

        assert_eq!(regions[0].id, 0);
        assert_eq!(regions[0].start_line, 2);
        assert_eq!(regions[0].end_line, 5);
        assert_eq!(regions[0].content, "def a():\n    return 1\n");

        assert_eq!(regions[1].id, 1);
        assert_eq!(regions[1].start_line, 7);
        assert_eq!(regions[1].end_line, 10);
        assert_eq!(regions[1].content, "def b():\n    return 2\n");
    }

    #[test]
    fn test_locate_empty_body() {
        let text = "x = 1\n# EVOLVE-BLOCK-START\n# EVOLVE-BLOCK-END\n";
        let regions = locate(text).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].content, "");
        assert_eq!(regions[0].start_line, 1);
        assert_eq!(regions[0].end_line, 2);
    }

    #[test]
    fn test_locate_without_markers_is_empty() {
        let regions = locate("print('hello')\n").unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn test_locate_missing_end_marker_reports_start_line() {
        let text = "a\nb\n# EVOLVE-BLOCK-START\nbody\n";
        let err = locate(text).unwrap_err();
        assert_eq!(err, ParseError::MissingEndMarker { line: 3 });
    }

    #[test]
    fn test_locate_rejects_nested_start() {
        let text = "# EVOLVE-BLOCK-START\n# EVOLVE-BLOCK-START\nx\n# EVOLVE-BLOCK-END\n# EVOLVE-BLOCK-END\n";
        let err = locate(text).unwrap_err();
        assert_eq!(
            err,
            ParseError::NestedStart {
                line: 2,
                open_line: 1
            }
        );
    }

    #[test]
    fn test_locate_rejects_unmatched_end() {
        let text = "x\n# EVOLVE-BLOCK-END\n";
        let err = locate(text).unwrap_err();
        assert_eq!(err, ParseError::UnmatchedEnd { line: 2 });
    }

    #[test]
    fn test_locate_preserves_crlf_in_content() {
        let text = "# EVOLVE-BLOCK-START\r\nreturn 0\r\n# EVOLVE-BLOCK-END\r\n";
        let regions = locate(text).unwrap();
        assert_eq!(regions[0].content, "return 0\r\n");
    }

    #[test]
    fn test_locate_end_marker_without_trailing_newline() {
        let text = "# EVOLVE-BLOCK-START\nbody\n# EVOLVE-BLOCK-END";
        let regions = locate(text).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].content, "body\n");
    }

    #[test]
    fn test_locate_indented_markers() {
        let text = "fn main() {\n    // EVOLVE-BLOCK-START\n    let x = 1;\n    // EVOLVE-BLOCK-END\n}\n";
        let regions = locate(text).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].content, "    let x = 1;\n");
    }

    #[test]
    fn test_locate_with_custom_markers() {
        let markers = Markers::new("@mutable-begin", "@mutable-end");
        let text = "-- @mutable-begin\nselect 1;\n-- @mutable-end\n";
        let regions = locate_with(text, &markers).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].content, "select 1;\n");

        // Default markers do not see custom ones.
        assert!(locate(text).unwrap().is_empty());
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        assert!(validate(TWO_REGIONS));
    }

    #[test]
    fn test_validate_rejects_no_markers() {
        assert!(!validate("def f():\n    pass\n"));
    }

    #[test]
    fn test_validate_rejects_mismatched_counts() {
        assert!(!validate("# EVOLVE-BLOCK-START\nx\n"));
        assert!(!validate("x\n# EVOLVE-BLOCK-END\n"));
    }

    #[test]
    fn test_validate_rejects_nested() {
        let text = "# EVOLVE-BLOCK-START\n# EVOLVE-BLOCK-START\n# EVOLVE-BLOCK-END\n# EVOLVE-BLOCK-END\n";
        assert!(!validate(text));
    }

    #[test]
    fn test_validate_rejects_end_before_start() {
        let text = "# EVOLVE-BLOCK-END\n# EVOLVE-BLOCK-START\n";
        assert!(!validate(text));
    }

    #[test]
    fn test_describe_regions() {
        let regions = locate(TWO_REGIONS).unwrap();
        let listing = describe_regions("prog.py", &regions);
        assert!(listing.starts_with("Found 2 EVOLVE-BLOCK(s) in prog.py"));
        assert!(listing.contains("Block ID: 1"));
        assert!(listing.contains("Lines: 3 to 6"));
        assert!(listing.contains("def b():"));
    }

    #[test]
    fn test_describe_no_regions() {
        assert_eq!(
            describe_regions("empty.py", &[]),
            "No EVOLVE-BLOCKs found in empty.py\n"
        );
    }
}
