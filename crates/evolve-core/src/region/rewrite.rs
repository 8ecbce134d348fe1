//! Region substitution with byte-exact preservation of everything else.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::error::{RewriteError, RewriteResult};
use super::locate::{scan, Span};
use super::model::{Markers, Region};
use crate::error::{EvolveError, Result};

/// Replace region bodies in `original` using the default markers.
pub fn rewrite(original: &str, replacements: &[Region]) -> RewriteResult<String> {
    rewrite_with(original, replacements, &Markers::default())
}

/// Replace every region body in `original` with the content of the
/// replacement carrying the same id.
///
/// The replacement set must cover the current skeleton exactly: same
/// count, and once sorted by id, the same id sequence. Marker lines and
/// all text outside regions are copied verbatim. Non-empty content that
/// does not end in a line terminator gets one appended so the end marker
/// stays on its own line.
pub fn rewrite_with(
    original: &str,
    replacements: &[Region],
    markers: &Markers,
) -> RewriteResult<String> {
    let spans = scan(original, markers)?;
    let ordered = check_replacements(&spans, replacements)?;

    let extra: usize = ordered.iter().map(|r| r.content.len() + 2).sum();
    let mut out = String::with_capacity(original.len() + extra);
    let mut cursor = 0usize;

    for (span, replacement) in spans.iter().zip(ordered) {
        out.push_str(&original[cursor..span.body.start]);
        push_body(&mut out, &replacement.content, span.crlf);
        cursor = span.body.end;
        debug!(
            region = span.id,
            bytes = replacement.content.len(),
            "replaced region body"
        );
    }
    out.push_str(&original[cursor..]);

    check_skeleton(&out, spans.len(), markers)?;
    Ok(out)
}

/// Read `original_path`, rewrite it, and write the result to `dest`.
///
/// The output is built fully in memory and persisted atomically through a
/// temporary file in the destination directory; `original_path` is never
/// modified and nothing is written when the replacements are rejected.
/// Returns the new text.
pub fn rewrite_file(
    original_path: &Path,
    replacements: &[Region],
    dest: &Path,
    markers: &Markers,
) -> Result<String> {
    let original =
        fs::read_to_string(original_path).map_err(|e| EvolveError::io(original_path, e))?;
    let text = rewrite_with(&original, replacements, markers)?;

    write_atomic(dest, text.as_bytes()).map_err(|e| EvolveError::io(dest, e))?;
    info!(dest = %dest.display(), regions = replacements.len(), "wrote rewritten program");
    Ok(text)
}

/// Write `data` to `path` in one step: temp file in the same directory,
/// then rename. Parent directories are created as needed.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Sort replacements by id and check them against the skeleton.
fn check_replacements<'a>(
    spans: &[Span],
    replacements: &'a [Region],
) -> RewriteResult<Vec<&'a Region>> {
    if replacements.len() != spans.len() {
        return Err(RewriteError::CountMismatch {
            expected: spans.len(),
            got: replacements.len(),
        });
    }

    let mut ordered: Vec<&Region> = replacements.iter().collect();
    ordered.sort_by_key(|r| r.id);

    let matches = ordered.iter().zip(spans).all(|(r, s)| r.id == s.id);
    if !matches {
        return Err(RewriteError::IdMismatch {
            expected: spans.iter().map(|s| s.id).collect(),
            got: ordered.iter().map(|r| r.id).collect(),
        });
    }

    Ok(ordered)
}

/// The rewritten text must still parse to `expected` regions.
fn check_skeleton(text: &str, expected: usize, markers: &Markers) -> RewriteResult<()> {
    let found = match scan(text, markers) {
        Ok(after) if after.len() == expected => return Ok(()),
        Ok(after) => format!("found {}", after.len()),
        Err(e) => e.to_string(),
    };
    Err(RewriteError::SkeletonChanged { expected, found })
}

fn push_body(out: &mut String, content: &str, crlf: bool) {
    out.push_str(content);
    if !content.is_empty() && !content.ends_with('\n') {
        out.push_str(if crlf { "\r\n" } else { "\n" });
    }
}
