//! Region protocol: locate, validate, extract and replace marker-delimited
//! regions while leaving every other byte of the program untouched.
//!
//! # Modules
//!
//! - [`model`]        — `Region` value type and `Markers`
//! - [`locate`]       — `locate()`, `validate()` (single-entry nesting stack)
//! - [`rewrite`]      — `rewrite()`, `rewrite_file()` (byte-exact substitution)
//! - [`modification`] — `BLOCK_ID:` documents and `merge_changes()`
//! - [`error`]        — `ParseError`, `RewriteError`, `ModificationError`

pub mod error;
pub mod locate;
pub mod model;
pub mod modification;
pub mod rewrite;

pub use error::{ModificationError, ParseError, ParseResult, RewriteError, RewriteResult};
pub use locate::{describe_regions, locate, locate_with, validate, validate_with};
pub use model::{Markers, Region, DEFAULT_END_MARKER, DEFAULT_START_MARKER};
pub use modification::{merge_changes, parse_modifications, Modifications, RegionChange};
pub use rewrite::{rewrite, rewrite_file, rewrite_with, write_atomic};
