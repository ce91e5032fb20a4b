//! Manifest cleaning and line diffs.
//!
//! Both operate on JSON bytes: the cleaner strips fields that change on every
//! reconcile and re-indents, so that the line diff only reports user-visible edits.

#![forbid(unsafe_code)]

mod clean;
mod text;

pub use clean::{pretty_json, ManifestCleaner, DEFAULT_ANNOTATIONS_TO_CLEAN};
pub use text::diff_lines;
