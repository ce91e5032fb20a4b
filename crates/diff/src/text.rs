use similar::{Algorithm, TextDiff};
use vigil_core::{Error, Result};

const CONTEXT_LINES: usize = 3;

/// Unified line diff from `previous` to `current`. Empty when the texts are equal.
pub fn diff_lines(previous: &[u8], current: &[u8]) -> Result<Vec<u8>> {
    if previous == current {
        return Ok(Vec::new());
    }
    let old = std::str::from_utf8(previous).map_err(|e| Error::Diff(format!("previous manifest: {}", e)))?;
    let new = std::str::from_utf8(current).map_err(|e| Error::Diff(format!("current manifest: {}", e)))?;
    let diff = TextDiff::configure().algorithm(Algorithm::Myers).diff_lines(old, new);
    let text = diff.unified_diff().context_radius(CONTEXT_LINES).header("previous", "current").to_string();
    tracing::trace!(bytes = text.len(), "line diff computed");
    Ok(text.into_bytes())
}
