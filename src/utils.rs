//! Utility functions for common operations.

use crate::error::PersistenceError;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Writes `contents` to `path` so that readers see either the old file or
/// the complete new one, never a partial write.
///
/// The data goes to a temporary file in the same directory, is flushed to
/// disk, and then renamed over the target. Missing parent directories are
/// created.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;

    let mut file = NamedTempFile::new_in(dir).map_err(|e| PersistenceError::io(dir, e))?;
    file.write_all(contents)
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| PersistenceError::io(path, e))?;
    file.persist(path)
        .map_err(|e| PersistenceError::io(path, e.error))?;

    Ok(())
}

/// Returns the first `max_chars` characters of `text` on one line,
/// with an ellipsis when something was cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();

    if flat.chars().count() > max_chars {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}
