//! Mapping of archive-internal paths onto the extraction root

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::error;

/// Resolve an archive entry path beneath `dest`, dropping `strip` leading segments.
///
/// The entry path is split on `/`. When it has no more than `strip` segments
/// nothing remains after stripping and `Ok(None)` is returned: the caller must
/// skip the entry entirely, including any directory creation. Empty and `.`
/// segments in the remainder are ignored, so the result is always `dest` or a
/// path beneath it. A `..` segment in the remainder would escape `dest` and is
/// rejected.
///
/// # Examples
///
/// ```
/// use kiln_core::path::resolve;
/// use std::path::Path;
///
/// let dest = Path::new("/out");
/// assert_eq!(resolve(dest, "pkg/bin/tool", 1).unwrap(), Some(dest.join("bin/tool")));
/// assert_eq!(resolve(dest, "pkg", 1).unwrap(), None);
/// ```
pub fn resolve(dest: &Path, entry_path: &str, strip: usize) -> Result<Option<PathBuf>> {
    let segments: Vec<&str> = entry_path.split('/').collect();
    if segments.len() <= strip {
        return Ok(None);
    }

    let mut result = dest.to_path_buf();
    for segment in &segments[strip..] {
        match *segment {
            "" | "." => {}
            ".." => {
                error!(path = entry_path, "Entry path escapes the extraction root");
                return Err(Error::InvalidPath(format!(
                    "Path traversal attempt detected: {:?}",
                    entry_path
                )));
            }
            name => result.push(name),
        }
    }

    Ok(Some(result))
}

/// Relative path from directory `from` to `to`, both lexically normalized under the same root.
pub(crate) fn relative_to(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from.components().collect();
    let to: Vec<_> = to.components().collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &to[common..] {
        rel.push(component.as_os_str());
    }
    rel
}
