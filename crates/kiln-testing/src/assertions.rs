//! Common assertions over installed trees

use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Relative paths of every entry below `dir`, sorted, `/`-separated
pub fn list_tree(dir: &Path) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(dir)?;
        entries.push(
            relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/"),
        );
    }
    entries.sort();
    Ok(entries)
}

/// Asserts that the file at `dir/relative` holds exactly `expected`
pub fn assert_file_content(dir: &Path, relative: &str, expected: &[u8]) -> Result<()> {
    let path = dir.join(relative);
    let content = std::fs::read(&path)?;
    assert_eq!(content, expected, "Content mismatch for {:?}", path);
    Ok(())
}

/// Asserts that a file has specific permissions (Unix only)
#[cfg(unix)]
pub fn assert_file_permissions(path: &Path, expected: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)?;
    let mode = metadata.permissions().mode() & 0o777;

    assert_eq!(
        mode, expected,
        "Permission mismatch for {:?}: expected {:o}, got {:o}",
        path, expected, mode
    );

    Ok(())
}

/// Asserts that nothing below `dir` is writable; `dir` itself must be 0700
#[cfg(unix)]
pub fn assert_read_only_tree(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    assert_file_permissions(dir, 0o700)?;
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry?;
        if entry.path_is_symlink() {
            continue;
        }
        let mode = entry.metadata()?.permissions().mode();
        assert_eq!(
            mode & 0o222,
            0,
            "{:?} is still writable ({:o})",
            entry.path(),
            mode & 0o777
        );
    }
    Ok(())
}

/// Staging directories (`<name>-*`) left in `parent`
pub fn staging_leftovers(parent: &Path, name: &str) -> Result<Vec<PathBuf>> {
    let prefix = format!("{}-", name);
    let mut leftovers = Vec::new();
    for entry in std::fs::read_dir(parent)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            leftovers.push(entry.path());
        }
    }
    Ok(leftovers)
}

/// Give the owner write access to every directory below `dir`
pub fn make_writable(dir: &Path) {
    for entry in WalkDir::new(dir).into_iter().flatten() {
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Ok(metadata) = entry.metadata() {
            let mut permissions = metadata.permissions();
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                permissions.set_mode(permissions.mode() | 0o700);
            }
            #[cfg(not(unix))]
            permissions.set_readonly(false);
            let _ = std::fs::set_permissions(entry.path(), permissions);
        }
    }
}
