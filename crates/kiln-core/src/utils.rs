//! Utility functions for kiln-core

use std::path::Path;
use walkdir::WalkDir;

/// Calculate the total size of a path (file or directory) in bytes
///
/// Symbolic links are counted by their own size, never followed.
///
/// # Arguments
/// * `path` - The path to calculate size for
///
/// # Returns
/// The total size in bytes, or 0 if the path cannot be accessed
pub fn calculate_path_size<P: AsRef<Path>>(path: P) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// Count regular files and symlinks under `path`
pub fn count_entries<P: AsRef<Path>>(path: P) -> usize {
    WalkDir::new(path)
        .min_depth(1)
        .into_iter()
        .flatten()
        .filter(|entry| !entry.file_type().is_dir())
        .count()
}
