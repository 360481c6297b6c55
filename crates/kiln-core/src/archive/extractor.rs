//! Extractor trait and the entry materialization shared by every format

use crate::error::IoContext;
use crate::path::{relative_to, resolve};
use crate::plan::DestinationPlan;
use crate::progress::Progress;
use crate::session::InstallOptions;
use crate::sniff::ArchiveSource;
use crate::{Error, Result};
use filetime::FileTime;
use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Permission bits removed from every extracted file
pub const GROUP_OTHER_MASK: u32 = 0o077;

/// Mode used for directories created during extraction
pub const PRIVATE_DIR_MODE: u32 = 0o700;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Whether a Unix mode word (type bits included) describes a symbolic link
pub fn is_symlink_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

/// Kind of an archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file with contents
    File,
    /// Directory
    Dir,
    /// Symbolic link to the target, verbatim
    Symlink(PathBuf),
    /// Hard link to another entry of the same archive, by archive path
    HardLink(String),
    /// Entry without a data stream; an empty file when `empty_file` is set
    EmptyMarker { empty_file: bool },
}

/// One unit of an archive, produced in archive order
#[derive(Debug, Clone)]
pub struct Entry {
    /// Path within the archive, `/`-separated
    pub path: String,
    /// Uncompressed size in bytes
    pub size: u64,
    /// Unix permission bits
    pub mode: u32,
    /// What the entry is
    pub kind: EntryKind,
    /// Modification time (Unix timestamp)
    pub mtime: Option<i64>,
    /// Access time (Unix timestamp), where the format records one
    pub atime: Option<i64>,
}

impl Entry {
    pub fn new(path: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            size: 0,
            mode: 0o644,
            kind,
            mtime: None,
            atime: None,
        }
    }
}

/// Result of running an extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Entries were written to the staging root; the session finalizes
    Extracted,
    /// A nested session already installed the destination
    Delegated,
}

/// Everything an extractor needs besides the source
pub struct ExtractContext<'a> {
    /// Staging root all entries are written under
    pub root: &'a Path,
    /// The install request being served
    pub plan: &'a DestinationPlan,
    /// Session limits, including the current nesting depth
    pub options: &'a InstallOptions,
    /// Progress observer
    pub progress: &'a Arc<dyn Progress>,
}

impl ExtractContext<'_> {
    /// Leading segments stripped from entry paths
    pub fn strip(&self) -> usize {
        self.plan.strip
    }

    /// Resolve and materialize one entry, copying its data from `data`.
    ///
    /// Returns `Ok(false)` when the strip policy skipped the entry.
    pub fn unpack(&self, entry: &Entry, data: &mut dyn Read) -> Result<bool> {
        let Some(dest) = resolve(self.root, &entry.path, self.strip())? else {
            trace!("  {} (skipped)", entry.path);
            return Ok(false);
        };
        trace!("  {} -> {}", entry.path, dest.display());

        match &entry.kind {
            EntryKind::Dir => create_private_dir(&dest)?,
            EntryKind::File => {
                write_file(&dest, entry, data)?;
            }
            EntryKind::Symlink(target) => {
                ensure_parent(&dest)?;
                symlink(target, &dest)?;
            }
            EntryKind::HardLink(target) => {
                let original = resolve(self.root, target, self.strip())?.ok_or_else(|| {
                    Error::InvalidPath(format!(
                        "{}: hard link target {:?} is stripped away",
                        entry.path, target
                    ))
                })?;
                let parent = dest.parent().unwrap_or(self.root);
                ensure_parent(&dest)?;
                // Relative symlinks survive relocation of the installed tree
                symlink(&relative_to(parent, &original), &dest)?;
            }
            EntryKind::EmptyMarker { empty_file: true } => {
                write_file(&dest, entry, &mut io::empty())?;
            }
            EntryKind::EmptyMarker { empty_file: false } => {}
        }
        Ok(true)
    }
}

/// Capability implemented once per archive format
pub trait Extractor {
    /// Short name used in logs and errors
    fn format_name(&self) -> &'static str;

    /// Materialize every entry of `source` under `ctx.root`
    fn extract(&self, source: ArchiveSource, ctx: &ExtractContext<'_>) -> Result<Outcome>;
}

/// Create a directory and its parents, owner-only
pub fn create_private_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new()
            .recursive(true)
            .mode(PRIVATE_DIR_MODE)
            .create(path)
            .at("mkdir", path)
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(path).at("mkdir", path)
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => create_private_dir(parent),
        None => Ok(()),
    }
}

/// Create `path` exclusively, copy `data` into it and restore timestamps
pub fn write_file(path: &Path, entry: &Entry, data: &mut dyn Read) -> Result<u64> {
    ensure_parent(path)?;

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(entry.mode & 0o7777 & !GROUP_OTHER_MASK);
    }

    let mut file = options.open(path).at("create", path)?;
    let written = io::copy(data, &mut file).at("write", path)?;
    drop(file);

    restore_times(path, entry);
    Ok(written)
}

/// Best effort: an entry without usable timestamps keeps the extraction time
fn restore_times(path: &Path, entry: &Entry) {
    let Some(mtime) = entry.mtime else {
        return;
    };
    let mtime = FileTime::from_unix_time(mtime, 0);
    let atime = entry
        .atime
        .map(|atime| FileTime::from_unix_time(atime, 0))
        .unwrap_or(mtime);
    if let Err(e) = filetime::set_file_times(path, atime, mtime) {
        debug!(path = ?path, error = %e, "Could not restore timestamps");
    }
}

/// Create a symbolic link at `link` pointing to `target`
pub fn symlink(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link).map_err(|source| Error::IoAt {
            op: "symlink",
            path: link.to_path_buf(),
            source: io::Error::new(
                source.kind(),
                format!("failed to create symlink to {}: {}", target.display(), source),
            ),
        })
    }
    #[cfg(not(unix))]
    {
        let _ = (target, link);
        Err(Error::UnsupportedOperation(
            "symbolic links are only supported on Unix".to_string(),
        ))
    }
}
