//! Install sessions: stage, extract, finalize
//!
//! A session extracts into a private staging directory next to the
//! destination and only renames it into place once everything succeeded.
//! On any failure the staging directory is removed and the destination is
//! left untouched.

use crate::archive::extractor::create_private_dir;
use crate::archive::{extractor_for, ExtractContext, Outcome};
use crate::config::{Config, InstallConfig, DEFAULT_MAX_NESTING};
use crate::error::IoContext;
use crate::plan::DestinationPlan;
use crate::platform::PlatformInstaller;
use crate::progress::{NoProgress, Progress, Total};
use crate::sniff;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Limits and environment for an install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Maximum depth of packages nested inside packages
    pub max_nesting: usize,
    /// Nesting depth of this session; 0 for the outermost
    pub depth: usize,
    /// Where disk image applications are linked (defaults to ~/Applications)
    pub applications_dir: Option<PathBuf>,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            max_nesting: DEFAULT_MAX_NESTING,
            depth: 0,
            applications_dir: None,
        }
    }
}

impl InstallOptions {
    /// Options for a top-level session as configured
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_nesting: config.install.max_nesting,
            depth: 0,
            applications_dir: config.install.applications_dir.clone(),
        }
    }

    /// Options for a session installing a payload found inside `path`
    pub(crate) fn nested(&self, path: &Path) -> Result<Self> {
        let depth = self.depth + 1;
        if depth > self.max_nesting {
            return Err(Error::NestingTooDeep {
                path: path.to_path_buf(),
                depth,
                limit: self.max_nesting,
            });
        }
        Ok(Self {
            depth,
            ..self.clone()
        })
    }

    /// Resolve the applications directory
    pub fn applications_dir(&self) -> Result<PathBuf> {
        match &self.applications_dir {
            Some(dir) => Ok(dir.clone()),
            None => InstallConfig::default().applications_dir(),
        }
    }
}

/// One install of one source into one destination
pub struct InstallSession<'a> {
    plan: &'a DestinationPlan,
    progress: Arc<dyn Progress>,
    options: InstallOptions,
}

impl<'a> InstallSession<'a> {
    /// Create a session for `plan` with default options and no progress output
    pub fn new(plan: &'a DestinationPlan) -> Self {
        Self {
            plan,
            progress: Arc::new(NoProgress),
            options: InstallOptions::default(),
        }
    }

    /// Report progress to `progress`
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Use `options` instead of the defaults
    pub fn with_options(mut self, options: InstallOptions) -> Self {
        self.options = options;
        self
    }

    /// Install `source` to the plan's destination.
    ///
    /// On success the destination holds the complete, read-only tree. On
    /// failure it does not exist and no staging directory is left behind.
    pub fn install(&self, source: &Path) -> Result<()> {
        let dest = &self.plan.dest;
        info!("Installing {:?} to {:?}", source, dest);

        let result = self.run(source);
        if self.options.depth == 0 {
            self.progress.finish();
        }

        match &result {
            Ok(()) => info!("Installed {:?}", dest),
            Err(e) => debug!("Install of {:?} aborted: {}", source, e),
        }
        result
    }

    fn run(&self, source: &Path) -> Result<()> {
        let dest = &self.plan.dest;
        self.plan.validate()?;
        if fs::symlink_metadata(dest).is_ok() {
            return Err(Error::DestinationExists(dest.clone()));
        }

        if let Some(installer) = PlatformInstaller::for_source(source) {
            debug!("Handing {:?} to the {} installer", source, installer);
            return installer.install(source, self.plan, &self.options);
        }

        self.install_staged(source)
    }

    fn install_staged(&self, source: &Path) -> Result<()> {
        let dest = &self.plan.dest;
        let parent = parent_dir(dest);
        create_private_dir(parent)?;
        let staging = StagingArea::create(dest)?;
        debug!("Staging {:?} in {:?}", dest, staging.path());

        let size = fs::metadata(source).at("stat", source)?.len();
        self.progress.begin(Total::Bytes(size));

        let archive = sniff::detect_with_progress(source, self.progress.clone())?;
        let content_type = archive.content_type();
        let extractor = extractor_for(content_type).ok_or_else(|| Error::UnsupportedFormat {
            path: source.to_path_buf(),
            content_type: content_type.to_string(),
        })?;
        debug!(
            "Extracting {:?} as {} ({} compressed)",
            source,
            extractor.format_name(),
            archive.compression()
        );

        let ctx = ExtractContext {
            root: staging.path(),
            plan: self.plan,
            options: &self.options,
            progress: &self.progress,
        };
        match extractor.extract(archive, &ctx)? {
            Outcome::Delegated => {
                debug!("{:?} was installed by a nested session", dest);
                Ok(())
            }
            Outcome::Extracted => {
                debug!("Finalizing {:?}", staging.path());
                self.finalize(staging.path())?;
                trace!("mv {:?} {:?}", staging.path(), dest);
                staging.commit(dest)
            }
        }
    }

    /// Apply renames and make the staged tree read-only
    fn finalize(&self, staging: &Path) -> Result<()> {
        let rename_root = self.plan.rename_root(staging);
        for (from, to) in &self.plan.rename {
            let from = rename_root.join(from);
            let to = rename_root.join(to);
            trace!("  mv {:?} {:?}", from, to);
            fs::rename(&from, &to).at("rename", &from)?;
        }

        lock_down(staging)?;

        // The root itself must stay writable for the final rename
        trace!("chmod 700 {:?}", staging);
        set_mode(staging, 0o700)
    }
}

/// Install `source` as described by `plan` with default options
pub fn install(source: &Path, plan: &DestinationPlan) -> Result<()> {
    InstallSession::new(plan).install(source)
}

/// Directory `path` lives in; `.` for a bare relative name
pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Remove write permission from everything under `root`, symlinks excepted
fn lock_down(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root) {
        let entry = entry?;
        // chmod would follow the link and change its target instead
        if entry.path_is_symlink() {
            continue;
        }
        trace!("chmod a-w {:?}", entry.path());
        let metadata = entry.metadata()?;
        let mut permissions = metadata.permissions();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            permissions.set_mode(permissions.mode() & !0o222);
        }
        #[cfg(not(unix))]
        permissions.set_readonly(true);
        fs::set_permissions(entry.path(), permissions).at("chmod", entry.path())?;
    }
    Ok(())
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).at("chmod", path)
    }
    #[cfg(not(unix))]
    {
        let _ = mode;
        let mut permissions = fs::metadata(path).at("stat", path)?.permissions();
        permissions.set_readonly(false);
        fs::set_permissions(path, permissions).at("chmod", path)
    }
}

/// Temporary directory `<dest-name>-XXXXXX` beside the destination.
///
/// Removed on drop unless [`commit`](Self::commit) renamed it into place.
pub struct StagingArea {
    path: PathBuf,
    committed: bool,
}

impl StagingArea {
    /// Create the staging directory for `dest` on the same filesystem
    pub fn create(dest: &Path) -> Result<Self> {
        let parent = parent_dir(dest);
        let name = dest
            .file_name()
            .ok_or_else(|| Error::InvalidPath(format!("{:?} has no final component", dest)))?;
        let prefix = format!("{}-", name.to_string_lossy());

        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(parent)
            .at("create staging directory in", parent)?;
        Ok(Self {
            path: dir.keep(),
            committed: false,
        })
    }

    /// Path of the staging directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically rename the staging directory to `dest`
    pub fn commit(mut self, dest: &Path) -> Result<()> {
        fs::rename(&self.path, dest).at("rename", &self.path)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        trace!("rm -rf {:?}", self.path);
        restore_write(&self.path);
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!("Failed to remove staging directory {:?}: {}", self.path, e);
        }
    }
}

/// Give the owner write access to every directory so the tree can be deleted
fn restore_write(root: &Path) {
    for entry in WalkDir::new(root).into_iter().flatten() {
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
            let _ = fs::set_permissions(entry.path(), permissions);
        }
    }
}
