//! Install requests

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Where and how a source should be installed.
///
/// Supplied by whoever describes the package; the engine only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationPlan {
    /// Final install location; must not exist yet
    pub dest: PathBuf,
    /// Leading path segments removed from every archive entry
    #[serde(default)]
    pub strip: usize,
    /// Package root inside `dest` that renames are relative to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Paths moved after extraction, old to new, relative to the package root
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rename: BTreeMap<PathBuf, PathBuf>,
    /// Application bundles copied out of a disk image
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apps: Vec<PathBuf>,
    /// Name the source was published under, used to name raw executables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl DestinationPlan {
    /// Plan an install to `dest` with no stripping or renames
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            ..Default::default()
        }
    }

    /// Set the number of leading segments to strip
    pub fn strip(mut self, strip: usize) -> Self {
        self.strip = strip;
        self
    }

    /// Set the package root renames are applied under
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Add a post-extraction rename
    pub fn rename(mut self, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        self.rename.insert(from.into(), to.into());
        self
    }

    /// Add an application bundle to copy out of a disk image
    pub fn app(mut self, app: impl Into<PathBuf>) -> Self {
        self.apps.push(app.into());
        self
    }

    /// Record the published name of the source
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Load a plan from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse a plan from TOML
    pub fn from_toml(content: &str) -> Result<Self> {
        let plan: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse install plan: {}", e)))?;
        plan.validate()?;
        Ok(plan)
    }

    /// Check the plan is internally consistent
    pub fn validate(&self) -> Result<()> {
        if self.dest.as_os_str().is_empty() {
            return Err(Error::Config("install plan has no destination".to_string()));
        }
        if self.dest.file_name().is_none() {
            return Err(Error::Config(format!(
                "destination {:?} does not name a directory",
                self.dest
            )));
        }
        if let Some(root) = &self.root {
            if !root.starts_with(&self.dest) {
                return Err(Error::Config(format!(
                    "package root {:?} is outside destination {:?}",
                    root, self.dest
                )));
            }
        }
        Ok(())
    }

    /// Directory renames are relative to, given where `dest` is being staged
    pub(crate) fn rename_root(&self, staging: &Path) -> PathBuf {
        match &self.root {
            Some(root) => match root.strip_prefix(&self.dest) {
                Ok(relative) => staging.join(relative),
                Err(_) => staging.to_path_buf(),
            },
            None => staging.to_path_buf(),
        }
    }
}
