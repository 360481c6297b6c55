//! Installers that delegate to the operating system's own tooling

pub mod command;
pub mod dmg;
pub mod pkg;

use crate::plan::DestinationPlan;
use crate::session::InstallOptions;
use crate::Result;
use std::fmt;
use std::path::Path;

/// Source kinds installed by a platform tool instead of extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformInstaller {
    /// macOS installer package
    Pkg,
    /// macOS disk image
    Dmg,
}

impl PlatformInstaller {
    /// Pick an installer from the source's extension
    pub fn for_source(source: &Path) -> Option<Self> {
        match source.extension().and_then(|ext| ext.to_str()) {
            Some("pkg") => Some(Self::Pkg),
            Some("dmg") => Some(Self::Dmg),
            _ => None,
        }
    }

    /// Install `source` to `plan.dest`
    pub fn install(
        self,
        source: &Path,
        plan: &DestinationPlan,
        options: &InstallOptions,
    ) -> Result<()> {
        match self {
            Self::Pkg => pkg::install(source, plan),
            Self::Dmg => dmg::install(source, plan, options),
        }
    }
}

impl fmt::Display for PlatformInstaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pkg => f.write_str("macOS package"),
            Self::Dmg => f.write_str("disk image"),
        }
    }
}
