//! Kiln - archive-format-agnostic package installation
//!
//! This library installs a downloaded package file into a destination
//! directory. The content type is sniffed from magic bytes (seeing through
//! one layer of compression), the matching extractor unpacks it into a
//! staging directory beside the destination, and the finished tree is made
//! read-only and renamed into place. A failed install leaves nothing behind.
//!
//! ```no_run
//! use kiln_core::{install, DestinationPlan};
//! use std::path::Path;
//!
//! let plan = DestinationPlan::new("/opt/pkg/node-20.1.0").strip(1);
//! install(Path::new("node-v20.1.0-linux-x64.tar.xz"), &plan)?;
//! # Ok::<(), kiln_core::Error>(())
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod path;
pub mod plan;
pub mod platform;
pub mod progress;
pub mod session;
pub mod sniff;
pub mod utils;

pub use error::{Error, Result};

// Re-export commonly used types
pub use archive::{extractor_for, Extractor, Outcome};
pub use config::Config;
pub use plan::DestinationPlan;
pub use progress::{NoProgress, Progress, ProgressReporter, Total};
pub use session::{install, InstallOptions, InstallSession, StagingArea};
pub use sniff::{detect, ArchiveSource, Compression, ContentType};
