//! Configuration module

use crate::{Error, Result};
use dirs::{config_dir, home_dir};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Install behaviour
    #[serde(default)]
    pub install: InstallConfig,
    /// Logging defaults for the CLI
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Install configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    /// How many packages-inside-packages are unpacked before giving up
    pub max_nesting: usize,
    /// Where disk image apps are linked (defaults to ~/Applications)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applications_dir: Option<PathBuf>,
}

/// Default limit on nested package payloads
pub const DEFAULT_MAX_NESTING: usize = 4;

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            max_nesting: DEFAULT_MAX_NESTING,
            applications_dir: None,
        }
    }
}

impl InstallConfig {
    /// Resolve the applications directory
    pub fn applications_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.applications_dir {
            return Ok(dir.clone());
        }
        let home = home_dir()
            .ok_or_else(|| Error::Config("Unable to determine home directory".to_string()))?;
        Ok(home.join("Applications"))
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when neither RUST_LOG nor a verbosity flag is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir().ok_or_else(|| {
            Error::Config("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join("kiln").join("config.toml"))
    }

    /// Get default configuration content with examples
    pub fn default_config_content() -> String {
        r#"# Kiln Configuration File

[install]
# Packages that carry other packages (e.g. .deb payloads) are unpacked
# recursively; this bounds how deep that may go
max_nesting = 4
# Directory that disk image applications are linked into
# applications_dir = "/Users/me/Applications"

[logging]
# Default log filter: error, warn, info, debug, trace
level = "info"
"#
        .to_string()
    }

    /// Load configuration from the default path, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(&path, content)?;
        Ok(())
    }
}
