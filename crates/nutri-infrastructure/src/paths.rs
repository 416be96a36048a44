//! Unified path management for nutri configuration files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/nutri/             # Config directory
//! ├── config.toml              # Client configuration
//! ├── credentials.json         # Bearer token and user id
//! └── logs/                    # Rolling log files
//!     └── nutri.log.YYYY-MM-DD
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "nutri";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// The platform config directory could not be determined.
    ConfigDirNotFound,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::ConfigDirNotFound => write!(f, "Cannot find config directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Files and directories managed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Config,
    Credentials,
    Logs,
}

/// Resolves nutri paths, either under the platform config directory or
/// under an explicit base directory.
#[derive(Debug, Clone, Default)]
pub struct NutriPaths {
    base: Option<PathBuf>,
}

impl NutriPaths {
    /// `base` replaces `~/.config/nutri` when given.
    pub fn new(base: Option<&Path>) -> Self {
        Self {
            base: base.map(Path::to_path_buf),
        }
    }

    /// Returns the nutri configuration directory.
    pub fn config_dir(&self) -> Result<PathBuf, PathError> {
        match &self.base {
            Some(base) => Ok(base.clone()),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or(PathError::ConfigDirNotFound),
        }
    }

    pub fn get_path(&self, service: ServiceType) -> Result<PathBuf, PathError> {
        let dir = self.config_dir()?;
        Ok(match service {
            ServiceType::Config => dir.join("config.toml"),
            ServiceType::Credentials => dir.join("credentials.json"),
            ServiceType::Logs => dir.join("logs"),
        })
    }
}
