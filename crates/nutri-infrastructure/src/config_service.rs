//! Configuration service implementation.
//!
//! This module provides a ConfigService that loads the client configuration
//! from the configuration file (~/.config/nutri/config.toml).

use crate::paths::{NutriPaths, ServiceType};
use nutri_core::config::ClientConfig;
use nutri_core::error::{NutriError, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Overrides `api_base_url`.
pub const ENV_API_URL: &str = "NUTRI_API_URL";
/// Overrides `log_level`.
pub const ENV_LOG: &str = "NUTRI_LOG";
/// Overrides `default_age`.
pub const ENV_AGE: &str = "NUTRI_AGE";

/// Configuration service that loads and caches the client configuration.
///
/// The file is created with defaults on first load if it does not exist.
/// Environment overrides are applied on top of the file contents.
#[derive(Debug, Clone)]
pub struct ConfigService {
    paths: NutriPaths,
    /// Cached configuration, loaded lazily.
    config: Arc<RwLock<Option<ClientConfig>>>,
}

impl ConfigService {
    pub fn new() -> Self {
        Self::with_paths(NutriPaths::default())
    }

    pub fn with_paths(paths: NutriPaths) -> Self {
        Self {
            paths,
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets the configuration, loading from file if not cached.
    pub fn get_config(&self) -> Result<ClientConfig> {
        {
            let read_lock = self.config.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = read_lock.as_ref() {
                return Ok(cached.clone());
            }
        }

        let loaded = Self::load_config(&self.config_path()?)?;
        let loaded = apply_env_overrides(loaded, |name| std::env::var(name).ok())?;
        tracing::debug!("[ConfigService] Loaded config: api_base_url={}", loaded.api_base_url);

        let mut write_lock = self.config.write().unwrap_or_else(|e| e.into_inner());
        *write_lock = Some(loaded.clone());
        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        let mut write_lock = self.config.write().unwrap_or_else(|e| e.into_inner());
        *write_lock = None;
    }

    /// Writes `config` to the config file and drops the cached copy.
    pub fn save(&self, config: &ClientConfig) -> Result<()> {
        write_config(&self.config_path()?, config)?;
        self.invalidate_cache();
        Ok(())
    }

    pub fn config_path(&self) -> Result<PathBuf> {
        self.paths
            .get_path(ServiceType::Config)
            .map_err(|e| NutriError::config(e.to_string()))
    }

    fn load_config(path: &Path) -> Result<ClientConfig> {
        if !path.exists() {
            tracing::info!(
                "[ConfigService] No config at {}, creating defaults",
                path.display()
            );
            let config = ClientConfig::default();
            write_config(path, &config)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes through a temp file and a rename: readers see the old or the new
/// file, never a partial one.
fn write_config(path: &Path, config: &ClientConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;

    let tmp_path = temp_path(path)?;
    let mut tmp_file = File::create(&tmp_path)?;
    tmp_file.write_all(content.as_bytes())?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| NutriError::config(format!("Invalid config path: {}", path.display())))?;
    let tmp_name = format!(".{}.tmp", file_name.to_string_lossy());
    Ok(path.with_file_name(tmp_name))
}

/// Applies `NUTRI_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(mut config: ClientConfig, lookup: F) -> Result<ClientConfig>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_API_URL) {
        config.api_base_url = url;
    }
    if let Some(level) = lookup(ENV_LOG) {
        config.log_level = level;
    }
    if let Some(age) = lookup(ENV_AGE) {
        let years = age.trim().parse::<u8>().map_err(|_| {
            NutriError::config(format!("{} must be a number, got '{}'", ENV_AGE, age))
        })?;
        config.default_age = Some(years);
        config.default_age()?;
    }
    Ok(config)
}
