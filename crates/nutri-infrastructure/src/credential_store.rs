//! File-backed credential store.
//!
//! Reads `credentials.json` (`{ "token": ..., "user_id": ... }`) from the
//! config directory and caches it. When the file is absent, the
//! `NUTRI_TOKEN` and `NUTRI_USER_ID` environment variables are used.

use crate::paths::{NutriPaths, ServiceType};
use async_trait::async_trait;
use nutri_core::credential::{CredentialStore, Credentials};
use nutri_core::error::{NutriError, Result};
use std::path::PathBuf;
use tokio::sync::RwLock;

pub const ENV_TOKEN: &str = "NUTRI_TOKEN";
pub const ENV_USER_ID: &str = "NUTRI_USER_ID";

pub struct FileCredentialStore {
    path: PathBuf,
    cached: RwLock<Option<Credentials>>,
}

impl FileCredentialStore {
    pub fn new(paths: &NutriPaths) -> Result<Self> {
        let path = paths
            .get_path(ServiceType::Credentials)
            .map_err(|e| NutriError::config(e.to_string()))?;
        Ok(Self::at(path))
    }

    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            cached: RwLock::new(None),
        }
    }

    /// Writes credentials to the file, readable by the owner only on Unix.
    pub async fn save(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(credentials)?;
        tokio::fs::write(&self.path, json).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.path, permissions).await?;
        }

        *self.cached.write().await = Some(credentials.clone());
        tracing::info!("[CredentialStore] Saved credentials for user {}", credentials.user_id);
        Ok(())
    }

    /// Removes the credentials file and the cached copy.
    pub async fn clear(&self) -> Result<()> {
        *self.cached.write().await = None;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_file(&self) -> Option<Credentials> {
        let content = tokio::fs::read_to_string(&self.path).await.ok()?;
        match serde_json::from_str::<Credentials>(&content) {
            Ok(credentials) if !credentials.token.is_empty() => Some(credentials),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(
                    "[CredentialStore] Ignoring unreadable {}: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }
}

fn from_env() -> Option<Credentials> {
    let token = std::env::var(ENV_TOKEN).ok().filter(|t| !t.is_empty())?;
    let user_id = std::env::var(ENV_USER_ID).ok().filter(|u| !u.is_empty())?;
    Some(Credentials { token, user_id })
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn credentials(&self) -> Option<Credentials> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            return Some(cached.clone());
        }

        let loaded = match self.load_file().await {
            Some(credentials) => Some(credentials),
            None => from_env(),
        }?;
        *self.cached.write().await = Some(loaded.clone());
        Some(loaded)
    }
}
