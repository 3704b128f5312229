//! Credential persistence.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::types::Credentials;
use crate::error::{Error, Result};

/// Persistence seam for the token manager.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist the current credentials.
    async fn save(&self, credentials: &Credentials) -> Result<()>;
}

/// Result of loading the credential file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The file existed and was parsed.
    Loaded(Credentials),
    /// The file was absent; an empty template was written at this path.
    Created(PathBuf),
}

/// JSON credential file (`{clientId, clientSecret, accessToken, refreshToken}`).
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the credential file, writing the empty template if it is missing.
    pub async fn load_or_init(&self) -> Result<LoadOutcome> {
        match fs::metadata(&self.path).await {
            Ok(meta) if !meta.is_file() => Err(Error::config(format!(
                "{} exists but is not a file",
                self.path.display()
            ))),
            Ok(_) => self.load().await.map(LoadOutcome::Loaded),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.write_template().await?;
                info!(path = %self.path.display(), "Created credential template");
                Ok(LoadOutcome::Created(self.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load and parse the credential file.
    pub async fn load(&self) -> Result<Credentials> {
        let text = fs::read_to_string(&self.path).await?;
        let credentials = serde_json::from_str(&text)?;
        debug!(path = %self.path.display(), "Loaded credentials");
        Ok(credentials)
    }

    async fn write_template(&self) -> Result<()> {
        let body = serde_json::to_string_pretty(&Credentials::template())?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await?;
        file.write_all(body.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn save(&self, credentials: &Credentials) -> Result<()> {
        let body = serde_json::to_string_pretty(credentials)?;

        // Write to a sibling temp file, then rename over the original.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body.as_bytes()).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), "Saved credentials");
        Ok(())
    }
}
