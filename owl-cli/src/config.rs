use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eventsub::{DEFAULT_EVENTSUB_URL, SessionConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};

const APP_DIR: &str = "open-when-live";
const CONFIG_FILE: &str = "config.toml";

/// Settings read from `config.toml`. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Credential JSON file (client id/secret and tokens).
    pub credentials_path: PathBuf,
    /// Local port the OAuth redirect lands on.
    pub redirect_port: u16,
    /// How long to wait for the browser login to finish.
    pub authorization_timeout_secs: u64,
    pub eventsub_url: String,
    pub dedup_retention_secs: u64,
    pub sweep_period_secs: u64,
    pub open_browser: bool,
    /// Run `caffeinate` while waiting (macOS only).
    pub keep_awake: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from(".twitch.json"),
            redirect_port: eventsub::auth::DEFAULT_REDIRECT_PORT,
            authorization_timeout_secs: 300,
            eventsub_url: DEFAULT_EVENTSUB_URL.to_string(),
            dedup_retention_secs: 10 * 60,
            sweep_period_secs: 5 * 60,
            open_browser: true,
            keep_awake: true,
        }
    }
}

impl AppConfig {
    /// `<config dir>/open-when-live/config.toml`, when the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    fn resolve(path: Option<&Path>) -> Result<PathBuf> {
        match path {
            Some(path) => Ok(path.to_path_buf()),
            None => Self::default_path().ok_or(AppError::NoConfigDir),
        }
    }

    /// Load from `path` (or the default location). An absent file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match Self::resolve(path) {
            Ok(path) => path,
            Err(AppError::NoConfigDir) => return Ok(Self::default()),
            Err(e) => return Err(e),
        };
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        let config = toml::from_str(&content)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Write the defaults to `path` (or the default location) and return where.
    pub fn reset(path: Option<&Path>) -> Result<PathBuf> {
        let path = Self::resolve(path)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, Self::default().to_toml()?)?;
        Ok(path)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn authorization_timeout(&self) -> Duration {
        Duration::from_secs(self.authorization_timeout_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            url: self.eventsub_url.clone(),
            dedup_retention: Duration::from_secs(self.dedup_retention_secs),
            sweep_period: Duration::from_secs(self.sweep_period_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_reset_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let written = AppConfig::reset(Some(&path)).unwrap();
        assert_eq!(written, path);
        assert_eq!(AppConfig::load(Some(&path)).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "redirect_port = 9123\nopen_browser = false\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.redirect_port, 9123);
        assert!(!config.open_browser);
        assert_eq!(config.authorization_timeout_secs, 300);
        assert_eq!(config.credentials_path, PathBuf::from(".twitch.json"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "redirect_port = \"not a number\"").unwrap();

        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(AppError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_session_config_mapping() {
        let config = AppConfig {
            dedup_retention_secs: 30,
            sweep_period_secs: 15,
            ..AppConfig::default()
        };
        let session = config.session_config();
        assert_eq!(session.url, DEFAULT_EVENTSUB_URL);
        assert_eq!(session.dedup_retention, Duration::from_secs(30));
        assert_eq!(session.sweep_period, Duration::from_secs(15));
    }
}
