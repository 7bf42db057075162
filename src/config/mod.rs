// ABOUTME: Settings for beach, read from an optional YAML file.
// ABOUTME: Resolves default store, key, and config locations under the home directory.

mod logging;

pub use logging::LoggingConfig;

use crate::credential::{PasswordEncoding, STORE_FILENAME};
use crate::error::{Error, Result};
use crate::output::OutputMode;
use crate::session::{DEFAULT_PORT, SessionConfig};
use crate::ssh::{HostKeyPolicy, SshConnector};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file location relative to the user config directory.
pub const CONFIG_FILENAME: &str = "beach/config.yml";
/// Key file name relative to the home directory.
pub const KEY_FILENAME: &str = ".beach.key";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Credential store file. Defaults to `~/.beach-shells.json`.
    pub store_path: Option<PathBuf>,

    /// Password key file. Defaults to `~/.beach.key`.
    pub key_path: Option<PathBuf>,

    pub port: u16,

    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Best-effort pause after sending a line so output can render before
    /// the next prompt. Not a synchronization guarantee.
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,

    pub host_key_policy: HostKeyPolicy,

    pub known_hosts_path: Option<PathBuf>,

    pub password_encoding: PasswordEncoding,

    pub output: OutputMode,

    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: None,
            key_path: None,
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(1),
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_path: None,
            password_encoding: PasswordEncoding::default(),
            output: OutputMode::Normal,
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load `explicit` if given (it must exist), otherwise the default
    /// config file if present, otherwise defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::ConfigNotFound(path.to_path_buf()));
            }
            return Self::load(path);
        }

        match dirs::config_dir().map(|dir| dir.join(CONFIG_FILENAME)) {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => home_file(STORE_FILENAME),
        }
    }

    pub fn key_path(&self) -> Result<PathBuf> {
        match &self.key_path {
            Some(path) => Ok(path.clone()),
            None => home_file(KEY_FILENAME),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default().connect_timeout(self.connect_timeout)
    }

    pub fn connector(&self) -> SshConnector {
        let connector = SshConnector::new().host_key_policy(self.host_key_policy);
        match &self.known_hosts_path {
            Some(path) => connector.known_hosts_path(path),
            None => connector,
        }
    }
}

fn home_file(name: &str) -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(name))
        .ok_or(Error::NoHomeDir)
}
