//! Configuration management for Upsync.
//!
//! The configuration is read from `sftp.json` in the working directory
//! unless another file is named on the command line. Files ending in
//! `.toml` are parsed as TOML, everything else as JSON.
//!
//! ## Example
//!
//! ```json
//! {
//!   "host": "example.com",
//!   "port": 22,
//!   "auth": { "username": "deploy", "password": "secret" },
//!   "path": "/var/www/site",
//!   "ignore": ["node_modules/**", "*.log"],
//!   "keepalive": 30
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::backoff::ReconnectConfig;

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "sftp.json";

/// Raw configuration as found on disk.
///
/// Required fields are optional here so that a missing field can be
/// reported by name instead of as a parse error. Use [`Config::validate`]
/// to obtain the checked [`RemoteConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote host name or address
    pub host: Option<String>,
    /// Remote SSH port
    pub port: Option<u16>,
    /// Credentials
    pub auth: Option<AuthConfig>,
    /// Remote base directory
    pub path: Option<String>,
    /// Glob patterns excluded from watching
    pub ignore: Vec<String>,
    /// Keepalive interval in seconds (0 or absent disables)
    pub keepalive: Option<u64>,
    /// Seconds to wait for the remote root stat
    pub validate_timeout: u64,
    /// Show desktop notifications for uploads
    pub notify: bool,
    /// Reconnect backoff settings
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            auth: None,
            path: None,
            ignore: Vec::new(),
            keepalive: None,
            validate_timeout: crate::DEFAULT_VALIDATE_TIMEOUT_SECS,
            notify: true,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Password credentials.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Login name
    pub username: Option<String>,
    /// Login password
    pub password: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Connection settings with every required field present.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Remote host name or address
    pub host: String,
    /// Remote SSH port
    pub port: u16,
    /// Login name
    pub username: String,
    /// Login password
    pub password: String,
    /// Remote base directory
    pub path: String,
    /// Keepalive interval, `None` when disabled
    pub keepalive: Option<Duration>,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("path", &self.path)
            .field("keepalive", &self.keepalive)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;

        if path.extension().is_some_and(|ext| ext == "toml") {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    /// Parse configuration from JSON text.
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Default configuration path inside `dir`.
    #[must_use]
    pub fn default_path(dir: &Path) -> PathBuf {
        dir.join(DEFAULT_CONFIG_FILE)
    }

    /// Check required fields and build the connection settings.
    ///
    /// Empty strings and a zero port count as missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingField`] naming the first absent field, or
    /// [`Error::InvalidConfig`] for out-of-range values.
    pub fn validate(&self) -> Result<RemoteConfig> {
        let host = non_empty(self.host.as_deref()).ok_or(Error::MissingField("host"))?;
        let port = self
            .port
            .filter(|p| *p != 0)
            .ok_or(Error::MissingField("port"))?;
        let auth = self.auth.as_ref().ok_or(Error::MissingField("auth"))?;
        let username =
            non_empty(auth.username.as_deref()).ok_or(Error::MissingField("auth.username"))?;
        let password =
            non_empty(auth.password.as_deref()).ok_or(Error::MissingField("auth.password"))?;
        let path = non_empty(self.path.as_deref()).ok_or(Error::MissingField("path"))?;

        if self.validate_timeout == 0 {
            return Err(Error::InvalidConfig {
                key: "validate_timeout".to_string(),
                reason: "must be at least 1 second".to_string(),
            });
        }

        Ok(RemoteConfig {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            path: path.to_string(),
            keepalive: self
                .keepalive
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }

    /// Timeout applied to remote root validation.
    #[must_use]
    pub fn validate_timeout(&self) -> Duration {
        Duration::from_secs(self.validate_timeout)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
