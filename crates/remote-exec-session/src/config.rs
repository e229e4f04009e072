//! Client configuration.
//!
//! Read from `<config dir>/remote-exec/config.toml`, then overridden by
//! `REMOTE_EXEC_HOST`, `REMOTE_EXEC_API_BASE` and `REMOTE_EXEC_SOCKET_URL`.

use std::path::{Path, PathBuf};

use remote_exec_core::ViewportGeometry;
use remote_exec_transport::DEFAULT_NAMESPACE;
use serde::{Deserialize, Serialize};

pub const HOST_ENV: &str = "REMOTE_EXEC_HOST";
pub const API_BASE_ENV: &str = "REMOTE_EXEC_API_BASE";
pub const SOCKET_URL_ENV: &str = "REMOTE_EXEC_SOCKET_URL";

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid {field} URL: {url}")]
    InvalidUrl { field: &'static str, url: String },
}

/// Endpoints and terminal defaults for a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Content API root; processes are created at `{api_base}/exec`.
    pub api_base: String,
    /// Socket endpoint the transport channel connects to.
    pub socket_url: String,
    pub namespace: String,
    /// Initial terminal rows.
    pub rows: u16,
    /// Initial terminal columns.
    pub cols: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://api.localhost:5000".to_string(),
            socket_url: "ws://localhost:5000/socket".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            rows: 24,
            cols: 80,
        }
    }
}

impl ClientConfig {
    /// Default config file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("remote-exec").join("config.toml"))
    }

    /// Parse a config file. Missing keys take their defaults.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load the default config file (if any) and apply environment overrides.
    ///
    /// # Errors
    /// Returns error if an existing file is invalid or an override is malformed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let config = match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path)?,
            _ => Self::default(),
        };
        let config = config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate TOML text.
    ///
    /// # Errors
    /// Returns error if the text is not valid config.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Override endpoints from the environment.
    ///
    /// A site host derives the API root over https; an explicit API base
    /// wins over it.
    #[must_use]
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup(HOST_ENV).filter(|v| !v.is_empty()) {
            self.api_base = api_root_for_host("https", &host);
        }
        if let Some(api_base) = lookup(API_BASE_ENV).filter(|v| !v.is_empty()) {
            self.api_base = api_base;
        }
        if let Some(socket_url) = lookup(SOCKET_URL_ENV).filter(|v| !v.is_empty()) {
            self.socket_url = socket_url;
        }
        self
    }

    /// Check endpoint schemes.
    ///
    /// # Errors
    /// Returns `InvalidUrl` for an endpoint with the wrong scheme.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_scheme("api_base", &self.api_base, &["http://", "https://"])?;
        check_scheme("socket_url", &self.socket_url, &["ws://", "wss://"])
    }

    /// Initial terminal grid, at least 1x1.
    #[must_use]
    pub fn geometry(&self) -> ViewportGeometry {
        ViewportGeometry::new(self.rows.max(1), self.cols.max(1))
    }

    /// Content API root with any trailing slash removed.
    #[must_use]
    pub fn api_root(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }
}

fn check_scheme(field: &'static str, url: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let valid = schemes
        .iter()
        .any(|scheme| url.strip_prefix(scheme).is_some_and(|rest| !rest.is_empty()));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl {
            field,
            url: url.to_string(),
        })
    }
}

/// Derive the content API root from the host serving the client.
///
/// `my.example.com` maps to `api.example.com`; any other host gets an
/// `api.` prefix.
#[must_use]
pub fn api_root_for_host(scheme: &str, host: &str) -> String {
    let api_host = match host.strip_prefix("my.") {
        Some(rest) => format!("api.{rest}"),
        None => format!("api.{host}"),
    };
    format!("{scheme}://{api_host}")
}
