//! Configuration
//!
//! Read from a TOML or YAML file (chosen by extension), then overridden by
//! `DTWIN_*` environment variables. Command-line flags are applied last by
//! the binary through the `with_*` builders.

use crate::error::ConfigError;
use dtwin_model::{DtdlParser, LoadMode};
use dtwin_service::{RestConfig, DEFAULT_API_VERSION};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable overriding `endpoint`
pub const ENV_ENDPOINT: &str = "DTWIN_ENDPOINT";
/// Environment variable overriding `access_token`
pub const ENV_ACCESS_TOKEN: &str = "DTWIN_ACCESS_TOKEN";
/// Environment variable overriding `api_version`
pub const ENV_API_VERSION: &str = "DTWIN_API_VERSION";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DtwinConfig {
    /// Base URL of the twin-graph service
    pub endpoint: Option<String>,
    /// `api-version` sent with every request
    pub api_version: String,
    /// Bearer token
    pub access_token: Option<String>,
    /// Transport timeout in seconds
    pub request_timeout_secs: u64,
    /// Deletion tuning
    pub deletion: DeletionConfig,
    /// Definition file handling
    pub models: ModelsConfig,
    /// Logging
    pub log: LogConfig,
}

impl Default for DtwinConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            access_token: None,
            request_timeout_secs: 30,
            deletion: DeletionConfig::default(),
            models: ModelsConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Deletion tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionConfig {
    /// Deletes in flight at once within one pass or cascade direction
    pub max_concurrency: usize,
    /// Hard bound on model-deletion passes
    pub max_passes: Option<usize>,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            max_passes: None,
        }
    }
}

/// Definition file handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Recognised definition file extensions (without dot)
    pub extensions: Vec<String>,
    /// Keep texts from earlier loads instead of replacing them
    pub accumulate: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["json".to_string()],
            accumulate: false,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Invalid(format!("unknown log format `{other}`"))),
        }
    }
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        })
    }
}

/// Logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl DtwinConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a `.toml`, `.yaml` or `.yml` file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::UnsupportedFormat` for other extensions
    /// - `ConfigError::Toml` / `ConfigError::Yaml` for malformed content
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parse: fn(&str) -> Result<Self, ConfigError> = match ext.as_deref() {
            Some("toml") => Self::from_toml_str,
            Some("yaml" | "yml") => Self::from_yaml_str,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = parse(&text)?;
        tracing::debug!(file = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// - `ConfigError::Toml` for malformed content
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Parse YAML text
    ///
    /// # Errors
    /// - `ConfigError::Yaml` for malformed content
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply `DTWIN_*` overrides from the process environment
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `DTWIN_*` overrides looked up through `lookup`
    #[must_use]
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.endpoint = Some(endpoint);
        }
        if let Some(token) = lookup(ENV_ACCESS_TOKEN) {
            self.access_token = Some(token);
        }
        if let Some(version) = lookup(ENV_API_VERSION) {
            self.api_version = version;
        }
        self
    }

    /// With endpoint
    #[inline]
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// With access token
    #[inline]
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// With log format
    #[inline]
    #[must_use]
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log.format = format;
        self
    }

    /// With deletion concurrency
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.deletion.max_concurrency = max;
        self
    }

    /// Check value ranges
    ///
    /// # Errors
    /// - `ConfigError::Invalid` for zero concurrency, zero timeout or a non-http(s) endpoint
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deletion.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "deletion.max_concurrency must be at least 1".into(),
            ));
        }
        if self.deletion.max_passes == Some(0) {
            return Err(ConfigError::Invalid(
                "deletion.max_passes must be at least 1".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if let Some(endpoint) = &self.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "endpoint `{endpoint}` must be an http(s) URL"
                )));
            }
        }
        Ok(())
    }

    /// Repository load mode
    #[inline]
    #[must_use]
    pub fn load_mode(&self) -> LoadMode {
        if self.models.accumulate {
            LoadMode::Accumulate
        } else {
            LoadMode::Replace
        }
    }

    /// Parser reading the configured extensions
    #[must_use]
    pub fn parser(&self) -> DtdlParser {
        DtdlParser::new().with_extensions(self.models.extensions.iter().cloned())
    }

    /// HTTP client settings
    ///
    /// # Errors
    /// - `ConfigError::MissingEndpoint` without an endpoint
    /// - `ConfigError::Invalid` if the endpoint is not a usable URL
    pub fn rest_config(&self) -> Result<RestConfig, ConfigError> {
        let endpoint = self.endpoint.as_deref().ok_or(ConfigError::MissingEndpoint)?;
        let mut config = RestConfig::new(endpoint)
            .map_err(|e| ConfigError::Invalid(e.message))?
            .with_api_version(self.api_version.clone())
            .with_timeout(Duration::from_secs(self.request_timeout_secs));
        if let Some(token) = &self.access_token {
            config = config.with_access_token(token.clone());
        }
        Ok(config)
    }
}
