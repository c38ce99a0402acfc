//! Orchestrator configuration
//!
//! Every field has a default, so an empty TOML document or an empty
//! environment yields a working configuration.
//!
//! # Example
//!
//! ```
//! use hearth_core::config::OrchestratorConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrchestratorConfig::from_toml_str(r#"
//!     base_url = "https://api.hearth.example"
//!     concurrency_limit = 4
//!
//!     [identity]
//!     id = "u-17"
//!     name = "Ada"
//! "#)?;
//!
//! assert_eq!(config.concurrency_limit, 4);
//! assert_eq!(config.max_requests_per_minute, 60);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
    /// Environment variable held an unusable value
    #[error("Invalid value for {var}: {value}")]
    Env {
        /// Variable name
        var: String,
        /// Offending value
        value: String,
    },
    /// Failed to read configuration file
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Identity attached to every request as fixed headers
///
/// Only these four fields are recognized. Absent fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityHeaders {
    /// User id
    pub id: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Email address
    pub email: Option<String>,
    /// Avatar URL
    pub avatar: Option<String>,
}

impl IdentityHeaders {
    /// Header name/value pairs for the fields that are set
    #[must_use]
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("x-user-id", self.id.as_deref()),
            ("x-user-name", self.name.as_deref()),
            ("x-user-email", self.email.as_deref()),
            ("x-user-avatar", self.avatar.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

/// Configuration for the request orchestrator and its transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Base URL of the remote service
    pub base_url: String,
    /// Maximum simultaneous in-flight exchanges
    pub concurrency_limit: usize,
    /// Issuance ceiling per trailing minute; `<= 0` disables rate limiting
    pub max_requests_per_minute: i64,
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// First backoff delay in milliseconds, doubled per retry
    pub base_backoff_ms: u64,
    /// Upper bound (exclusive) of the random jitter added to each backoff
    pub jitter_max_ms: u64,
    /// Collapse identical writes as well as reads
    pub dedupe_writes: bool,
    /// Do not send identity headers
    pub suppress_identity_headers: bool,
    /// Identity header values
    pub identity: IdentityHeaders,
    /// Per-exchange HTTP timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            concurrency_limit: 6,
            max_requests_per_minute: 60,
            max_retries: 2,
            base_backoff_ms: 400,
            jitter_max_ms: 200,
            dedupe_writes: true,
            suppress_identity_headers: false,
            identity: IdentityHeaders::default(),
            request_timeout_secs: 30,
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns error if the document is not valid TOML or fails validation
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed, or validated
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Defaults overridden by `HEARTH_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed or the result is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for `HEARTH_*` names
    ///
    /// # Errors
    ///
    /// Returns error if a value cannot be parsed or the result is invalid
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("HEARTH_BASE_URL") {
            config.base_url = url;
        }
        if let Some(value) = lookup("HEARTH_CONCURRENCY_LIMIT") {
            config.concurrency_limit = parse_var("HEARTH_CONCURRENCY_LIMIT", &value)?;
        }
        if let Some(value) = lookup("HEARTH_MAX_REQUESTS_PER_MINUTE") {
            config.max_requests_per_minute = parse_var("HEARTH_MAX_REQUESTS_PER_MINUTE", &value)?;
        }
        if let Some(value) = lookup("HEARTH_MAX_RETRIES") {
            config.max_retries = parse_var("HEARTH_MAX_RETRIES", &value)?;
        }
        if let Some(value) = lookup("HEARTH_SUPPRESS_IDENTITY_HEADERS") {
            config.suppress_identity_headers = parse_var("HEARTH_SUPPRESS_IDENTITY_HEADERS", &value)?;
        }

        config.identity = IdentityHeaders {
            id: lookup("HEARTH_USER_ID"),
            name: lookup("HEARTH_USER_NAME"),
            email: lookup("HEARTH_USER_EMAIL"),
            avatar: lookup("HEARTH_USER_AVATAR"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::Validation(
                "concurrency_limit must be > 0".to_string(),
            ));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "base_url must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Get base backoff as Duration
    #[must_use]
    pub const fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    /// Get jitter bound as Duration
    #[must_use]
    pub const fn jitter_max(&self) -> Duration {
        Duration::from_millis(self.jitter_max_ms)
    }

    /// Get request timeout as Duration
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
    })
}
