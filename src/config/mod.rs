//! Harvest configuration
//!
//! Retrieval knobs (timeouts, retry schedule, courtesy delay, portal base
//! URL) live in an optional TOML file; every field has a sensible default so
//! the CLI works without one. The loaded file's SHA-256 hash is recorded with
//! each run in the checkpoint database.

use crate::{ConfigError, ConfigResult};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use url::Url;

/// Top-level configuration for the fetch stage
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub portal: PortalConfig,
    pub fetch: FetchConfig,
    pub retry: RetryConfig,
}

/// Portal endpoints and identification
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Base URL of the data portal
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// User agent sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

/// Per-request behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Overall request timeout in seconds
    #[serde(rename = "request-timeout-secs")]
    pub request_timeout_secs: u64,

    /// Connection timeout in seconds
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,

    /// Pause between consecutive portal requests in milliseconds
    #[serde(rename = "courtesy-delay-ms")]
    pub courtesy_delay_ms: u64,
}

/// Bounded retry schedule for transient failures
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per unit, including the first
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds; doubles each attempt
    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    /// Cap on the backoff delay in milliseconds
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://wahis.woah.org".to_string(),
            user_agent: format!("wahis-harvest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            courtesy_delay_ms: 500,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            portal: PortalConfig::default(),
            fetch: FetchConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Loads a configuration file, validates it, and returns it with its hash
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok((HarvestConfig, String))` - Validated configuration and its SHA-256 hex hash
/// * `Err(ConfigError)` - Failed to read, parse, or validate
pub fn load_config_with_hash(path: &Path) -> ConfigResult<(HarvestConfig, String)> {
    let content = std::fs::read_to_string(path)?;
    let config: HarvestConfig = toml::from_str(&content)?;
    validate(&config)?;

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok((config, hash))
}

/// Returns the default configuration with a fixed sentinel hash
///
/// Used when no config file is given, so run records always carry a hash;
/// the sentinel distinguishes default-config runs from file-loaded ones.
pub fn default_config_with_hash() -> (HarvestConfig, String) {
    let config = HarvestConfig::default();
    let mut hasher = Sha256::new();
    hasher.update(b"default");
    (config, hex::encode(hasher.finalize()))
}

/// Validates the entire configuration
pub fn validate(config: &HarvestConfig) -> ConfigResult<()> {
    validate_portal(&config.portal)?;
    validate_fetch(&config.fetch)?;
    validate_retry(&config.retry)?;
    Ok(())
}

fn validate_portal(portal: &PortalConfig) -> ConfigResult<()> {
    let url = Url::parse(&portal.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", portal.base_url, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must be http(s), got scheme '{}'",
            url.scheme()
        )));
    }

    if portal.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_fetch(fetch: &FetchConfig) -> ConfigResult<()> {
    if fetch.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if fetch.connect_timeout_secs > fetch.request_timeout_secs {
        return Err(ConfigError::Validation(format!(
            "connect-timeout-secs ({}) exceeds request-timeout-secs ({})",
            fetch.connect_timeout_secs, fetch.request_timeout_secs
        )));
    }

    Ok(())
}

fn validate_retry(retry: &RetryConfig) -> ConfigResult<()> {
    if retry.max_attempts < 1 || retry.max_attempts > 20 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 20, got {}",
            retry.max_attempts
        )));
    }

    if retry.base_delay_ms > retry.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "base-delay-ms ({}) exceeds max-delay-ms ({})",
            retry.base_delay_ms, retry.max_delay_ms
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = HarvestConfig::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(
            r#"
[portal]
base-url = "https://portal.example.test"
user-agent = "TestHarvester/1.0"

[retry]
max-attempts = 3
base-delay-ms = 100
max-delay-ms = 1000
"#,
        );

        let (config, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(config.portal.base_url, "https://portal.example.test");
        assert_eq!(config.retry.max_attempts, 3);
        // Omitted sections fall back to defaults
        assert_eq!(config.fetch.request_timeout_secs, 30);
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_rejects_bad_url() {
        let file = create_temp_config(
            r#"
[portal]
base-url = "ftp://portal.example.test"
"#,
        );
        assert!(load_config_with_hash(file.path()).is_err());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let file = create_temp_config(
            r#"
[retry]
max-attempts = 0
"#,
        );
        assert!(load_config_with_hash(file.path()).is_err());
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let file = create_temp_config(
            r#"
[retry]
base-delay-ms = 5000
max-delay-ms = 100
"#,
        );
        assert!(load_config_with_hash(file.path()).is_err());
    }

    #[test]
    fn test_config_hash_changes_with_content() {
        let a = create_temp_config("[retry]\nmax-attempts = 3\n");
        let b = create_temp_config("[retry]\nmax-attempts = 4\n");
        let (_, hash_a) = load_config_with_hash(a.path()).unwrap();
        let (_, hash_b) = load_config_with_hash(b.path()).unwrap();
        assert_ne!(hash_a, hash_b);
    }
}
