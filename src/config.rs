//! Configuration management for envseal

use crate::error::{Error, Result};
use crate::source::CredentialSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default lifetime of a decrypted credential in the cache (seconds)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default bound on a single decrypt attempt (seconds)
pub const DEFAULT_DECRYPT_TIMEOUT_SECS: u64 = 30;

/// Variable holding the master passphrase
pub const DEFAULT_MASTER_PASSWORD_VAR: &str = "VITE_CREDENTIAL_MASTER_PASSWORD";

/// Variable holding the deployment-key fallback
pub const DEFAULT_DEPLOYMENT_KEY_VAR: &str = "VITE_DEPLOYMENT_KEY";

/// Prefix prepended to names printed by `encrypt`
pub const DEFAULT_KEY_PREFIX: &str = "VITE_";

/// Credential names encrypted by the batch tool unless configured otherwise
pub const DEFAULT_CREDENTIAL_KEYS: &[&str] = &[
    "VITE_VPB_API_KEY",
    "VITE_VPB_API_SECRET",
    "VITE_GAMING_API_CLIENT_ID",
    "VITE_GAMING_API_CLIENT_SECRET",
];

/// Template values that are never encrypted
pub const DEFAULT_PLACEHOLDERS: &[&str] = &["your_api_key_here"];

/// Deployment environment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    /// Parse an environment name, falling back to development
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" => RuntimeEnvironment::Development,
            "staging" => RuntimeEnvironment::Staging,
            "production" => RuntimeEnvironment::Production,
            other => {
                warn!("Invalid environment {:?}, defaulting to development", other);
                RuntimeEnvironment::Development
            }
        }
    }

    pub fn is_production(&self) -> bool {
        *self == RuntimeEnvironment::Production
    }

    pub fn is_development(&self) -> bool {
        *self == RuntimeEnvironment::Development
    }
}

/// Where the master passphrase is looked up
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PassphraseConfig {
    /// Primary variable
    pub master_var: String,

    /// Fallback variable for deployment-specific keys
    pub deployment_var: String,
}

impl Default for PassphraseConfig {
    fn default() -> Self {
        PassphraseConfig {
            master_var: DEFAULT_MASTER_PASSWORD_VAR.to_string(),
            deployment_var: DEFAULT_DEPLOYMENT_KEY_VAR.to_string(),
        }
    }
}

/// Decrypted-credential cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching of decrypted values
    pub enabled: bool,

    /// Time-to-live of an entry in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Batch encryption configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Names whose values get encrypted
    pub credential_keys: Vec<String>,

    /// Values left untouched even for recognized names
    pub placeholders: Vec<String>,

    /// Prefix for names printed by single-value encryption
    pub key_prefix: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            credential_keys: DEFAULT_CREDENTIAL_KEYS.iter().map(|k| k.to_string()).collect(),
            placeholders: DEFAULT_PLACEHOLDERS.iter().map(|p| p.to_string()).collect(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployment environment
    pub environment: RuntimeEnvironment,

    /// Whether credentials are expected to be encrypted
    pub encryption_enabled: bool,

    /// Master passphrase lookup
    pub passphrase: PassphraseConfig,

    /// Cache configuration
    pub cache: CacheConfig,

    /// Upper bound on one decrypt attempt in seconds
    pub decrypt_timeout_secs: u64,

    /// Batch encryption configuration
    pub batch: BatchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            environment: RuntimeEnvironment::default(),
            encryption_enabled: true,
            passphrase: PassphraseConfig::default(),
            cache: CacheConfig::default(),
            decrypt_timeout_secs: DEFAULT_DECRYPT_TIMEOUT_SECS,
            batch: BatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("envseal")
            .join("config.yaml")
    }

    /// Load configuration from a file (YAML or JSON), with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref)
            .map_err(|e| Error::Configuration(format!("Failed to read config file: {}", e)))?;

        let content = substitute_env_vars(&content);

        let mut config: Config = if is_yaml(path_ref) {
            serde_yaml::from_str(&content).map_err(|e| {
                Error::Configuration(format!("Failed to parse YAML config: {}", e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                Error::Configuration(format!("Failed to parse JSON config: {}", e))
            })?
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file (format determined by extension)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        let content = if is_yaml(path_ref) {
            serde_yaml::to_string(self).map_err(|e| {
                Error::Configuration(format!("Failed to serialize config to YAML: {}", e))
            })?
        } else {
            serde_json::to_string_pretty(self).map_err(|e| {
                Error::Configuration(format!("Failed to serialize config to JSON: {}", e))
            })?
        };

        std::fs::write(path_ref, content)
            .map_err(|e| Error::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(environment) = std::env::var("VITE_APP_ENVIRONMENT") {
            if !environment.trim().is_empty() {
                self.environment = RuntimeEnvironment::parse_lenient(&environment);
            }
        }

        if let Ok(enabled) = std::env::var("VITE_ENABLE_CREDENTIAL_ENCRYPTION") {
            if !enabled.trim().is_empty() {
                self.encryption_enabled = enabled.trim().eq_ignore_ascii_case("true");
            }
        }

        if let Ok(ttl) = std::env::var("ENVSEAL_CACHE_TTL") {
            if let Ok(secs) = ttl.trim().parse::<u64>() {
                self.cache.ttl_secs = secs;
            }
        }

        if let Ok(level) = std::env::var("ENVSEAL_LOG_LEVEL") {
            let level = level.trim().to_string();
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(Error::Configuration(
                "cache.ttl_secs must be greater than 0".to_string(),
            ));
        }

        if self.decrypt_timeout_secs == 0 {
            return Err(Error::Configuration(
                "decrypt_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.batch.credential_keys.is_empty() {
            return Err(Error::Configuration(
                "batch.credential_keys must name at least one credential".to_string(),
            ));
        }

        if self.passphrase.master_var.is_empty() || self.passphrase.deployment_var.is_empty() {
            return Err(Error::Configuration(
                "passphrase variable names must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Startup check against the source that will supply the passphrase
    ///
    /// In production with encryption enabled, a missing master passphrase
    /// and deployment key is fatal here rather than on first use.
    pub fn validate_startup(&self, source: &dyn CredentialSource) -> Result<()> {
        if !(self.environment.is_production() && self.encryption_enabled) {
            return Ok(());
        }

        let has_master = source.lookup(&self.passphrase.master_var).is_some();
        let has_deployment = source.lookup(&self.passphrase.deployment_var).is_some();
        if !has_master && !has_deployment {
            return Err(Error::Configuration(format!(
                "Master password or deployment key required in production: set {} or {}",
                self.passphrase.master_var, self.passphrase.deployment_var
            )));
        }

        Ok(())
    }

    /// Upper bound on one decrypt attempt
    pub fn decrypt_timeout(&self) -> Duration {
        Duration::from_secs(self.decrypt_timeout_secs)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Substitute environment variables in config content
/// Supports ${VAR_NAME} syntax
fn substitute_env_vars(content: &str) -> String {
    let re = match regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };

    re.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MapSource;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.environment, RuntimeEnvironment::Development);
        assert!(config.encryption_enabled);
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.batch.credential_keys.len(), 4);
        assert_eq!(config.batch.placeholders, vec!["your_api_key_here"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_lenient() {
        assert_eq!(
            RuntimeEnvironment::parse_lenient("Production"),
            RuntimeEnvironment::Production
        );
        assert_eq!(
            RuntimeEnvironment::parse_lenient("staging"),
            RuntimeEnvironment::Staging
        );
        assert_eq!(
            RuntimeEnvironment::parse_lenient("qa"),
            RuntimeEnvironment::Development
        );
    }

    #[test]
    fn test_save_load_yaml_and_json() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.ttl_secs = 60;
        config.batch.key_prefix = "APP_".to_string();

        for name in ["config.yaml", "config.json"] {
            let path = temp.path().join(name);
            config.save(&path).unwrap();
            let loaded = Config::load(&path).unwrap();
            assert_eq!(loaded.batch.key_prefix, "APP_");
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "decrypt_timeout_secs: 5\ncache:\n  enabled: false\n").unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.decrypt_timeout(), Duration::from_secs(5));
        assert_eq!(loaded.passphrase.master_var, DEFAULT_MASTER_PASSWORD_VAR);
        assert!(!loaded.cache.enabled);
        assert_eq!(loaded.cache.ttl_secs, DEFAULT_CACHE_TTL_SECS);
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("ENVSEAL_TEST_SUBST_VAR", "OTHER_MASTER");
        let out = substitute_env_vars("master_var: ${ENVSEAL_TEST_SUBST_VAR}\nx: ${UNSET_ENVSEAL_VAR}");
        assert_eq!(out, "master_var: OTHER_MASTER\nx: ${UNSET_ENVSEAL_VAR}");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.cache.ttl_secs = 0;
        assert!(config.validate().unwrap_err().is_configuration());

        let mut config = Config::default();
        config.decrypt_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.batch.credential_keys.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_startup_production() {
        let config = Config {
            environment: RuntimeEnvironment::Production,
            ..Config::default()
        };

        let empty = MapSource::new();
        assert!(config.validate_startup(&empty).unwrap_err().is_configuration());

        let with_deployment: MapSource = [(DEFAULT_DEPLOYMENT_KEY_VAR, "k")].into_iter().collect();
        assert!(config.validate_startup(&with_deployment).is_ok());

        let disabled = Config {
            encryption_enabled: false,
            ..config.clone()
        };
        assert!(disabled.validate_startup(&empty).is_ok());
    }

    #[test]
    fn test_validate_startup_development_is_lenient() {
        let config = Config::default();
        assert!(config.validate_startup(&MapSource::new()).is_ok());
    }
}
