//! Server configuration
//!
//! Read from an optional TOML file, then overridden by `CABINET_*`
//! environment variables and finally by command-line flags.

use secrecy::{Secret, SecretString};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use cabinet_core::storage::{default_config_dir, default_vault_dir};

use crate::session::{DEFAULT_MAX_SESSIONS_PER_USER, DEFAULT_SESSION_LIFETIME_SECS};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("no cabinet password configured (set CABINET_PASSWORD)")]
    MissingPassword,
}

/// Server configuration
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Account that owns the cabinet; logins must use it as username
    pub account_id: String,
    pub password: Option<SecretString>,
    /// Cabinet name
    pub vault_name: String,
    /// Directory holding cabinet tuning (`config.toml`)
    pub config_dir: PathBuf,
    /// Directory holding cabinet files
    pub vault_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub session_lifetime_secs: i64,
    /// Live sessions kept per username; older ones are evicted at login
    pub max_sessions_per_user: usize,
    pub token_ttl_secs: i64,
    /// Key material for signing tokens; random per process when unset
    pub secret_key: Option<SecretString>,
    /// Require a token for `App.get_all`, `App.get` and `App.add` as well
    pub gate_store_methods: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            account_id: "my-name@my-company.com".to_string(),
            password: None,
            vault_name: "test-vault".to_string(),
            config_dir: default_config_dir(),
            vault_dir: default_vault_dir(),
            host: "127.0.0.1".to_string(),
            port: 5000,
            session_lifetime_secs: DEFAULT_SESSION_LIFETIME_SECS,
            max_sessions_per_user: DEFAULT_MAX_SESSIONS_PER_USER,
            token_ttl_secs: DEFAULT_SESSION_LIFETIME_SECS,
            secret_key: None,
            gate_store_methods: false,
        }
    }
}

impl ServerConfig {
    /// Load from `path`, or defaults when no path is given
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        debug!("Reading config from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `CABINET_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `CABINET_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(account) = lookup("CABINET_ACCOUNT") {
            self.account_id = account;
        }
        if let Some(password) = lookup("CABINET_PASSWORD") {
            self.password = Some(Secret::new(password));
        }
        if let Some(name) = lookup("CABINET_NAME") {
            self.vault_name = name;
        }
        if let Some(dir) = lookup("CABINET_CONFIG_DIR") {
            self.config_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("CABINET_VAULT_DIR") {
            self.vault_dir = PathBuf::from(dir);
        }
        if let Some(host) = lookup("CABINET_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("CABINET_PORT") {
            self.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "CABINET_PORT",
                value: port,
            })?;
        }
        Ok(())
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.password.is_none() {
            return Err(ConfigError::MissingPassword);
        }
        if self.vault_name.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "vault_name",
                value: String::new(),
            });
        }
        if self.session_lifetime_secs <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "session_lifetime_secs",
                value: self.session_lifetime_secs.to_string(),
            });
        }
        if self.max_sessions_per_user == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_sessions_per_user",
                value: "0".to_string(),
            });
        }
        if self.token_ttl_secs <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "token_ttl_secs",
                value: self.token_ttl_secs.to_string(),
            });
        }
        Ok(())
    }

    /// `host:port` for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.vault_name, "test-vault");
        assert_eq!(config.bind_address(), "127.0.0.1:5000");
        assert!(config.vault_dir.ends_with("test.data/vaults"));
        assert!(config.config_dir.ends_with("test.data/secrets"));
        assert!(!config.gate_store_methods);
        assert!(config.password.is_none());
        assert_eq!(config.max_sessions_per_user, DEFAULT_MAX_SESSIONS_PER_USER);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ServerConfig::from_toml(
            r#"
            vault_name = "work"
            port = 8080
            gate_store_methods = true
            password = "hunter2"
            "#,
        )
        .unwrap();

        assert_eq!(config.vault_name, "work");
        assert_eq!(config.port, 8080);
        assert!(config.gate_store_methods);
        assert_eq!(config.password.unwrap().expose_secret(), "hunter2");
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(matches!(
            ServerConfig::from_toml("port = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = ServerConfig::default();
        config
            .apply_overrides(lookup_from(&[
                ("CABINET_ACCOUNT", "alice"),
                ("CABINET_PASSWORD", "pw123"),
                ("CABINET_VAULT_DIR", "/vaults/alice"),
                ("CABINET_PORT", "6000"),
            ]))
            .unwrap();

        assert_eq!(config.account_id, "alice");
        assert_eq!(config.vault_dir, PathBuf::from("/vaults/alice"));
        assert_eq!(config.port, 6000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_overrides(lookup_from(&[("CABINET_PORT", "http")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "CABINET_PORT", .. }));
    }

    #[test]
    fn test_validate_rejects_zero_session_cap() {
        let mut config = ServerConfig::from_toml("max_sessions_per_user = 0").unwrap();
        config
            .apply_overrides(lookup_from(&[("CABINET_PASSWORD", "pw123")]))
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key: "max_sessions_per_user", .. })
        ));
    }

    #[test]
    fn test_validate_requires_password() {
        assert!(matches!(
            ServerConfig::default().validate(),
            Err(ConfigError::MissingPassword)
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut config = ServerConfig::default();
        config
            .apply_overrides(lookup_from(&[("CABINET_PASSWORD", "pw123")]))
            .unwrap();
        assert!(!format!("{config:?}").contains("pw123"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = ServerConfig::load(Some(Path::new("/nonexistent/cabinet.toml")))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
