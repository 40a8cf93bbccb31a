//! Shared server state
//!
//! Holds the opened cabinet, the session store and the token issuer.

use chrono::Duration;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use cabinet_core::{Cabinet, CabinetError};

use crate::auth::TokenIssuer;
use crate::config::{ConfigError, ServerConfig};
use crate::session::SessionStore;

/// Thread-safe cabinet handle
pub type SharedCabinet = Arc<RwLock<Cabinet>>;

/// State shared by every request
#[derive(Clone)]
pub struct AppState {
    pub cabinet: SharedCabinet,
    pub sessions: SessionStore,
    pub issuer: Arc<TokenIssuer>,
}

impl AppState {
    pub fn new(cabinet: Cabinet, sessions: SessionStore, issuer: TokenIssuer) -> Self {
        Self {
            cabinet: Arc::new(RwLock::new(cabinet)),
            sessions,
            issuer: Arc::new(issuer),
        }
    }

    /// Build state around an opened cabinet using the configured lifetimes
    pub fn from_config(cabinet: Cabinet, config: &ServerConfig) -> Self {
        let issuer = match &config.secret_key {
            Some(secret) => TokenIssuer::from_secret(
                secret.expose_secret(),
                Duration::seconds(config.token_ttl_secs),
            ),
            None => TokenIssuer::random(Duration::seconds(config.token_ttl_secs)),
        };
        let sessions = SessionStore::new(Duration::seconds(config.session_lifetime_secs))
            .with_max_per_user(config.max_sessions_per_user);
        Self::new(cabinet, sessions, issuer)
    }

    /// Close the cabinet; later calls see `VaultOpenFailure`
    pub async fn close(&self) {
        self.cabinet.write().await.close();
    }
}

/// Open the configured cabinet
pub async fn open_cabinet(config: &ServerConfig) -> Result<Cabinet, OpenError> {
    let password = config.password.as_ref().ok_or(ConfigError::MissingPassword)?;

    info!(
        "Opening cabinet {} in {}",
        config.vault_name,
        config.vault_dir.display()
    );

    let cabinet = Cabinet::open(
        &config.account_id,
        password.expose_secret().as_bytes(),
        &config.config_dir,
        &config.vault_name,
        &config.vault_dir,
    )
    .await?;

    Ok(cabinet)
}

/// Failure to bring the cabinet up at startup
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cabinet(#[from] CabinetError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use tempfile::TempDir;

    fn config_in(temp: &TempDir) -> ServerConfig {
        ServerConfig {
            account_id: "alice".to_string(),
            password: Some(Secret::new("pw123".to_string())),
            config_dir: temp.path().join("secrets"),
            vault_dir: temp.path().join("vaults"),
            ..ServerConfig::default()
        }
    }

    async fn write_fast_tuning(temp: &TempDir) {
        cabinet_core::storage::save_config(
            &temp.path().join("secrets"),
            &cabinet_core::CabinetConfig::for_tests(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let temp = TempDir::new().unwrap();
        write_fast_tuning(&temp).await;
        let config = config_in(&temp);

        let cabinet = open_cabinet(&config).await.unwrap();
        let state = AppState::from_config(cabinet, &config);
        assert!(state.cabinet.read().await.is_open());
        assert_eq!(state.sessions.max_per_user(), config.max_sessions_per_user);

        state.close().await;
        assert!(!state.cabinet.read().await.is_open());
    }

    #[tokio::test]
    async fn test_open_requires_password() {
        let temp = TempDir::new().unwrap();
        let config = ServerConfig {
            password: None,
            ..config_in(&temp)
        };

        assert!(matches!(
            open_cabinet(&config).await,
            Err(OpenError::Config(ConfigError::MissingPassword))
        ));
    }
}
