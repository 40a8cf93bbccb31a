//! Encrypted file storage for cabinet data
//!
//! Handles reading/writing encrypted cabinet files with:
//! - Atomic writes (write to temp, then rename)
//! - A backup of the previous file before every write
//! - Version checking for migrations

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::{compute_checksum, generate_salt, verify_checksum, DerivedKeys, SALT_SIZE};
use crate::error::{CabinetError, CabinetResult};
use crate::models::{CabinetConfig, CabinetData, EncryptedCabinet};

/// Default data directory name
const DATA_DIR: &str = "test.data";

/// Cabinet file extension
const CABINET_EXT: &str = "cabinet";

/// Config file name
const CONFIG_FILE: &str = "config.toml";

/// Default directory holding cabinet tuning (`./test.data/secrets`)
pub fn default_config_dir() -> PathBuf {
    working_dir().join(DATA_DIR).join("secrets")
}

/// Default directory holding cabinet files (`./test.data/vaults`)
pub fn default_vault_dir() -> PathBuf {
    working_dir().join(DATA_DIR).join("vaults")
}

fn working_dir() -> PathBuf {
    std::env::current_dir()
        .ok()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the cabinet file path
pub fn cabinet_file_path(vault_dir: &Path, name: &str) -> PathBuf {
    vault_dir.join(format!("{name}.{CABINET_EXT}"))
}

/// Get the backup file path
pub fn backup_file_path(vault_dir: &Path, name: &str) -> PathBuf {
    vault_dir.join(format!("{name}.{CABINET_EXT}.backup"))
}

/// Get the config file path
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE)
}

/// Ensure a storage directory exists with owner-only permissions
pub async fn ensure_dir(dir: &Path) -> CabinetResult<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            fs::set_permissions(dir, perms).await?;
        }
    }
    Ok(())
}

/// Check if a cabinet exists at the given path
pub fn cabinet_exists(vault_dir: &Path, name: &str) -> bool {
    cabinet_file_path(vault_dir, name).exists()
}

/// Create a new empty cabinet owned by `account_id`
pub async fn create_cabinet(
    vault_dir: &Path,
    name: &str,
    account_id: &str,
    password: &[u8],
    config: &CabinetConfig,
) -> CabinetResult<()> {
    ensure_dir(vault_dir).await?;

    let path = cabinet_file_path(vault_dir, name);
    if path.exists() {
        return Err(CabinetError::Config(format!(
            "Cabinet already exists: {}",
            path.display()
        )));
    }

    let salt = generate_salt();
    let keys =
        DerivedKeys::derive_blocking(Zeroizing::new(password.to_vec()), salt, config.clone())
            .await?;

    let data = CabinetData::new(account_id);
    let encrypted = seal(&data, &keys, &salt)?;
    write_cabinet_file(&path, &encrypted).await?;

    debug!("Created cabinet {}", path.display());
    Ok(())
}

/// Load and decrypt a cabinet, returning its contents, keys and salt
pub async fn load_cabinet(
    vault_dir: &Path,
    name: &str,
    password: &[u8],
    config: &CabinetConfig,
) -> CabinetResult<(CabinetData, DerivedKeys, [u8; SALT_SIZE])> {
    let path = cabinet_file_path(vault_dir, name);

    if !path.exists() {
        return Err(CabinetError::VaultOpenFailure(format!(
            "no cabinet at {}",
            path.display()
        )));
    }

    let encrypted = read_cabinet_file(&path).await?;

    if encrypted.version > EncryptedCabinet::CURRENT_VERSION {
        return Err(CabinetError::Config(format!(
            "Cabinet version {} is newer than supported version {}",
            encrypted.version,
            EncryptedCabinet::CURRENT_VERSION
        )));
    }

    let keys = DerivedKeys::derive_blocking(
        Zeroizing::new(password.to_vec()),
        encrypted.salt,
        config.clone(),
    )
    .await?;

    let plaintext = keys
        .decrypt(&encrypted.ciphertext, &encrypted.nonce)
        .map_err(|_| CabinetError::InvalidCredentials)?;

    if !verify_checksum(&plaintext, &encrypted.checksum) {
        return Err(CabinetError::Corrupted);
    }

    let data: CabinetData = serde_json::from_slice(&plaintext)?;

    Ok((data, keys, encrypted.salt))
}

/// Save cabinet data (backs up the previous file first)
pub async fn save_cabinet(
    vault_dir: &Path,
    name: &str,
    data: &CabinetData,
    keys: &DerivedKeys,
    salt: &[u8; SALT_SIZE],
) -> CabinetResult<()> {
    let path = cabinet_file_path(vault_dir, name);
    let backup_path = backup_file_path(vault_dir, name);

    if path.exists() {
        fs::copy(&path, &backup_path).await?;
    }

    let encrypted = seal(data, keys, salt)?;

    let temp_path = path.with_extension(format!("{CABINET_EXT}.tmp"));
    write_cabinet_file(&temp_path, &encrypted).await?;
    fs::rename(&temp_path, &path).await?;

    Ok(())
}

fn seal(
    data: &CabinetData,
    keys: &DerivedKeys,
    salt: &[u8; SALT_SIZE],
) -> CabinetResult<EncryptedCabinet> {
    let plaintext = serde_json::to_vec(data)?;
    let checksum = compute_checksum(&plaintext);
    let (ciphertext, nonce) = keys.encrypt(&plaintext)?;

    Ok(EncryptedCabinet {
        version: EncryptedCabinet::CURRENT_VERSION,
        salt: *salt,
        nonce,
        ciphertext,
        checksum,
    })
}

async fn read_cabinet_file(path: &Path) -> CabinetResult<EncryptedCabinet> {
    let mut file = fs::File::open(path).await?;
    let mut data = Vec::new();
    file.read_to_end(&mut data).await?;

    serde_json::from_slice(&data).map_err(|_| CabinetError::Corrupted)
}

async fn write_cabinet_file(path: &Path, encrypted: &EncryptedCabinet) -> CabinetResult<()> {
    let data = serde_json::to_vec(encrypted)?;

    let mut file = fs::File::create(path).await?;
    file.write_all(&data).await?;
    file.sync_all().await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms).await?;
    }

    Ok(())
}

/// Load cabinet tuning, falling back to defaults when no config file exists
pub async fn load_config(config_dir: &Path) -> CabinetResult<CabinetConfig> {
    let config_path = config_file_path(config_dir);

    if !config_path.exists() {
        return Ok(CabinetConfig::default());
    }

    let content = fs::read_to_string(&config_path).await?;
    toml::from_str(&content).map_err(|e| CabinetError::Config(e.to_string()))
}

/// Save cabinet tuning
pub async fn save_config(config_dir: &Path, config: &CabinetConfig) -> CabinetResult<()> {
    ensure_dir(config_dir).await?;

    let content =
        toml::to_string_pretty(config).map_err(|e| CabinetError::Config(e.to_string()))?;
    fs::write(config_file_path(config_dir), content).await?;

    Ok(())
}
