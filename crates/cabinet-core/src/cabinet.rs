//! The cabinet service object
//!
//! A `Cabinet` owns one opened, decrypted container together with its key
//! material. It is opened once, shared behind a lock, and closed explicitly.

use serde_json::Value;
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crypto::{DerivedKeys, SALT_SIZE};
use crate::error::{CabinetError, CabinetResult};
use crate::models::{item_name, CabinetConfig, CabinetData, EncryptedValue, EntryRecord, Item};
use crate::storage;

/// Confirmation returned by [`Cabinet::add`]
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AddedEntry {
    pub id: Uuid,
    pub name: String,
}

/// Decrypted contents of an opened cabinet
struct OpenCabinet {
    data: CabinetData,
    keys: DerivedKeys,
    salt: [u8; SALT_SIZE],
}

/// A named, password-protected secret container
pub struct Cabinet {
    name: String,
    vault_dir: PathBuf,
    config: CabinetConfig,
    inner: Option<OpenCabinet>,
}

impl Cabinet {
    /// Open the cabinet `name` stored in `vault_dir`.
    ///
    /// Tuning is read from `config_dir`. When no cabinet file exists and
    /// `create_if_missing` is set, an empty cabinet owned by `account_id` is
    /// created first.
    pub async fn open(
        account_id: &str,
        password: &[u8],
        config_dir: &Path,
        name: &str,
        vault_dir: &Path,
    ) -> CabinetResult<Self> {
        let config = storage::load_config(config_dir).await?;
        Self::open_with_config(account_id, password, config, name, vault_dir).await
    }

    /// Open with explicit tuning instead of reading it from disk
    pub async fn open_with_config(
        account_id: &str,
        password: &[u8],
        config: CabinetConfig,
        name: &str,
        vault_dir: &Path,
    ) -> CabinetResult<Self> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(CabinetError::VaultOpenFailure(format!(
                "invalid cabinet name: {name:?}"
            )));
        }

        if !storage::cabinet_exists(vault_dir, name) {
            if !config.create_if_missing {
                return Err(CabinetError::VaultOpenFailure(format!(
                    "no cabinet named {name} in {}",
                    vault_dir.display()
                )));
            }
            info!("Creating cabinet {} in {}", name, vault_dir.display());
            storage::create_cabinet(vault_dir, name, account_id, password, &config).await?;
        }

        let (data, keys, salt) = storage::load_cabinet(vault_dir, name, password, &config).await?;

        if !constant_time_str_eq(&data.account_id, account_id) {
            warn!("Cabinet {} opened with a foreign account id", name);
            return Err(CabinetError::InvalidCredentials);
        }

        debug!("Opened cabinet {} with {} entries", name, data.entries.len());

        Ok(Self {
            name: name.to_string(),
            vault_dir: vault_dir.to_path_buf(),
            config,
            inner: Some(OpenCabinet { data, keys, salt }),
        })
    }

    /// Close the cabinet, dropping (and zeroizing) its key material
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            info!("Closed cabinet {}", self.name);
        }
    }

    /// Whether the cabinet is still open
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Cabinet name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the cabinet file
    pub fn vault_dir(&self) -> &Path {
        &self.vault_dir
    }

    fn open_ref(&self) -> CabinetResult<&OpenCabinet> {
        self.inner
            .as_ref()
            .ok_or_else(|| CabinetError::VaultOpenFailure(format!("{} is closed", self.name)))
    }

    fn open_mut(&mut self) -> CabinetResult<&mut OpenCabinet> {
        let name = &self.name;
        self.inner
            .as_mut()
            .ok_or_else(|| CabinetError::VaultOpenFailure(format!("{name} is closed")))
    }

    /// Salt and tuning needed to derive candidate keys without holding the cabinet
    pub fn key_params(&self) -> CabinetResult<([u8; SALT_SIZE], CabinetConfig)> {
        Ok((self.open_ref()?.salt, self.config.clone()))
    }

    /// Check a login attempt against this cabinet.
    ///
    /// The username must be the owning account, the password must derive the
    /// same keys and `vault_path` must name this cabinet's storage directory.
    /// Every mismatch reports the same `InvalidCredentials`.
    ///
    /// Runs the key derivation inline; async callers should derive with
    /// [`DerivedKeys::derive_blocking`] and use [`Cabinet::check_credentials`].
    pub fn verify_credentials(
        &self,
        username: &str,
        password: &[u8],
        vault_path: &str,
    ) -> CabinetResult<()> {
        let (salt, config) = self.key_params()?;
        let candidate = DerivedKeys::derive(password, &salt, &config)?;
        self.check_credentials(username, &candidate, vault_path)
    }

    /// Check a login attempt whose keys were derived from [`Cabinet::key_params`]
    pub fn check_credentials(
        &self,
        username: &str,
        candidate: &DerivedKeys,
        vault_path: &str,
    ) -> CabinetResult<()> {
        let open = self.open_ref()?;

        let account_ok = constant_time_str_eq(&open.data.account_id, username);
        let path_ok = same_dir(Path::new(vault_path), &self.vault_dir);
        let password_ok = open.keys.matches(candidate);

        if account_ok && path_ok && password_ok {
            Ok(())
        } else {
            Err(CabinetError::InvalidCredentials)
        }
    }

    /// All entries, in insertion order
    pub fn get_all(&self) -> CabinetResult<Vec<Item>> {
        let open = self.open_ref()?;
        open.data
            .entries
            .iter()
            .map(|record| decrypt_item(open, record))
            .collect()
    }

    /// The entry called `name`
    pub fn get(&self, name: &str) -> CabinetResult<Item> {
        let open = self.open_ref()?;
        let record = open
            .data
            .find_by_name(name)
            .ok_or_else(|| CabinetError::EntryNotFound(name.to_string()))?;
        decrypt_item(open, record)
    }

    /// Number of stored entries
    pub fn len(&self) -> CabinetResult<usize> {
        Ok(self.open_ref()?.data.entries.len())
    }

    pub fn is_empty(&self) -> CabinetResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Insert a new entry keyed by its `name` field and persist the cabinet
    pub async fn add(&mut self, item: Item) -> CabinetResult<AddedEntry> {
        let name = item_name(&item)?.to_string();
        let vault_dir = self.vault_dir.clone();
        let cabinet_name = self.name.clone();
        let open = self.open_mut()?;

        if open.data.name_exists(&name) {
            return Err(CabinetError::DuplicateEntry(name));
        }

        let plaintext = serde_json::to_vec(&Value::Object(item))?;
        let (ciphertext, nonce) = open.keys.encrypt(&plaintext)?;

        let record = EntryRecord::new(name.clone());
        let id = record.id;
        open.data
            .encrypted_values
            .insert(id, EncryptedValue { nonce, ciphertext });
        open.data.entries.push(record);

        if let Err(e) =
            storage::save_cabinet(&vault_dir, &cabinet_name, &open.data, &open.keys, &open.salt)
                .await
        {
            // Keep memory consistent with disk
            open.data.entries.retain(|r| r.id != id);
            open.data.encrypted_values.remove(&id);
            return Err(e);
        }

        debug!("Added entry {} to cabinet {}", name, cabinet_name);
        Ok(AddedEntry { id, name })
    }
}

fn decrypt_item(open: &OpenCabinet, record: &EntryRecord) -> CabinetResult<Item> {
    let value = open
        .data
        .encrypted_values
        .get(&record.id)
        .ok_or(CabinetError::Corrupted)?;
    let plaintext = open.keys.decrypt(&value.ciphertext, &value.nonce)?;

    match serde_json::from_slice(&plaintext)? {
        Value::Object(item) => Ok(item),
        _ => Err(CabinetError::Corrupted),
    }
}

fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.components().eq(b.components()),
    }
}
