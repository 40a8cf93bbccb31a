//! Error types for cabinet operations

use thiserror::Error;

/// Errors that can occur while opening or using a cabinet
#[derive(Error, Debug)]
pub enum CabinetError {
    #[error("Cabinet could not be opened: {0}")]
    VaultOpenFailure(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Entry already exists: {0}")]
    DuplicateEntry(String),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Cabinet file corrupted or tampered")]
    Corrupted,

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Decryption error: {0}")]
    DecryptionError(String),

    #[error("Key derivation error: {0}")]
    KeyDerivationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type CabinetResult<T> = Result<T, CabinetError>;
