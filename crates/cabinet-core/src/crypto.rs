//! Cryptographic primitives for the cabinet file
//!
//! - Argon2id derives the cabinet key and a verifier key from the password
//! - AES-256-GCM encrypts the cabinet body and every entry value
//! - SHA-256 checksums guard the decrypted body against tampering

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params, Version};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CabinetError, CabinetResult};
use crate::models::CabinetConfig;

/// Size of AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of Argon2 salt in bytes
pub const SALT_SIZE: usize = 32;

/// Key material derived from the cabinet password.
///
/// `cabinet_key` encrypts data; `verifier_key` is never used for encryption and
/// only serves to check a candidate password against an open cabinet.
pub struct DerivedKeys {
    cabinet_key: Secret<[u8; KEY_SIZE]>,
    verifier_key: Secret<[u8; KEY_SIZE]>,
}

impl DerivedKeys {
    /// Derive keys from a password using Argon2id with the configured cost
    pub fn derive(
        password: &[u8],
        salt: &[u8; SALT_SIZE],
        config: &CabinetConfig,
    ) -> CabinetResult<Self> {
        let params = Params::new(
            config.argon2_memory_kb,
            config.argon2_iterations,
            config.argon2_parallelism,
            Some(KEY_SIZE * 2),
        )
        .map_err(|e| CabinetError::KeyDerivationError(e.to_string()))?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

        let mut output = [0u8; KEY_SIZE * 2];
        argon2
            .hash_password_into(password, salt, &mut output)
            .map_err(|e| CabinetError::KeyDerivationError(e.to_string()))?;

        let mut cabinet_key = [0u8; KEY_SIZE];
        let mut verifier_key = [0u8; KEY_SIZE];
        cabinet_key.copy_from_slice(&output[..KEY_SIZE]);
        verifier_key.copy_from_slice(&output[KEY_SIZE..]);

        output.zeroize();

        Ok(Self {
            cabinet_key: Secret::new(cabinet_key),
            verifier_key: Secret::new(verifier_key),
        })
    }

    /// Derive on the blocking pool so async callers keep their worker free
    pub async fn derive_blocking(
        password: Zeroizing<Vec<u8>>,
        salt: [u8; SALT_SIZE],
        config: CabinetConfig,
    ) -> CabinetResult<Self> {
        tokio::task::spawn_blocking(move || Self::derive(&password, &salt, &config))
            .await
            .map_err(|e| CabinetError::KeyDerivationError(e.to_string()))?
    }

    /// Encrypt data using AES-256-GCM with a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> CabinetResult<(Vec<u8>, [u8; NONCE_SIZE])> {
        let cipher = Aes256Gcm::new_from_slice(self.cabinet_key.expose_secret())
            .map_err(|e| CabinetError::EncryptionError(e.to_string()))?;

        let nonce_bytes = generate_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CabinetError::EncryptionError(e.to_string()))?;

        Ok((ciphertext, nonce_bytes))
    }

    /// Decrypt data using AES-256-GCM
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8; NONCE_SIZE]) -> CabinetResult<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(self.cabinet_key.expose_secret())
            .map_err(|e| CabinetError::DecryptionError(e.to_string()))?;

        let nonce = Nonce::from_slice(nonce);

        cipher.decrypt(nonce, ciphertext).map_err(|_| {
            CabinetError::DecryptionError(
                "Decryption failed - wrong password or corrupted data".to_string(),
            )
        })
    }

    /// Constant-time check that both key sets came from the same password and salt
    pub fn matches(&self, other: &DerivedKeys) -> bool {
        self.verifier_key
            .expose_secret()
            .as_slice()
            .ct_eq(other.verifier_key.expose_secret().as_slice())
            .into()
    }
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Generate a cryptographically secure random nonce
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Compute SHA-256 checksum of data
pub fn compute_checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Verify SHA-256 checksum in constant time
pub fn verify_checksum(data: &[u8], expected: &[u8; 32]) -> bool {
    compute_checksum(data)
        .as_slice()
        .ct_eq(expected.as_slice())
        .into()
}
