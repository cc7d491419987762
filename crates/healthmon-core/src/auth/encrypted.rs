//! Passphrase-protected credential vault for hosts without a keychain.
//!
//! All entries live in one JSON map encrypted with ChaCha20-Poly1305. The key
//! is derived from the passphrase with Argon2 and a per-vault random salt.
//! Every write re-encrypts the whole map under a fresh nonce.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use argon2::Argon2;
use async_trait::async_trait;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::credentials::CredentialStore;
use super::error::StoreError;

/// Nonce size for ChaCha20-Poly1305 (96 bits = 12 bytes).
const NONCE_SIZE: usize = 12;

/// Key size for ChaCha20-Poly1305 (256 bits = 32 bytes).
const KEY_SIZE: usize = 32;

const SALT_SIZE: usize = 16;

#[derive(Serialize, Deserialize)]
struct VaultFile {
    salt: Vec<u8>,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

pub struct EncryptedFileStore {
    path: PathBuf,
    salt: [u8; SALT_SIZE],
    cipher: ChaCha20Poly1305,
    entries: Mutex<HashMap<String, String>>,
}

impl EncryptedFileStore {
    /// Open the vault at `path`, creating it on first write.
    /// Fails with `StoreError::Crypto` when the passphrase does not match.
    pub fn open(path: impl Into<PathBuf>, passphrase: &str) -> Result<Self, StoreError> {
        let path = path.into();

        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let vault: VaultFile = serde_json::from_str(&contents)?;
            let salt: [u8; SALT_SIZE] = vault
                .salt
                .as_slice()
                .try_into()
                .map_err(|_| StoreError::Crypto("Invalid salt length".to_string()))?;
            let cipher = Self::derive_cipher(passphrase, &salt)?;
            let entries = Self::decrypt(&cipher, &vault)?;
            debug!(path = %path.display(), entries = entries.len(), "Opened credential vault");

            Ok(Self {
                path,
                salt,
                cipher,
                entries: Mutex::new(entries),
            })
        } else {
            let mut salt = [0u8; SALT_SIZE];
            rand::thread_rng().fill_bytes(&mut salt);
            let cipher = Self::derive_cipher(passphrase, &salt)?;

            Ok(Self {
                path,
                salt,
                cipher,
                entries: Mutex::new(HashMap::new()),
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn derive_cipher(passphrase: &str, salt: &[u8]) -> Result<ChaCha20Poly1305, StoreError> {
        let mut key = [0u8; KEY_SIZE];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| StoreError::Crypto(e.to_string()))?;
        ChaCha20Poly1305::new_from_slice(&key).map_err(|e| StoreError::Crypto(e.to_string()))
    }

    fn decrypt(
        cipher: &ChaCha20Poly1305,
        vault: &VaultFile,
    ) -> Result<HashMap<String, String>, StoreError> {
        if vault.nonce.len() != NONCE_SIZE {
            return Err(StoreError::Crypto(format!(
                "Invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                vault.nonce.len()
            )));
        }

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&vault.nonce), vault.ciphertext.as_slice())
            .map_err(|_| StoreError::Crypto("Wrong passphrase or corrupted vault".to_string()))?;

        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let plaintext = serde_json::to_vec(entries)?;
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| StoreError::Crypto(e.to_string()))?;

        let vault = VaultFile {
            salt: self.salt.to_vec(),
            nonce: nonce.to_vec(),
            ciphertext,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write-then-rename so a crash never leaves a half-written vault
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(&vault)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for EncryptedFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}
