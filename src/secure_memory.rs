//! In-process store for secrets such as encryption keys.
//!
//! Plaintext entries live in [`Zeroizing`] buffers that are wiped when replaced, deleted or
//! dropped. Enclave entries are kept AES-256-GCM encrypted under a random per-store key and
//! only decrypted for the duration of a [`SecureMemoryStore::get`] call. Pages are not locked
//! in RAM: that needs `mlock`, which is `unsafe` and out of reach for this crate.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use zeroize::Zeroizing;

use crate::error::SqlMiddlewareDbError;

const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    LockedPlaintext,
    EncryptedEnclave,
}

enum Entry {
    Plain(Zeroizing<Vec<u8>>),
    /// Nonce followed by ciphertext and tag.
    Sealed(Vec<u8>),
}

impl Entry {
    fn mode(&self) -> StorageMode {
        match self {
            Entry::Plain(_) => StorageMode::LockedPlaintext,
            Entry::Sealed(_) => StorageMode::EncryptedEnclave,
        }
    }
}

/// Secrets by name.
pub struct SecureMemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    enclave_key: Zeroizing<[u8; 32]>,
}

impl Default for SecureMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SecureMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureMemoryStore")
            .field("entries", &self.count())
            .finish_non_exhaustive()
    }
}

fn not_found(key: &str) -> SqlMiddlewareDbError {
    SqlMiddlewareDbError::SecureMemoryError(format!("SECURE_MEMORY_KEY_NOT_FOUND:{key}"))
}

impl SecureMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let generated = Aes256Gcm::generate_key(&mut OsRng);
        let mut enclave_key = Zeroizing::new([0u8; 32]);
        enclave_key.copy_from_slice(generated.as_slice());
        Self {
            entries: RwLock::new(HashMap::new()),
            enclave_key,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.enclave_key.as_slice()))
    }

    /// Store `data` in plaintext mode, wiping any previous value under `key`.
    pub fn store(&self, key: &str, data: &[u8]) {
        let entry = Entry::Plain(Zeroizing::new(data.to_vec()));
        self.write().insert(key.to_string(), entry);
    }

    /// Store `data` encrypted, wiping any previous value under `key`.
    ///
    /// # Errors
    /// `SecureMemoryError` if encryption fails.
    pub fn store_enclave(&self, key: &str, data: &[u8]) -> Result<(), SqlMiddlewareDbError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self.cipher().encrypt(&nonce, data).map_err(|e| {
            SqlMiddlewareDbError::SecureMemoryError(format!("cannot seal {key}: {e}"))
        })?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        self.write().insert(key.to_string(), Entry::Sealed(sealed));
        Ok(())
    }

    /// A copy of the secret; callers own (and should wipe) the returned buffer.
    ///
    /// # Errors
    /// `SECURE_MEMORY_KEY_NOT_FOUND:<key>`, or a decryption failure for enclave entries.
    pub fn get(&self, key: &str) -> Result<Zeroizing<Vec<u8>>, SqlMiddlewareDbError> {
        let entries = self.read();
        match entries.get(key).ok_or_else(|| not_found(key))? {
            Entry::Plain(bytes) => Ok(Zeroizing::new(bytes.to_vec())),
            Entry::Sealed(sealed) => {
                if sealed.len() < NONCE_LEN {
                    return Err(SqlMiddlewareDbError::SecureMemoryError(format!(
                        "corrupt enclave entry {key}"
                    )));
                }
                let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
                let plaintext = self
                    .cipher()
                    .decrypt(Nonce::from_slice(nonce), ciphertext)
                    .map_err(|e| {
                        SqlMiddlewareDbError::SecureMemoryError(format!("cannot open {key}: {e}"))
                    })?;
                Ok(Zeroizing::new(plaintext))
            }
        }
    }

    /// The secret as UTF-8 text.
    ///
    /// # Errors
    /// As [`SecureMemoryStore::get`], plus `SecureMemoryError` for non-UTF-8 contents.
    pub fn get_string(&self, key: &str) -> Result<Zeroizing<String>, SqlMiddlewareDbError> {
        let bytes = self.get(key)?;
        let text = std::str::from_utf8(&bytes).map_err(|_| {
            SqlMiddlewareDbError::SecureMemoryError(format!("{key} is not valid UTF-8"))
        })?;
        Ok(Zeroizing::new(text.to_string()))
    }

    #[must_use]
    pub fn mode(&self, key: &str) -> Option<StorageMode> {
        self.read().get(key).map(Entry::mode)
    }

    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn delete(&self, key: &str) {
        self.write().remove(key);
    }

    pub fn destroy_all(&self) {
        let mut entries = self.write();
        let count = entries.len();
        entries.clear();
        tracing::debug!(count, "secure memory cleared");
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Stored key names, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_and_enclave_round_trip() {
        let store = SecureMemoryStore::new();
        store.store("db.key", b"plain-secret");
        store.store_enclave("vault.key", b"sealed-secret").unwrap();
        assert_eq!(store.get("db.key").unwrap().as_slice(), b"plain-secret");
        assert_eq!(store.get_string("vault.key").unwrap().as_str(), "sealed-secret");
        assert_eq!(store.mode("vault.key"), Some(StorageMode::EncryptedEnclave));
        assert_eq!(store.keys(), vec!["db.key".to_string(), "vault.key".to_string()]);
    }

    #[test]
    fn replace_delete_and_destroy() {
        let store = SecureMemoryStore::new();
        store.store("k", b"one");
        store.store_enclave("k", b"two").unwrap();
        assert_eq!(store.count(), 1);
        assert_eq!(store.get("k").unwrap().as_slice(), b"two");
        store.delete("k");
        assert!(!store.exists("k"));
        let err = store.get("k").unwrap_err();
        assert_eq!(err.code(), "SECURE_MEMORY_KEY_NOT_FOUND");
        assert!(err.to_string().contains("SECURE_MEMORY_KEY_NOT_FOUND:k"));
        store.store("a", b"1");
        store.store("b", b"2");
        store.destroy_all();
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn returned_copy_is_independent() {
        let store = SecureMemoryStore::new();
        store.store("k", b"abc");
        let mut copy = store.get("k").unwrap();
        copy[0] = b'z';
        assert_eq!(store.get("k").unwrap().as_slice(), b"abc");
    }
}
