use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::crypto::{Cipher, XChaCha20Poly1305Cipher};

/// Bank login credentials as entered at the UI boundary. Handed to the
/// vault for storage and resolved again only for a connector call; never
/// stored on an account record.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

// The password must not reach logs or error messages through a stray {:?}.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opaque handle to a vault entry. Safe to persist, log and hand to the UI.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CredentialRef(pub u64);

impl fmt::Display for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cred-{}", self.0)
    }
}

/// A vault entry as it sits in the database file: ciphertext only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VaultEntry {
    pub ref_id: CredentialRef,
    pub ciphertext: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("unknown credential ref {0}")]
    UnknownRef(CredentialRef),
    #[error("credential encryption failed: {0}")]
    Crypto(#[source] anyhow::Error),
    #[error("credential encoding failed: {0}")]
    Encoding(#[from] postcard::Error),
}

/// Opaque storage for per-account login secrets. Entries are encrypted
/// before they sit in memory at rest, so database snapshots only ever see
/// ciphertext.
pub struct CredentialVault {
    cipher: XChaCha20Poly1305Cipher,
    next_ref: AtomicU64,
    entries: RwLock<HashMap<CredentialRef, Vec<u8>>>,
}

impl CredentialVault {
    pub fn new(cipher: XChaCha20Poly1305Cipher) -> Self {
        Self::restore(cipher, 1, vec![])
    }

    pub fn restore(
        cipher: XChaCha20Poly1305Cipher,
        next_ref: u64,
        entries: Vec<VaultEntry>,
    ) -> Self {
        Self {
            cipher,
            next_ref: AtomicU64::new(next_ref),
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|entry| (entry.ref_id, entry.ciphertext))
                    .collect(),
            ),
        }
    }

    pub fn store(&self, credentials: &Credentials) -> Result<CredentialRef, VaultError> {
        let plaintext = postcard::to_stdvec(credentials)?;
        let ciphertext = self.cipher.encrypt(&plaintext).map_err(VaultError::Crypto)?;
        let ref_id = CredentialRef(self.next_ref.fetch_add(1, Ordering::SeqCst));
        self.entries.write().unwrap().insert(ref_id, ciphertext);
        Ok(ref_id)
    }

    /// Only called on the connector path, immediately before a test or
    /// fetch. The plaintext never travels further up.
    pub fn resolve(&self, ref_id: CredentialRef) -> Result<Credentials, VaultError> {
        let ciphertext = self
            .entries
            .read()
            .unwrap()
            .get(&ref_id)
            .cloned()
            .ok_or(VaultError::UnknownRef(ref_id))?;
        let plaintext = self.cipher.decrypt(&ciphertext).map_err(VaultError::Crypto)?;
        Ok(postcard::from_bytes(&plaintext)?)
    }

    pub fn revoke(&self, ref_id: CredentialRef) {
        self.entries.write().unwrap().remove(&ref_id);
    }

    pub fn snapshot(&self) -> (u64, Vec<VaultEntry>) {
        let mut entries: Vec<VaultEntry> = self
            .entries
            .read()
            .unwrap()
            .iter()
            .map(|(ref_id, ciphertext)| VaultEntry {
                ref_id: *ref_id,
                ciphertext: ciphertext.clone(),
            })
            .collect();
        entries.sort_by_key(|entry| entry.ref_id.0);
        (self.next_ref.load(Ordering::SeqCst), entries)
    }
}
