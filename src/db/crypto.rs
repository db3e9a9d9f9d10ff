use anyhow::{bail, Result};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Key, XChaCha20Poly1305,
};

/// Symmetric cipher guarding credential blobs at rest.
pub trait Cipher {
    type EncryptionKey;

    fn new_key() -> Self::EncryptionKey;
    fn with_key(key: &Self::EncryptionKey) -> Self;
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

const NONCE_LEN: usize = 24;

/// XChaCha20-Poly1305 with the nonce prepended to the ciphertext.
pub struct XChaCha20Poly1305Cipher {
    cipher: XChaCha20Poly1305,
}

impl Cipher for XChaCha20Poly1305Cipher {
    type EncryptionKey = Key;

    fn new_key() -> Key {
        XChaCha20Poly1305::generate_key(&mut OsRng)
    }

    fn with_key(key: &Key) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(key),
        }
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        assert_eq!(NONCE_LEN, nonce.len());
        let ciphertext = self.cipher.encrypt(&nonce, plaintext)?;

        let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        result.extend_from_slice(&nonce);
        result.extend_from_slice(&ciphertext);

        Ok(result)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN {
            bail!("Ciphertext too small for nonce");
        }
        let (nonce, ciphertext) = ciphertext.split_at(NONCE_LEN);

        let plaintext = self.cipher.decrypt(nonce.into(), ciphertext)?;
        Ok(plaintext)
    }
}
