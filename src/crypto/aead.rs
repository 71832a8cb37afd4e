//! Authenticated Encryption with Associated Data (AEAD).
//!
//! ChaCha20-Poly1305 with a 96-bit nonce built from a 4-byte direction salt
//! and the 64-bit packet counter.

use chacha20poly1305::{
    aead::{Aead as AeadTrait, KeyInit, Payload},
    ChaCha20Poly1305, Key,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};

/// A symmetric key for AEAD operations.
///
/// Automatically zeroized when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey([u8; KEY_SIZE]);

impl AeadKey {
    /// Create a new AEAD key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AeadKey(<redacted>)")
    }
}

/// A 96-bit AEAD nonce.
///
/// Layout: `salt[4] || counter (u64 big-endian)`. The salt separates the two
/// directions of a session that share one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Create a nonce from a counter with an all-zero salt.
    pub fn new(counter: u64) -> Self {
        Self::with_salt([0u8; 4], counter)
    }

    /// Create a nonce from a direction salt and a counter.
    pub fn with_salt(salt: [u8; 4], counter: u64) -> Self {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..4].copy_from_slice(&salt);
        nonce[4..].copy_from_slice(&counter.to_be_bytes());
        Self(nonce)
    }

    /// Get the raw nonce bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// Get the counter portion.
    pub fn counter(&self) -> u64 {
        let mut counter = [0u8; 8];
        counter.copy_from_slice(&self.0[4..]);
        u64::from_be_bytes(counter)
    }
}

impl From<u64> for Nonce {
    fn from(counter: u64) -> Self {
        Self::new(counter)
    }
}

/// ChaCha20-Poly1305 AEAD cipher.
pub struct Aead {
    cipher: ChaCha20Poly1305,
}

impl Aead {
    /// Create a new AEAD instance with the given key.
    pub fn new(key: &AeadKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.as_bytes())),
        }
    }

    /// Encrypt plaintext, returning `ciphertext || tag`.
    ///
    /// # Arguments
    ///
    /// * `nonce` - Must be unique for this key
    /// * `plaintext` - Data to encrypt
    /// * `aad` - Additional data to authenticate (but not encrypt)
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let payload = Payload {
            msg: plaintext,
            aad,
        };

        self.cipher
            .encrypt(chacha20poly1305::Nonce::from_slice(nonce.as_bytes()), payload)
            .map_err(|_| Error::crypto("encryption failed"))
    }

    /// Decrypt `ciphertext || tag`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthenticationFailure`] if the tag does not verify
    /// (wrong key, wrong nonce, wrong AAD or tampered data). No partial
    /// plaintext is ever returned.
    pub fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_SIZE {
            return Err(Error::malformed(format!(
                "ciphertext of {} bytes is shorter than the tag",
                ciphertext.len()
            )));
        }

        let payload = Payload {
            msg: ciphertext,
            aad,
        };

        self.cipher
            .decrypt(chacha20poly1305::Nonce::from_slice(nonce.as_bytes()), payload)
            .map_err(|_| Error::AuthenticationFailure)
    }
}

/// Calculate the ciphertext length for a given plaintext length.
pub const fn ciphertext_len(plaintext_len: usize) -> usize {
    plaintext_len + TAG_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> AeadKey {
        let mut key = [0u8; KEY_SIZE];
        for (i, b) in key.iter_mut().enumerate() {
            *b = i as u8;
        }
        AeadKey::from_bytes(key)
    }

    #[test]
    fn test_encrypt_decrypt() {
        let aead = Aead::new(&test_key());
        let nonce = Nonce::new(1);
        let plaintext = b"Hello, World!";
        let aad = b"header";

        let ciphertext = aead.encrypt(&nonce, plaintext, aad).unwrap();
        assert_eq!(ciphertext.len(), ciphertext_len(plaintext.len()));

        let decrypted = aead.decrypt(&nonce, &ciphertext, aad).unwrap();
        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_tampered_ciphertext() {
        let aead = Aead::new(&test_key());
        let nonce = Nonce::new(1);

        let mut ciphertext = aead.encrypt(&nonce, b"Secret message", b"").unwrap();
        ciphertext[0] ^= 0x01;

        let err = aead.decrypt(&nonce, &ciphertext, b"").unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailure));
    }

    #[test]
    fn test_wrong_aad_and_salt() {
        let aead = Aead::new(&test_key());
        let nonce = Nonce::with_salt([0, 0, 0, 1], 9);
        let ciphertext = aead.encrypt(&nonce, b"Secret", b"correct").unwrap();

        assert!(aead.decrypt(&nonce, &ciphertext, b"wrong").is_err());

        let other_direction = Nonce::with_salt([0, 0, 0, 2], 9);
        assert!(aead.decrypt(&other_direction, &ciphertext, b"correct").is_err());
    }

    #[test]
    fn test_short_ciphertext() {
        let aead = Aead::new(&test_key());
        let err = aead.decrypt(&Nonce::new(0), &[0u8; 15], b"").unwrap_err();
        assert!(matches!(err, Error::MalformedPacket(_)));
    }

    #[test]
    fn test_nonce_layout() {
        let nonce = Nonce::with_salt([0xaa, 0xbb, 0xcc, 0xdd], 0x0102);
        assert_eq!(
            nonce.as_bytes(),
            &[0xaa, 0xbb, 0xcc, 0xdd, 0, 0, 0, 0, 0, 0, 0x01, 0x02]
        );
        assert_eq!(nonce.counter(), 0x0102);
        assert_ne!(Nonce::new(1), Nonce::new(2));
    }
}
