//! Cryptographic primitives.
//!
//! This module provides:
//! - X25519 key agreement with a low-order point check
//! - ChaCha20-Poly1305 AEAD with direction-salted counter nonces
//! - HKDF-SHA256 extract/expand and the session key schedule
//! - OS-backed randomness and secret scrubbing
//!
//! All secret material is zeroized on drop.

mod aead;
mod kdf;
mod keys;
mod random;

pub use aead::{ciphertext_len, Aead, AeadKey, Nonce};
pub use kdf::{ct_eq, hkdf_expand, hkdf_extract, xor_in_place, Hkdf, MasterSecret, Prk};
pub use keys::{EphemeralSecret, PublicKey, SharedSecret, StaticSecret};
pub use random::{random_padding, SecureRandom};

use zeroize::Zeroize;

use crate::error::Result;

/// Size of symmetric keys in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of AEAD nonce in bytes (96 bits for ChaCha20-Poly1305)
pub const NONCE_SIZE: usize = 12;

/// Size of AEAD authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of X25519 public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of the raw X25519 shared secret
pub const SHARED_SECRET_SIZE: usize = 32;

/// Size of an HKDF-SHA256 pseudorandom key
pub const PRK_SIZE: usize = 32;

/// Size of the per-session master secret
pub const MASTER_SECRET_SIZE: usize = 48;

/// Generate a fresh X25519 key pair.
pub fn generate_keypair() -> (PublicKey, StaticSecret) {
    let secret = StaticSecret::random();
    (PublicKey::from(&secret), secret)
}

/// X25519 agreement that fails closed on a degenerate shared point.
pub fn ecdh(secret: &StaticSecret, peer: &PublicKey) -> Result<SharedSecret> {
    secret.diffie_hellman(peer)
}

/// One-shot ChaCha20-Poly1305 encryption.
pub fn aead_encrypt(key: &AeadKey, nonce: &Nonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    Aead::new(key).encrypt(nonce, plaintext, aad)
}

/// One-shot ChaCha20-Poly1305 decryption.
pub fn aead_decrypt(key: &AeadKey, nonce: &Nonce, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    Aead::new(key).decrypt(nonce, ciphertext, aad)
}

/// Overwrite a sensitive buffer in a way the optimizer cannot elide.
pub fn secure_zero(buf: &mut [u8]) {
    buf.zeroize();
}
