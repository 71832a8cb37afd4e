//! X25519 key agreement.
//!
//! Type-safe wrappers around x25519-dalek. Secret material is zeroized on
//! drop, and every agreement is checked for a non-contributory (all-zero)
//! result before it can reach the key schedule.

use std::fmt;

use x25519_dalek::{
    EphemeralSecret as DalekEphemeral, PublicKey as DalekPublic,
    SharedSecret as DalekShared, StaticSecret as DalekStatic,
};
use zeroize::ZeroizeOnDrop;

use crate::crypto::{PUBLIC_KEY_SIZE, SHARED_SECRET_SIZE};
use crate::error::{Error, Result};

/// A single-use X25519 secret.
///
/// Used for the key share of decoy ClientHello records.
pub struct EphemeralSecret(DalekEphemeral);

impl EphemeralSecret {
    /// Generate a new random ephemeral secret.
    pub fn random() -> Self {
        Self(DalekEphemeral::random_from_rng(rand_core::OsRng))
    }

    /// Perform X25519 key agreement, consuming the secret.
    pub fn diffie_hellman(self, their_public: &PublicKey) -> Result<SharedSecret> {
        SharedSecret::checked(self.0.diffie_hellman(&their_public.0))
    }
}

impl From<&EphemeralSecret> for PublicKey {
    fn from(secret: &EphemeralSecret) -> Self {
        PublicKey(DalekPublic::from(&secret.0))
    }
}

/// A long-term X25519 secret, one per engine.
#[derive(Clone, ZeroizeOnDrop)]
pub struct StaticSecret(DalekStatic);

impl StaticSecret {
    /// Generate a new random static secret.
    pub fn random() -> Self {
        Self(DalekStatic::random_from_rng(rand_core::OsRng))
    }

    /// Create from raw scalar bytes. Clamping is applied by the curve code.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(DalekStatic::from(bytes))
    }

    /// Perform X25519 key agreement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyAgreementFailure`] when the peer key is a
    /// low-order point and the shared secret degenerates to zero.
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> Result<SharedSecret> {
        SharedSecret::checked(self.0.diffie_hellman(&their_public.0))
    }

    /// Export the secret key bytes.
    ///
    /// # Security
    ///
    /// Handle the returned bytes with care and zeroize when done.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl fmt::Debug for StaticSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticSecret(<redacted>)")
    }
}

impl From<&StaticSecret> for PublicKey {
    fn from(secret: &StaticSecret) -> Self {
        PublicKey(DalekPublic::from(&secret.0))
    }
}

/// An X25519 public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(DalekPublic);

impl PublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(DalekPublic::from(bytes))
    }

    /// Get the raw bytes of this public key.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        self.0.as_bytes()
    }

    /// Convert to raw bytes.
    pub fn to_bytes(self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0.to_bytes()
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// The output of a successful X25519 agreement.
///
/// Zeroized on drop by the underlying dalek type.
pub struct SharedSecret(DalekShared);

impl SharedSecret {
    fn checked(shared: DalekShared) -> Result<Self> {
        if !shared.was_contributory() {
            return Err(Error::KeyAgreementFailure(
                "peer public key is a low-order point".into(),
            ));
        }
        Ok(Self(shared))
    }

    /// Get the raw shared secret bytes.
    ///
    /// # Security
    ///
    /// Feed this into HKDF; never use it directly as a key.
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        self.0.as_bytes()
    }
}
