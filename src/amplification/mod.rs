//! Secrecy amplification.
//!
//! A pluggable source of supplementary key material. Whatever a provider
//! returns is XOR-mixed into the handshake's master secret and never
//! replaces it: the X25519 + HKDF schedule alone carries the session's
//! security, so a broken or hostile provider can at worst make the two
//! peers disagree on keys.
//!
//! The optional symmetric layer is an extra ChaCha20-Poly1305 pass under a
//! key expanded from the (mixed) master secret.

mod preshared;

pub use preshared::PresharedKeyAmplifier;

use std::fmt;

use serde::Serialize;
use zeroize::Zeroizing;

use crate::crypto::{Aead, AeadKey, Nonce};
use crate::error::Result;

/// Size of the public material each side puts in its handshake.
pub const AMPLIFICATION_MATERIAL_SIZE: usize = 32;

/// Quality figures reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AmplificationQuality {
    /// Estimated entropy of the derived material, 0.0 to 1.0
    pub entropy_estimate: f64,
    /// Fraction of the exchange the peers failed to agree on, 0.0 to 1.0
    pub agreement_error_rate: f64,
}

impl AmplificationQuality {
    /// Full entropy, no disagreement.
    pub const PERFECT: Self = Self {
        entropy_estimate: 1.0,
        agreement_error_rate: 0.0,
    };
}

impl Default for AmplificationQuality {
    fn default() -> Self {
        Self::PERFECT
    }
}

/// Material derived for one handshake.
pub struct Amplified {
    /// Bytes to XOR into the master secret
    pub material: Zeroizing<Vec<u8>>,
    /// Quality of this particular exchange
    pub quality: AmplificationQuality,
}

/// Source of supplementary key material.
pub trait AmplificationProvider: Send + Sync + fmt::Debug {
    /// Produce `len` bytes of public material for the local handshake message.
    fn generate_material(&self, len: usize) -> Vec<u8>;

    /// Derive `len` mixing bytes from both peers' public material.
    ///
    /// Arguments are ordered by handshake role so that both peers compute
    /// the same output.
    fn derive_material(
        &self,
        initiator_material: &[u8],
        responder_material: &[u8],
        len: usize,
    ) -> Result<Amplified>;

    /// Aggregate quality across the exchanges seen so far.
    fn report_quality(&self) -> AmplificationQuality;
}

/// Provider that contributes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAmplifier;

impl AmplificationProvider for NoopAmplifier {
    fn generate_material(&self, len: usize) -> Vec<u8> {
        vec![0u8; len]
    }

    fn derive_material(&self, _: &[u8], _: &[u8], len: usize) -> Result<Amplified> {
        Ok(Amplified {
            material: Zeroizing::new(vec![0u8; len]),
            quality: AmplificationQuality::PERFECT,
        })
    }

    fn report_quality(&self) -> AmplificationQuality {
        AmplificationQuality::PERFECT
    }
}

/// Extra AEAD pass applied inside the data-path AEAD.
pub struct SymmetricLayer {
    aead: Aead,
}

impl SymmetricLayer {
    const AAD: &'static [u8] = b"amplification-layer";

    /// Create the layer from its key.
    pub fn new(key: &AeadKey) -> Self {
        Self { aead: Aead::new(key) }
    }

    /// Seal `data` under the packet's nonce.
    pub fn seal(&self, nonce: &Nonce, data: &[u8]) -> Result<Vec<u8>> {
        self.aead.encrypt(nonce, data, Self::AAD)
    }

    /// Open data sealed by the peer's layer.
    pub fn open(&self, nonce: &Nonce, data: &[u8]) -> Result<Vec<u8>> {
        self.aead.decrypt(nonce, data, Self::AAD)
    }
}

/// Binary entropy of the bit balance in `bytes`, in `[0, 1]`.
pub fn bit_entropy(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }
    let ones: u32 = bytes.iter().map(|b| b.count_ones()).sum();
    let p = ones as f64 / (bytes.len() * 8) as f64;
    if p <= 0.0 || p >= 1.0 {
        return 0.0;
    }
    -(p * p.log2() + (1.0 - p) * (1.0 - p).log2())
}
