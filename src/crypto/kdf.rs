//! Key derivation.
//!
//! HKDF-SHA256 plus the session key schedule built on top of it.

use hkdf::Hkdf as HkdfImpl;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{AeadKey, SharedSecret, KEY_SIZE, MASTER_SECRET_SIZE, PRK_SIZE};
use crate::error::{Error, Result};

const MASTER_LABEL: &[u8] = b"protocol-master";
const TLV_ORDER_LABEL: &[u8] = b"tlv-order";
const LAYER_LABEL: &[u8] = b"secrecy-amplification-layer";

/// A pseudorandom key produced by HKDF-Extract.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Prk([u8; PRK_SIZE]);

impl Prk {
    /// Get the raw PRK bytes.
    pub fn as_bytes(&self) -> &[u8; PRK_SIZE] {
        &self.0
    }
}

/// HKDF-Extract(salt, ikm).
pub fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> Prk {
    let (prk, _) = HkdfImpl::<Sha256>::extract(Some(salt), ikm);
    let mut out = [0u8; PRK_SIZE];
    out.copy_from_slice(&prk);
    Prk(out)
}

/// HKDF-Expand(prk, info, len).
///
/// `prk` may be any pseudorandom key of at least 32 bytes, which lets the
/// 48-byte master secret act as a PRK for per-session expansions.
pub fn hkdf_expand(prk: &[u8], info: &[u8], len: usize) -> Result<Zeroizing<Vec<u8>>> {
    Hkdf::from_prk(prk)?.expand(info, len)
}

/// HKDF key derivation using SHA-256.
pub struct Hkdf {
    prk: HkdfImpl<Sha256>,
}

impl Hkdf {
    /// Run HKDF-Extract and keep the resulting PRK for expansion.
    ///
    /// # Arguments
    ///
    /// * `salt` - Optional salt
    /// * `ikm` - Input keying material (e.g. the X25519 shared secret)
    pub fn new(salt: Option<&[u8]>, ikm: &[u8]) -> Self {
        Self {
            prk: HkdfImpl::new(salt, ikm),
        }
    }

    /// Use an existing pseudorandom key directly.
    pub fn from_prk(prk: &[u8]) -> Result<Self> {
        let prk = HkdfImpl::from_prk(prk).map_err(|_| Error::crypto("PRK too short"))?;
        Ok(Self { prk })
    }

    /// Expand the PRK to `len` bytes of output keying material.
    pub fn expand(&self, info: &[u8], len: usize) -> Result<Zeroizing<Vec<u8>>> {
        let mut okm = Zeroizing::new(vec![0u8; len]);
        self.prk
            .expand(info, &mut okm)
            .map_err(|_| Error::crypto("HKDF expansion length out of range"))?;
        Ok(okm)
    }

    /// Expand to a fixed-size array.
    pub fn expand_fixed<const N: usize>(&self, info: &[u8]) -> Result<[u8; N]> {
        let mut okm = [0u8; N];
        self.prk
            .expand(info, &mut okm)
            .map_err(|_| Error::crypto("HKDF expansion length out of range"))?;
        Ok(okm)
    }

    /// Derive an AEAD key.
    pub fn derive_aead_key(&self, info: &[u8]) -> Result<AeadKey> {
        let mut key_bytes = self.expand_fixed::<KEY_SIZE>(info)?;
        let key = AeadKey::from_bytes(key_bytes);
        key_bytes.zeroize();
        Ok(key)
    }
}

/// The 48-byte secret every session key is expanded from.
///
/// Zeroized on drop; replacing it during a rekey scrubs the old value.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret([u8; MASTER_SECRET_SIZE]);

impl MasterSecret {
    /// `HKDF-Expand(HKDF-Extract(client_random || server_random, shared), "protocol-master", 48)`.
    pub fn derive(
        shared: &SharedSecret,
        client_random: &[u8; 32],
        server_random: &[u8; 32],
    ) -> Result<Self> {
        let mut salt = Zeroizing::new([0u8; 64]);
        salt[..32].copy_from_slice(client_random);
        salt[32..].copy_from_slice(server_random);

        let prk = hkdf_extract(&salt[..], shared.as_bytes());
        let okm = Hkdf::from_prk(prk.as_bytes())?.expand_fixed::<MASTER_SECRET_SIZE>(MASTER_LABEL)?;
        Ok(Self(okm))
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; MASTER_SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// XOR supplementary key material into the secret.
    ///
    /// Only the first `MASTER_SECRET_SIZE` bytes of `extra` are used.
    pub fn mix(&mut self, extra: &[u8]) {
        xor_in_place(&mut self.0, extra);
    }

    /// Per-session data key: `HKDF-Expand(master, len(id) || id, 32)`.
    pub fn data_key(&self, session_id: &str) -> Result<AeadKey> {
        let id = session_id.as_bytes();
        let id_len = u8::try_from(id.len())
            .map_err(|_| Error::invalid_state("session id longer than 255 bytes"))?;

        let mut info = Vec::with_capacity(1 + id.len());
        info.push(id_len);
        info.extend_from_slice(id);
        Hkdf::from_prk(&self.0)?.derive_aead_key(&info)
    }

    /// Key for the secrecy-amplification symmetric layer.
    pub fn layer_key(&self) -> Result<AeadKey> {
        Hkdf::from_prk(&self.0)?.derive_aead_key(LAYER_LABEL)
    }

    /// Selector byte both peers use to pin the session's TLV field order.
    pub fn tlv_order_seed(&self) -> Result<u8> {
        let [seed] = Hkdf::from_prk(&self.0)?.expand_fixed::<1>(TLV_ORDER_LABEL)?;
        Ok(seed)
    }

    #[cfg(test)]
    pub(crate) fn as_bytes(&self) -> &[u8; MASTER_SECRET_SIZE] {
        &self.0
    }
}

/// XOR `src` into `dst` over their common length.
pub fn xor_in_place(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= *s;
    }
}

/// Constant-time equality for secrets and identifiers.
///
/// Slices of different lengths compare unequal; the length itself is not
/// treated as secret.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
