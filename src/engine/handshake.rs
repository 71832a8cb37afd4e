//! Handshake payloads.
//!
//! ```text
//! init:     client_random(32) || public_key(32) || short_id(8) [|| material(32)]
//! response: server_random(32) || public_key(32)                [|| material(32)]
//! ```

use bytes::{Buf, BufMut};

use crate::amplification::AMPLIFICATION_MATERIAL_SIZE;
use crate::crypto::{PublicKey, PUBLIC_KEY_SIZE};
use crate::error::{Error, Result};
use crate::reality::SHORT_ID_SIZE;

const RANDOM_SIZE: usize = 32;

/// Initiator's handshake payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeInit {
    /// Fresh initiator random
    pub client_random: [u8; RANDOM_SIZE],
    /// Initiator's static public key
    pub public_key: PublicKey,
    /// Zero-padded short id
    pub short_id: [u8; SHORT_ID_SIZE],
    /// Secrecy-amplification material, when enabled
    pub material: Option<[u8; AMPLIFICATION_MATERIAL_SIZE]>,
}

impl HandshakeInit {
    /// Payload size without amplification material.
    pub const BASE_LEN: usize = RANDOM_SIZE + PUBLIC_KEY_SIZE + SHORT_ID_SIZE;

    /// Serialize.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::BASE_LEN + AMPLIFICATION_MATERIAL_SIZE);
        buf.put_slice(&self.client_random);
        buf.put_slice(self.public_key.as_bytes());
        buf.put_slice(&self.short_id);
        if let Some(material) = &self.material {
            buf.put_slice(material);
        }
        buf
    }

    /// Parse, accepting exactly the two legal sizes.
    pub fn parse(mut value: &[u8]) -> Result<Self> {
        let with_material = check_len("init", value.len(), Self::BASE_LEN)?;

        let client_random = take_array(&mut value);
        let public_key = PublicKey::from_bytes(take_array(&mut value));
        let short_id = take_array(&mut value);
        let material = with_material.then(|| take_array(&mut value));

        Ok(Self {
            client_random,
            public_key,
            short_id,
            material,
        })
    }
}

/// Responder's handshake payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Fresh responder random
    pub server_random: [u8; RANDOM_SIZE],
    /// Responder's static public key
    pub public_key: PublicKey,
    /// Secrecy-amplification material, when both sides enabled it
    pub material: Option<[u8; AMPLIFICATION_MATERIAL_SIZE]>,
}

impl HandshakeResponse {
    /// Payload size without amplification material.
    pub const BASE_LEN: usize = RANDOM_SIZE + PUBLIC_KEY_SIZE;

    /// Serialize.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::BASE_LEN + AMPLIFICATION_MATERIAL_SIZE);
        buf.put_slice(&self.server_random);
        buf.put_slice(self.public_key.as_bytes());
        if let Some(material) = &self.material {
            buf.put_slice(material);
        }
        buf
    }

    /// Parse, accepting exactly the two legal sizes.
    pub fn parse(mut value: &[u8]) -> Result<Self> {
        let with_material = check_len("response", value.len(), Self::BASE_LEN)?;

        let server_random = take_array(&mut value);
        let public_key = PublicKey::from_bytes(take_array(&mut value));
        let material = with_material.then(|| take_array(&mut value));

        Ok(Self {
            server_random,
            public_key,
            material,
        })
    }
}

/// Returns whether amplification material is present.
fn check_len(kind: &str, len: usize, base: usize) -> Result<bool> {
    if len == base {
        Ok(false)
    } else if len == base + AMPLIFICATION_MATERIAL_SIZE {
        Ok(true)
    } else {
        Err(Error::malformed(format!(
            "handshake {} of {} bytes (expected {} or {})",
            kind,
            len,
            base,
            base + AMPLIFICATION_MATERIAL_SIZE
        )))
    }
}

// Callers check the length first.
fn take_array<const N: usize>(buf: &mut &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    out
}
