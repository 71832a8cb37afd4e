//! Pre-shared key amplifier.

use std::fmt;

use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::amplification::{bit_entropy, AmplificationProvider, AmplificationQuality, Amplified};
use crate::crypto::{Hkdf, SecureRandom};
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

const COMMITMENT_LEN: usize = 16;
const MIN_PSK_LEN: usize = 16;
const COMMIT_LABEL: &[u8] = b"xtls-amplification-commit";
const DERIVE_LABEL: &[u8] = b"xtls-amplification-derive";

#[derive(Default)]
struct QualityStats {
    exchanges: u64,
    entropy_sum: f64,
    error_sum: f64,
}

/// Amplifier backed by a secret shared out of band.
///
/// Each handshake message carries `nonce || HMAC(psk, nonce)[..16]`. When
/// both commitments verify, the mixing bytes are `HKDF(psk, transcript)`;
/// otherwise the exchange counts as a full disagreement and contributes
/// zero bytes, which keeps both peers' keys consistent.
pub struct PresharedKeyAmplifier {
    psk: Zeroizing<Vec<u8>>,
    mac: HmacSha256,
    stats: Mutex<QualityStats>,
}

impl PresharedKeyAmplifier {
    /// Create an amplifier from a pre-shared key of at least 16 bytes.
    pub fn new(psk: &[u8]) -> Result<Self> {
        if psk.len() < MIN_PSK_LEN {
            return Err(Error::config(format!(
                "pre-shared key must be at least {} bytes",
                MIN_PSK_LEN
            )));
        }
        let mut mac = <HmacSha256 as Mac>::new_from_slice(psk)
            .map_err(|_| Error::config("unusable pre-shared key"))?;
        mac.update(COMMIT_LABEL);

        Ok(Self {
            psk: Zeroizing::new(psk.to_vec()),
            mac,
            stats: Mutex::new(QualityStats::default()),
        })
    }

    fn commitment(&self, nonce: &[u8]) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(nonce);
        mac
    }

    fn verify(&self, material: &[u8]) -> bool {
        if material.len() <= COMMITMENT_LEN {
            return false;
        }
        let (nonce, tag) = material.split_at(material.len() - COMMITMENT_LEN);
        self.commitment(nonce).verify_truncated_left(tag).is_ok()
    }
}

impl fmt::Debug for PresharedKeyAmplifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresharedKeyAmplifier")
            .field("psk", &"<redacted>")
            .finish()
    }
}

impl AmplificationProvider for PresharedKeyAmplifier {
    fn generate_material(&self, len: usize) -> Vec<u8> {
        if len <= COMMITMENT_LEN {
            return crate::crypto::random_padding(len);
        }

        let mut material = vec![0u8; len];
        let (nonce, tag) = material.split_at_mut(len - COMMITMENT_LEN);
        SecureRandom::fill(nonce);
        let digest = self.commitment(nonce).finalize().into_bytes();
        tag.copy_from_slice(&digest[..COMMITMENT_LEN]);
        material
    }

    fn derive_material(
        &self,
        initiator_material: &[u8],
        responder_material: &[u8],
        len: usize,
    ) -> Result<Amplified> {
        let verified = [initiator_material, responder_material]
            .iter()
            .filter(|m| self.verify(m))
            .count();

        let (material, quality) = if verified == 2 {
            let salt = [initiator_material, responder_material].concat();
            let material = Hkdf::new(Some(salt.as_slice()), &self.psk).expand(DERIVE_LABEL, len)?;
            let quality = AmplificationQuality {
                entropy_estimate: bit_entropy(&material),
                agreement_error_rate: 0.0,
            };
            (material, quality)
        } else {
            let quality = AmplificationQuality {
                entropy_estimate: 0.0,
                agreement_error_rate: (2 - verified) as f64 / 2.0,
            };
            (Zeroizing::new(vec![0u8; len]), quality)
        };

        let mut stats = self.stats.lock();
        stats.exchanges += 1;
        stats.entropy_sum += quality.entropy_estimate;
        stats.error_sum += quality.agreement_error_rate;

        Ok(Amplified { material, quality })
    }

    fn report_quality(&self) -> AmplificationQuality {
        let stats = self.stats.lock();
        if stats.exchanges == 0 {
            return AmplificationQuality::PERFECT;
        }
        let n = stats.exchanges as f64;
        AmplificationQuality {
            entropy_estimate: stats.entropy_sum / n,
            agreement_error_rate: stats.error_sum / n,
        }
    }
}
