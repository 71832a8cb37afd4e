//! OS-backed randomness for keys, handshake randoms and filler.

use rand::{CryptoRng, RngCore};
use rand_core::OsRng;

/// Handle to the operating system's CSPRNG.
pub struct SecureRandom;

impl SecureRandom {
    /// Overwrite `dest` with random bytes.
    pub fn fill(dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }

    /// A fresh `N`-byte array, e.g. a 32-byte handshake random.
    pub fn bytes<const N: usize>() -> [u8; N] {
        let mut out = [0u8; N];
        Self::fill(&mut out);
        out
    }

    /// RNG for callers that sample ranges (profile padding lengths).
    pub fn rng() -> impl RngCore + CryptoRng {
        OsRng
    }
}

/// Uniform random filler; the default when no profile shapes the bytes.
pub fn random_padding(len: usize) -> Vec<u8> {
    let mut filler = vec![0u8; len];
    SecureRandom::fill(&mut filler);
    filler
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_randoms_differ() {
        let first = SecureRandom::bytes::<32>();
        let second = SecureRandom::bytes::<32>();

        assert_ne!(first, [0u8; 32]);
        assert_ne!(first, second);
    }

    #[test]
    fn test_filler_lengths() {
        assert!(random_padding(0).is_empty());

        let filler = random_padding(1395);
        assert_eq!(filler.len(), 1395);
        assert!(filler.iter().any(|&b| b != 0));
    }
}
