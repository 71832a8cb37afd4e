//! Vision fast path and data frame flags.
//!
//! Every data plaintext starts with one flags byte. Large redundant
//! payloads set [`FrameFlags::VISION`] and skip the shaper; payloads that
//! went through the amplification layer set [`FrameFlags::AMPLIFIED`].

use crate::error::{Error, Result};

/// Payloads must exceed this many bytes to take the fast path.
pub const VISION_THRESHOLD: usize = 1024;

/// Flags byte at the start of every data frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// No flags set
    pub const NONE: Self = Self(0);
    /// Shaping skipped for this payload
    pub const VISION: Self = Self(0x01);
    /// Body sealed by the amplification layer
    pub const AMPLIFIED: Self = Self(0x02);

    const KNOWN: u8 = Self::VISION.0 | Self::AMPLIFIED.0;

    /// Parse a flags byte, rejecting unknown bits.
    pub fn from_byte(byte: u8) -> Result<Self> {
        if byte & !Self::KNOWN != 0 {
            return Err(Error::malformed(format!("unknown frame flags 0x{:02x}", byte)));
        }
        Ok(Self(byte))
    }

    /// Raw byte.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// True when every bit of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

/// True for payloads above the threshold with more than 25% zero bytes.
///
/// Zero density is a cheap stand-in for compressibility.
pub fn can_use_fast_path(data: &[u8]) -> bool {
    if data.len() <= VISION_THRESHOLD {
        return false;
    }
    let zeros = data.iter().filter(|&&b| b == 0).count();
    zeros * 4 > data.len()
}

/// Frame `data` for the fast path.
pub fn apply_fast_path(data: &[u8]) -> Vec<u8> {
    encode_frame(FrameFlags::VISION, data)
}

/// Prefix `body` with `flags`.
pub fn encode_frame(flags: FrameFlags, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + body.len());
    frame.push(flags.bits());
    frame.extend_from_slice(body);
    frame
}

/// Split a decrypted frame into its flags and body.
pub fn decode_frame(frame: &[u8]) -> Result<(FrameFlags, &[u8])> {
    let (&first, body) = frame
        .split_first()
        .ok_or_else(|| Error::malformed("empty data frame"))?;
    Ok((FrameFlags::from_byte(first)?, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_path_eligibility() {
        assert!(!can_use_fast_path(&[0u8; 1024]));
        assert!(can_use_fast_path(&[0u8; 1025]));

        let mut sparse = vec![0xffu8; 2000];
        sparse[..400].fill(0);
        assert!(!can_use_fast_path(&sparse));
        sparse[..600].fill(0);
        assert!(can_use_fast_path(&sparse));
    }

    #[test]
    fn test_fast_path_marker() {
        let data = vec![0u8; 2048];
        let framed = apply_fast_path(&data);
        assert_eq!(framed[0], 0x01);

        let (flags, body) = decode_frame(&framed).unwrap();
        assert!(flags.contains(FrameFlags::VISION));
        assert!(!flags.contains(FrameFlags::AMPLIFIED));
        assert_eq!(body, &data[..]);
    }

    #[test]
    fn test_frame_flags() {
        let mut flags = FrameFlags::NONE;
        flags.insert(FrameFlags::AMPLIFIED);
        flags.insert(FrameFlags::VISION);
        assert_eq!(flags.bits(), 0x03);

        assert!(FrameFlags::from_byte(0x04).is_err());
        assert!(decode_frame(&[]).is_err());
        assert_eq!(decode_frame(&[0x00]).unwrap(), (FrameFlags::NONE, &[][..]));
    }
}
