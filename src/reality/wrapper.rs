//! TLS record camouflage.
//!
//! Wraps inner protocol bytes in handshake records whose first bytes match
//! what the mimicked host's TLS stack sends. This only changes how the bytes
//! look on the wire; confidentiality comes from the data-path AEAD.

use bytes::{BufMut, BytesMut};

use crate::crypto::random_padding;
use crate::error::{Error, Result};
use crate::reality::{
    CONTENT_TYPE_HANDSHAKE, MAX_RECORD_PAYLOAD, PADDED_RECORD_SIZE, RECORD_HEADER_LEN,
    RECORD_VERSION,
};

/// Opening bytes per mimicked host.
const MARKERS: &[(&str, &[u8])] = &[
    ("www.microsoft.com", &[0x01, 0x00]),
    ("www.cloudflare.com", &[0x01, 0x00, 0x00, 0xcf]),
    ("www.apple.com", &[0x01, 0x00, 0x01, 0xfc]),
];

/// Marker for `server_name`, empty for hosts without a known fingerprint.
pub fn marker_for(server_name: &str) -> &'static [u8] {
    MARKERS
        .iter()
        .find(|(host, _)| host.eq_ignore_ascii_case(server_name))
        .map(|(_, marker)| *marker)
        .unwrap_or(&[])
}

/// Record-layer wrapper for one mimicked host.
#[derive(Debug, Clone)]
pub struct RealityWrapper {
    marker: &'static [u8],
    enable_padding: bool,
}

impl RealityWrapper {
    /// Create a wrapper for `server_name`.
    pub fn new(server_name: &str, enable_padding: bool) -> Self {
        Self {
            marker: marker_for(server_name),
            enable_padding,
        }
    }

    /// The marker this wrapper prepends.
    pub fn marker(&self) -> &'static [u8] {
        self.marker
    }

    /// Same host, record padding off. Used for packets the shaper already sized.
    pub fn without_padding(&self) -> Self {
        Self {
            marker: self.marker,
            enable_padding: false,
        }
    }

    /// Wrap with random filler.
    pub fn wrap(&self, inner: &[u8]) -> Vec<u8> {
        self.wrap_with_filler(inner, random_padding)
    }

    /// Wrap `inner`, asking `filler` for padding bytes when padding is enabled.
    ///
    /// Payloads above the record limit span several records; only the first
    /// carries the marker. Padding is added only to single-record output
    /// shorter than [`PADDED_RECORD_SIZE`].
    pub fn wrap_with_filler<F>(&self, inner: &[u8], filler: F) -> Vec<u8>
    where
        F: FnOnce(usize) -> Vec<u8>,
    {
        let mut payload = Vec::with_capacity(self.marker.len() + inner.len());
        payload.extend_from_slice(self.marker);
        payload.extend_from_slice(inner);

        if self.enable_padding {
            let total = RECORD_HEADER_LEN + payload.len();
            if total < PADDED_RECORD_SIZE {
                payload.extend_from_slice(&filler(PADDED_RECORD_SIZE - total));
            }
        }

        let records = payload.len().div_ceil(MAX_RECORD_PAYLOAD).max(1);
        let mut out = BytesMut::with_capacity(payload.len() + records * RECORD_HEADER_LEN);

        if payload.is_empty() {
            put_header(&mut out, 0);
        }
        for chunk in payload.chunks(MAX_RECORD_PAYLOAD) {
            put_header(&mut out, chunk.len());
            out.put_slice(chunk);
        }

        out.to_vec()
    }

    /// Strip record headers and the marker, reassembling split payloads.
    pub fn unwrap(&self, outer: &[u8]) -> Result<Vec<u8>> {
        if outer.len() < RECORD_HEADER_LEN + self.marker.len() {
            return Err(Error::malformed(format!(
                "{} bytes is too short for a wrapped record",
                outer.len()
            )));
        }

        let mut payload = Vec::with_capacity(outer.len());
        let mut rest = outer;
        while !rest.is_empty() {
            if rest.len() < RECORD_HEADER_LEN {
                return Err(Error::malformed("truncated record header"));
            }
            if rest[0] != CONTENT_TYPE_HANDSHAKE {
                return Err(Error::malformed(format!(
                    "unexpected record type 0x{:02x}",
                    rest[0]
                )));
            }
            if u16::from_be_bytes([rest[1], rest[2]]) != RECORD_VERSION {
                return Err(Error::malformed("unexpected record version"));
            }

            let len = u16::from_be_bytes([rest[3], rest[4]]) as usize;
            if len > MAX_RECORD_PAYLOAD {
                return Err(Error::malformed(format!("record of {} bytes exceeds the limit", len)));
            }
            if rest.len() < RECORD_HEADER_LEN + len {
                return Err(Error::malformed(format!(
                    "record declares {} bytes but {} remain",
                    len,
                    rest.len() - RECORD_HEADER_LEN
                )));
            }

            payload.extend_from_slice(&rest[RECORD_HEADER_LEN..RECORD_HEADER_LEN + len]);
            rest = &rest[RECORD_HEADER_LEN + len..];
        }

        if !payload.starts_with(self.marker) {
            return Err(Error::malformed("mimicry marker mismatch"));
        }
        payload.drain(..self.marker.len());
        Ok(payload)
    }
}

fn put_header(out: &mut BytesMut, len: usize) {
    out.put_u8(CONTENT_TYPE_HANDSHAKE);
    out.put_u16(RECORD_VERSION);
    out.put_u16(len as u16);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_microsoft_marker_layout() {
        let wrapper = RealityWrapper::new("www.microsoft.com", false);
        let outer = wrapper.wrap(b"inner");

        assert_eq!(
            outer,
            vec![0x16, 0x03, 0x03, 0x00, 0x07, 0x01, 0x00, b'i', b'n', b'n', b'e', b'r']
        );
        assert_eq!(wrapper.unwrap(&outer).unwrap(), b"inner");
    }

    #[test]
    fn test_markers() {
        assert_eq!(marker_for("www.cloudflare.com"), &[0x01, 0x00, 0x00, 0xcf]);
        assert_eq!(marker_for("WWW.Microsoft.com"), &[0x01, 0x00]);
        assert!(marker_for("example.com").is_empty());
    }

    #[test]
    fn test_padding_reaches_target_size() {
        let wrapper = RealityWrapper::new("www.cloudflare.com", true);
        let outer = wrapper.wrap_with_filler(&[0xabu8; 100], |n| vec![b' '; n]);

        assert_eq!(outer.len(), PADDED_RECORD_SIZE);
        let declared = u16::from_be_bytes([outer[3], outer[4]]) as usize;
        assert_eq!(declared, PADDED_RECORD_SIZE - RECORD_HEADER_LEN);

        let inner = wrapper.unwrap(&outer).unwrap();
        assert_eq!(&inner[..100], &[0xabu8; 100]);
        assert!(inner[100..].iter().all(|&b| b == b' '));
    }

    #[test]
    fn test_large_payload_spans_records() {
        let wrapper = RealityWrapper::new("www.microsoft.com", true);
        let inner: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
        let outer = wrapper.wrap(&inner);

        // 2 marker bytes + 40 000 payload bytes over 16 KiB records.
        assert_eq!(outer.len(), 40_002 + 3 * RECORD_HEADER_LEN);
        assert_eq!(wrapper.unwrap(&outer).unwrap(), inner);
    }

    #[test]
    fn test_unwrap_rejects_bad_records() {
        let wrapper = RealityWrapper::new("www.microsoft.com", false);
        let outer = wrapper.wrap(b"payload");

        assert!(wrapper.unwrap(&outer[..4]).is_err());
        assert!(wrapper.unwrap(&outer[..outer.len() - 1]).is_err());

        let mut wrong_type = outer.clone();
        wrong_type[0] = 0x17;
        assert!(wrapper.unwrap(&wrong_type).is_err());

        let other = RealityWrapper::new("www.cloudflare.com", false);
        assert!(other.unwrap(&outer).is_err());
    }

    #[test]
    fn test_empty_inner_without_marker() {
        let wrapper = RealityWrapper::new("example.com", false);
        let outer = wrapper.wrap(&[]);
        assert_eq!(outer, vec![0x16, 0x03, 0x03, 0x00, 0x00]);
        assert!(wrapper.unwrap(&outer).unwrap().is_empty());
    }
}
