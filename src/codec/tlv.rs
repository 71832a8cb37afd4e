//! TLV wire codec.
//!
//! Canonical layout: `type(1) || length(4, BE) || value || nonce(8, BE) || padding`.
//! Six field permutations exist to avoid a constant byte-offset fingerprint.
//! The decoder cannot detect the permutation, so both peers pin one per
//! session. Length always precedes value so decoding stays single-pass.

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::{PacketType, XtlsPacket, TLV_MIN_LEN};
use crate::crypto::random_padding;
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Type,
    Length,
    Value,
    Nonce,
}

use Field::{Length as L, Nonce as N, Type as T, Value as V};

/// Field permutation of an encoded packet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TlvOrder {
    /// `T L V N`
    #[default]
    Canonical,
    /// `N T L V`
    NonceFirst,
    /// `L V T N`
    LengthFirst,
    /// `T N L V`
    TypeNonceFirst,
    /// `N L V T`
    NonceLengthFirst,
    /// `L V N T`
    LengthValueNonce,
}

impl TlvOrder {
    /// Number of permutations.
    pub const COUNT: u8 = 6;

    /// All permutations, indexed by id.
    pub const ALL: [TlvOrder; 6] = [
        TlvOrder::Canonical,
        TlvOrder::NonceFirst,
        TlvOrder::LengthFirst,
        TlvOrder::TypeNonceFirst,
        TlvOrder::NonceLengthFirst,
        TlvOrder::LengthValueNonce,
    ];

    /// Look up a permutation by its wire id.
    pub fn from_id(id: u8) -> Result<Self> {
        Self::ALL
            .get(id as usize)
            .copied()
            .ok_or_else(|| Error::malformed(format!("unknown TLV order {}", id)))
    }

    /// Map a key-derived seed byte onto a permutation.
    pub fn from_seed(seed: u8) -> Self {
        Self::ALL[(seed % Self::COUNT) as usize]
    }

    /// Wire id of this permutation.
    pub fn id(self) -> u8 {
        self as u8
    }

    fn fields(self) -> [Field; 4] {
        match self {
            TlvOrder::Canonical => [T, L, V, N],
            TlvOrder::NonceFirst => [N, T, L, V],
            TlvOrder::LengthFirst => [L, V, T, N],
            TlvOrder::TypeNonceFirst => [T, N, L, V],
            TlvOrder::NonceLengthFirst => [N, L, V, T],
            TlvOrder::LengthValueNonce => [L, V, N, T],
        }
    }
}

/// Encode in canonical order with random padding.
pub fn encode(packet: &XtlsPacket) -> Result<Vec<u8>> {
    encode_with_order(packet, TlvOrder::Canonical)
}

/// Encode with an explicit field permutation and random padding.
pub fn encode_with_order(packet: &XtlsPacket, order: TlvOrder) -> Result<Vec<u8>> {
    let padding = random_padding(packet.padding_length as usize);
    encode_with_filler(packet, order, &padding)
}

/// Encode with caller-supplied filler.
///
/// `filler` must be exactly `packet.padding_length` bytes.
pub fn encode_with_filler(packet: &XtlsPacket, order: TlvOrder, filler: &[u8]) -> Result<Vec<u8>> {
    let length = u32::try_from(packet.value.len())
        .map_err(|_| Error::malformed("value exceeds the 32-bit length field"))?;
    if filler.len() != packet.padding_length as usize {
        return Err(Error::malformed(format!(
            "filler of {} bytes for padding length {}",
            filler.len(),
            packet.padding_length
        )));
    }

    let mut buf = BytesMut::with_capacity(packet.encoded_len());
    for field in order.fields() {
        match field {
            Field::Type => buf.put_u8(packet.packet_type as u8),
            Field::Length => buf.put_u32(length),
            Field::Value => buf.put_slice(&packet.value),
            Field::Nonce => buf.put_u64(packet.nonce),
        }
    }
    buf.put_slice(filler);

    Ok(buf.to_vec())
}

/// Decode a canonical-order packet.
pub fn decode(data: &[u8]) -> Result<XtlsPacket> {
    decode_with_order(data, TlvOrder::Canonical)
}

/// Decode a packet written with `order`.
///
/// Bytes following the last field are counted as padding.
pub fn decode_with_order(data: &[u8], order: TlvOrder) -> Result<XtlsPacket> {
    if data.len() < TLV_MIN_LEN {
        return Err(Error::malformed(format!(
            "{} bytes is below the {}-byte minimum",
            data.len(),
            TLV_MIN_LEN
        )));
    }

    let mut buf = data;
    let mut packet_type = None;
    let mut length = 0usize;
    let mut value = Vec::new();
    let mut nonce = 0u64;

    for field in order.fields() {
        match field {
            Field::Type => {
                ensure_remaining(buf, 1, "type")?;
                packet_type = Some(PacketType::try_from(buf.get_u8())?);
            }
            Field::Length => {
                ensure_remaining(buf, 4, "length")?;
                length = buf.get_u32() as usize;
            }
            Field::Value => {
                if length > buf.remaining() {
                    return Err(Error::malformed(format!(
                        "declared length {} exceeds the {} bytes available",
                        length,
                        buf.remaining()
                    )));
                }
                value = buf[..length].to_vec();
                buf.advance(length);
            }
            Field::Nonce => {
                ensure_remaining(buf, 8, "nonce")?;
                nonce = buf.get_u64();
            }
        }
    }

    let padding_length = u16::try_from(buf.remaining())
        .map_err(|_| Error::malformed("trailing bytes exceed the padding limit"))?;
    let packet_type = packet_type.ok_or_else(|| Error::malformed("missing type field"))?;

    Ok(XtlsPacket {
        packet_type,
        value,
        nonce,
        padding_length,
        tlv_order: order,
    })
}

fn ensure_remaining(buf: &[u8], needed: usize, field: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(Error::malformed(format!("truncated {} field", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> XtlsPacket {
        XtlsPacket::new(PacketType::Data, b"hello tlv".to_vec(), 0x0102_0304_0506_0708)
    }

    #[test]
    fn test_canonical_layout() {
        let bytes = encode(&sample()).unwrap();

        assert_eq!(bytes[0], 0x03);
        assert_eq!(&bytes[1..5], &[0, 0, 0, 9]);
        assert_eq!(&bytes[5..14], b"hello tlv");
        assert_eq!(&bytes[14..22], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(bytes.len(), 22);

        assert_eq!(decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_all_orders_roundtrip() {
        for order in TlvOrder::ALL {
            let mut packet = sample();
            packet.padding_length = 17;
            packet.tlv_order = order;

            let bytes = encode_with_order(&packet, order).unwrap();
            assert_eq!(bytes.len(), packet.encoded_len());
            assert_eq!(decode_with_order(&bytes, order).unwrap(), packet);
        }
    }

    #[test]
    fn test_orders_differ_on_the_wire() {
        let packet = sample();
        let encodings: std::collections::HashSet<Vec<u8>> = TlvOrder::ALL
            .iter()
            .map(|&order| encode_with_order(&packet, order).unwrap())
            .collect();
        assert_eq!(encodings.len(), TlvOrder::ALL.len());
    }

    #[test]
    fn test_empty_value() {
        let packet = XtlsPacket::new(PacketType::Control, Vec::new(), 0);
        let bytes = encode(&packet).unwrap();
        assert_eq!(bytes.len(), TLV_MIN_LEN);
        assert_eq!(decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_rejects_short_input() {
        for len in 0..TLV_MIN_LEN {
            let err = decode(&vec![0x03; len]).unwrap_err();
            assert!(matches!(err, Error::MalformedPacket(_)));
        }
    }

    #[test]
    fn test_rejects_length_beyond_buffer() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[1..5].copy_from_slice(&100u32.to_be_bytes());
        assert!(matches!(decode(&bytes), Err(Error::MalformedPacket(_))));

        // Value runs past the end, so the nonce is truncated.
        bytes[1..5].copy_from_slice(&12u32.to_be_bytes());
        assert!(matches!(decode(&bytes), Err(Error::MalformedPacket(_))));
    }

    #[test]
    fn test_rejects_unknown_type() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[0] = 0x42;
        assert!(matches!(decode(&bytes), Err(Error::MalformedPacket(_))));
    }

    #[test]
    fn test_filler_length_must_match() {
        let mut packet = sample();
        packet.padding_length = 4;
        assert!(encode_with_filler(&packet, TlvOrder::Canonical, b"abc").is_err());

        let bytes = encode_with_filler(&packet, TlvOrder::Canonical, b"abcd").unwrap();
        assert_eq!(&bytes[bytes.len() - 4..], b"abcd");
    }

    #[test]
    fn test_order_ids() {
        for (id, order) in TlvOrder::ALL.iter().enumerate() {
            assert_eq!(order.id(), id as u8);
            assert_eq!(TlvOrder::from_id(id as u8).unwrap(), *order);
        }
        assert!(TlvOrder::from_id(6).is_err());
        assert_eq!(TlvOrder::from_seed(13), TlvOrder::NonceFirst);
    }
}
