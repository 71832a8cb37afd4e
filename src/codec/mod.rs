//! Binary packet codec.

mod packet;
mod tlv;

pub use packet::{PacketType, XtlsPacket};
pub use tlv::{decode, decode_with_order, encode, encode_with_filler, encode_with_order, TlvOrder};

/// Fixed bytes around the value: type(1) + length(4) + nonce(8)
pub const TLV_OVERHEAD: usize = 13;

/// Shortest decodable packet (empty value)
pub const TLV_MIN_LEN: usize = TLV_OVERHEAD;
