//! Packet model shared by the codec, shaper and engine.

use crate::codec::TlvOrder;
use crate::crypto::TAG_SIZE;
use crate::error::{Error, Result};

/// Packet type byte.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Initiator's handshake
    HandshakeInit = 0x01,
    /// Responder's handshake reply
    HandshakeResponse = 0x02,
    /// Encrypted application data
    Data = 0x03,
    /// Session control
    Control = 0x04,
    /// Key-material synchronisation
    Sync = 0x05,
    /// Path probe
    Probe = 0x06,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(PacketType::HandshakeInit),
            0x02 => Ok(PacketType::HandshakeResponse),
            0x03 => Ok(PacketType::Data),
            0x04 => Ok(PacketType::Control),
            0x05 => Ok(PacketType::Sync),
            0x06 => Ok(PacketType::Probe),
            other => Err(Error::malformed(format!("unknown packet type 0x{:02x}", other))),
        }
    }
}

/// One protocol packet.
///
/// The `length` field of the wire format is always derived from `value`,
/// so the two can never disagree in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XtlsPacket {
    /// Packet type
    pub packet_type: PacketType,
    /// Payload: plaintext for handshakes, `ciphertext || tag` for data
    pub value: Vec<u8>,
    /// Per-session packet counter, also the AEAD nonce counter
    pub nonce: u64,
    /// Shaping filler appended after the nonce; never authenticated
    pub padding_length: u16,
    /// Field permutation used on the wire
    pub tlv_order: TlvOrder,
}

impl XtlsPacket {
    /// Create an unpadded packet in canonical field order.
    pub fn new(packet_type: PacketType, value: Vec<u8>, nonce: u64) -> Self {
        Self {
            packet_type,
            value,
            nonce,
            padding_length: 0,
            tlv_order: TlvOrder::default(),
        }
    }

    /// Value length as carried in the length field.
    pub fn length(&self) -> usize {
        self.value.len()
    }

    /// Poly1305 tag of a data packet.
    pub fn mac(&self) -> Option<&[u8]> {
        if self.packet_type != PacketType::Data || self.value.len() < TAG_SIZE {
            return None;
        }
        Some(&self.value[self.value.len() - TAG_SIZE..])
    }

    /// Encoded size including padding.
    pub fn encoded_len(&self) -> usize {
        super::TLV_OVERHEAD + self.value.len() + self.padding_length as usize
    }
}
