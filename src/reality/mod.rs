//! REALITY mimicry layer.
//!
//! Everything the engine emits leaves inside TLS handshake records whose
//! opening bytes resemble the ClientHello of a real host:
//!
//! ```text
//! [0x16][0x03 0x03][len:u16][marker][TLV bytes][filler]
//! ```
//!
//! The record layer is camouflage only. Confidentiality and integrity come
//! from the data-path AEAD in [`crate::crypto`].
//!
//! A complete decoy ClientHello can be built with [`ClientHelloBuilder`]
//! for use as the first record on a fresh connection.

mod client_hello;
mod config;
mod wrapper;

pub use client_hello::ClientHelloBuilder;
pub use config::RealityConfig;
pub use wrapper::{marker_for, RealityWrapper};

/// Version carried in every wrapped record header (TLS 1.2 on the wire)
pub const RECORD_VERSION: u16 = 0x0303;

/// Size of a TLS record header
pub const RECORD_HEADER_LEN: usize = 5;

/// Largest payload of a single TLS record
pub const MAX_RECORD_PAYLOAD: usize = 16_384;

/// Record size short records are padded up to
pub const PADDED_RECORD_SIZE: usize = 1400;

/// Width of the short id field in handshake payloads
pub const SHORT_ID_SIZE: usize = 8;

/// Record content type of every emitted record (handshake)
pub const CONTENT_TYPE_HANDSHAKE: u8 = 22;

/// Handshake message type of the decoy ClientHello
pub const HANDSHAKE_CLIENT_HELLO: u8 = 1;

/// TLS extension types used by the decoy ClientHello.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ExtensionType {
    /// server_name (SNI)
    ServerName = 0,
    /// supported_groups
    SupportedGroups = 10,
    /// signature_algorithms
    SignatureAlgorithms = 13,
    /// application_layer_protocol_negotiation
    ApplicationLayerProtocolNegotiation = 16,
    /// supported_versions
    SupportedVersions = 43,
    /// key_share
    KeyShare = 51,
}
