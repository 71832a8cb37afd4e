//! # XTLS-Reality
//!
//! A sans-IO tunnel engine that hides an authenticated, encrypted byte
//! stream inside traffic shaped like TLS to a well-known host.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Caller (owns sockets)                   │
//! ├─────────────────────────────────────────────────────────┤
//! │  Protocol Engine (sessions, handshake, rekey, metrics)  │
//! ├─────────────────────────────────────────────────────────┤
//! │  Obfuscation (traffic profiles, adaptive shaper, Vision)│
//! ├─────────────────────────────────────────────────────────┤
//! │  REALITY record wrapper + TLV packet codec              │
//! ├─────────────────────────────────────────────────────────┤
//! │  Crypto (X25519, ChaCha20-Poly1305, HKDF) + amplifier   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```
//! use xtls_reality::{ProtocolEngine, RealityConfig};
//!
//! let client = ProtocolEngine::new(RealityConfig::new("www.microsoft.com", [1u8; 32])).unwrap();
//! let server = ProtocolEngine::new(RealityConfig::new("www.microsoft.com", [2u8; 32])).unwrap();
//!
//! let init = client.create_handshake_init("s1").unwrap();
//! let response = server.process_handshake_init("s1", &init).unwrap();
//! client.process_handshake_response("s1", &response).unwrap();
//!
//! let wire = client.encrypt_data("s1", b"ping").unwrap();
//! assert_eq!(server.decrypt_data("s1", &wire).unwrap(), b"ping");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod amplification;
pub mod codec;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod obfuscation;
pub mod reality;

pub use amplification::{AmplificationProvider, AmplificationQuality, NoopAmplifier, PresharedKeyAmplifier};
pub use codec::{PacketType, TlvOrder, XtlsPacket};
pub use engine::{MetricsSnapshot, ProtocolEngine, RekeyPolicy, SessionPhase, SessionStats};
pub use error::{Error, Result};
pub use obfuscation::TrafficProfile;
pub use reality::RealityConfig;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports_cover_a_session() {
        let mut client_config = RealityConfig::generate("www.apple.com");
        let server_config = RealityConfig::generate("www.apple.com");
        client_config.short_id = server_config.short_id.clone();
        client_config.peer_public_key = Some(server_config.public_key().to_bytes());

        let client = ProtocolEngine::new(client_config).unwrap();
        let server = ProtocolEngine::new(server_config).unwrap();

        let init = client.create_handshake_init("s1").unwrap();
        let response = server.process_handshake_init("s1", &init).unwrap();
        client.process_handshake_response("s1", &response).unwrap();

        assert_eq!(client.session_phase("s1").unwrap(), SessionPhase::Established);
    }
}
