//! Error types for the XTLS-Reality engine.

use thiserror::Error;

use crate::codec::PacketType;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the protocol.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation not permitted in the session's current phase
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Truncated buffer, inconsistent length field or unknown packet type
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// AEAD tag or handshake identity check failed
    #[error("authentication failed")]
    AuthenticationFailure,

    /// ECDH produced a degenerate shared point
    #[error("key agreement failed: {0}")]
    KeyAgreementFailure(String),

    /// No session with this identifier
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// Decoded packet has the wrong type for the operation
    #[error("unexpected packet type: expected {expected:?}, got {actual:?}")]
    InvalidPacketType {
        /// Type the operation accepts
        expected: PacketType,
        /// Type found on the wire
        actual: PacketType,
    },

    /// Session keys are exhausted; a fresh handshake must run first
    #[error("session must be rekeyed before sending more data")]
    RekeyRequired,

    /// Packet nonce was not above the last authenticated one
    #[error("replayed or reordered packet (nonce {0})")]
    Replay(u64),

    /// Lower-level cryptographic failure
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new invalid-state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Create a new malformed-packet error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedPacket(msg.into())
    }

    /// Create a new cryptographic error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Error::Crypto(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check if the session survives this error (caller may drop the packet and carry on)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::RekeyRequired | Error::Replay(_))
    }

    /// Check if this error indicates an authentication or key agreement failure
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationFailure | Error::KeyAgreementFailure(_)
        )
    }
}
