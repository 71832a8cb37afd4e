//! Per-session state.
//!
//! A `SessionState` lives behind its own mutex inside the engine's table.
//! Every secret it holds is zeroized on drop, on rekey and on close.

use std::time::{Duration, Instant};

use serde::Serialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::amplification::{AmplificationQuality, AMPLIFICATION_MATERIAL_SIZE};
use crate::codec::TlvOrder;
use crate::crypto::{Aead, AeadKey, MasterSecret};
use crate::error::{Error, Result};
use crate::obfuscation::{HistorySummary, TrafficHistory};

/// How long a derived data key is reused before it is expanded again.
pub const DATA_KEY_TTL: Duration = Duration::from_secs(60);

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionPhase {
    /// Allocated, nothing sent
    Init,
    /// Initiator waiting for the response
    HandshakeSent,
    /// Responder between reading the init and answering it
    HandshakeReceived,
    /// Keys installed, data flows
    Established,
    /// Initiator of a rekey waiting for the response; old keys still decrypt
    Rekeying,
    /// Shutting down
    Closing,
    /// Keys scrubbed, awaiting the sweep
    Closed,
}

/// Which side sent the handshake init that produced the current keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    /// Sent the init
    Initiator,
    /// Answered the init
    Responder,
}

impl Role {
    const INITIATOR_SALT: [u8; 4] = [0, 0, 0, 1];
    const RESPONDER_SALT: [u8; 4] = [0, 0, 0, 2];

    /// Nonce salt for packets this side sends.
    pub fn send_salt(self) -> [u8; 4] {
        match self {
            Role::Initiator => Self::INITIATOR_SALT,
            Role::Responder => Self::RESPONDER_SALT,
        }
    }

    /// Nonce salt for packets the peer sends.
    pub fn recv_salt(self) -> [u8; 4] {
        match self {
            Role::Initiator => Self::RESPONDER_SALT,
            Role::Responder => Self::INITIATOR_SALT,
        }
    }
}

/// Thresholds after which the current keys must be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RekeyPolicy {
    /// Bytes transferred under one key
    pub max_bytes: u64,
    /// Packets exchanged under one key
    pub max_packets: u64,
    /// Age of the current keys
    pub max_key_age: Duration,
}

impl Default for RekeyPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 1 << 30,
            max_packets: 100_000,
            max_key_age: Duration::from_secs(60 * 60),
        }
    }
}

/// Externally visible session figures. Contains no key material.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Lifecycle phase
    pub phase: SessionPhase,
    /// Handshake role of the current keys
    pub role: Role,
    /// Payload bytes in both directions under the current keys
    pub bytes_transferred: u64,
    /// Packets in both directions under the current keys
    pub packets_exchanged: u64,
    /// Age of the current keys, if established
    pub key_age: Option<Duration>,
    /// Time since the last operation
    pub idle: Duration,
    /// Amplification quality of the last handshake
    pub quality: Option<AmplificationQuality>,
    /// Recent wire sizes
    pub traffic: HistorySummary,
}

/// Mutable state of one logical tunnel.
#[derive(ZeroizeOnDrop)]
pub struct SessionState {
    #[zeroize(skip)]
    pub(super) phase: SessionPhase,
    #[zeroize(skip)]
    pub(super) role: Role,

    master: Option<MasterSecret>,
    data_key: Option<AeadKey>,
    #[zeroize(skip)]
    data_key_at: Option<Instant>,
    layer_key: Option<AeadKey>,
    pub(super) client_random: [u8; 32],
    pub(super) server_random: [u8; 32],
    /// Amplification material sent in our pending init
    pub(super) pending_material: Option<[u8; AMPLIFICATION_MATERIAL_SIZE]>,

    #[zeroize(skip)]
    pub(super) tlv_order: TlvOrder,
    #[zeroize(skip)]
    pub(super) amplified: bool,
    #[zeroize(skip)]
    pub(super) bytes_transferred: u64,
    #[zeroize(skip)]
    pub(super) packets_exchanged: u64,
    #[zeroize(skip)]
    send_counter: u64,
    #[zeroize(skip)]
    peer_nonce: u64,
    #[zeroize(skip)]
    keyed_at: Option<Instant>,
    #[zeroize(skip)]
    last_activity: Instant,
    #[zeroize(skip)]
    pub(super) quality: Option<AmplificationQuality>,
    #[zeroize(skip)]
    pub(super) history: TrafficHistory,
    #[zeroize(skip)]
    pub(super) rekey_skip_logged: bool,
}

impl SessionState {
    /// Fresh session in [`SessionPhase::Init`].
    pub fn new(role: Role) -> Self {
        Self {
            phase: SessionPhase::Init,
            role,
            master: None,
            data_key: None,
            data_key_at: None,
            layer_key: None,
            client_random: [0u8; 32],
            server_random: [0u8; 32],
            pending_material: None,
            tlv_order: TlvOrder::Canonical,
            amplified: false,
            bytes_transferred: 0,
            packets_exchanged: 0,
            send_counter: 0,
            peer_nonce: 0,
            keyed_at: None,
            last_activity: Instant::now(),
            quality: None,
            history: TrafficHistory::default(),
            rekey_skip_logged: false,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Install a freshly negotiated master secret.
    ///
    /// Replaces and scrubs any previous keys, pins the TLV order and resets
    /// every per-key counter.
    pub fn install(&mut self, master: MasterSecret, role: Role, amplified: bool) -> Result<()> {
        let tlv_order = TlvOrder::from_seed(master.tlv_order_seed()?);
        let layer_key = master.layer_key()?;

        self.scrub_keys();
        self.master = Some(master);
        self.layer_key = Some(layer_key);
        self.tlv_order = tlv_order;
        self.role = role;
        self.amplified = amplified;
        self.bytes_transferred = 0;
        self.packets_exchanged = 0;
        self.send_counter = 0;
        self.peer_nonce = 0;
        self.keyed_at = Some(Instant::now());
        self.rekey_skip_logged = false;
        self.phase = SessionPhase::Established;
        self.touch();
        Ok(())
    }

    /// Data-path cipher, reusing the cached key while it is fresh.
    pub fn data_aead(&mut self, session_id: &str) -> Result<Aead> {
        let now = Instant::now();
        let fresh = self
            .data_key_at
            .is_some_and(|at| now.duration_since(at) < DATA_KEY_TTL);

        if !fresh || self.data_key.is_none() {
            let master = self
                .master
                .as_ref()
                .ok_or_else(|| Error::invalid_state("session has no keys"))?;
            self.data_key = Some(master.data_key(session_id)?);
            self.data_key_at = Some(now);
        }

        match &self.data_key {
            Some(key) => Ok(Aead::new(key)),
            None => Err(Error::invalid_state("session has no keys")),
        }
    }

    /// Key of the amplification symmetric layer.
    pub fn layer_key(&self) -> Result<&AeadKey> {
        self.layer_key
            .as_ref()
            .ok_or_else(|| Error::invalid_state("session has no keys"))
    }

    /// Reserve the next outgoing nonce counter.
    pub fn next_send_counter(&mut self) -> Result<u64> {
        self.send_counter = self.send_counter.checked_add(1).ok_or(Error::RekeyRequired)?;
        Ok(self.send_counter)
    }

    /// Reject counters at or below the last authenticated one.
    pub fn check_replay(&self, nonce: u64) -> Result<()> {
        if nonce <= self.peer_nonce {
            return Err(Error::Replay(nonce));
        }
        Ok(())
    }

    /// Advance the replay window after a packet authenticated.
    pub fn accept_nonce(&mut self, nonce: u64) {
        self.peer_nonce = nonce;
    }

    /// Account for one packet carrying `payload` bytes and `wire` bytes on the wire.
    pub fn record_packet(&mut self, payload: usize, wire: usize) {
        self.bytes_transferred = self.bytes_transferred.saturating_add(payload as u64);
        self.packets_exchanged = self.packets_exchanged.saturating_add(1);
        self.history.record(wire);
        self.touch();
    }

    /// Mark activity.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since the last operation.
    pub fn idle(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Whether any rekey threshold has been crossed.
    pub fn should_rekey(&self, policy: &RekeyPolicy) -> bool {
        self.bytes_transferred > policy.max_bytes
            || self.packets_exchanged > policy.max_packets
            || self
                .keyed_at
                .is_some_and(|at| at.elapsed() > policy.max_key_age)
    }

    /// Scrub every secret. Counters and history survive.
    pub fn scrub(&mut self) {
        self.scrub_keys();
        self.client_random.zeroize();
        self.server_random.zeroize();
        self.pending_material.zeroize();
    }

    fn scrub_keys(&mut self) {
        self.master.zeroize();
        self.data_key.zeroize();
        self.data_key_at = None;
        self.layer_key.zeroize();
        self.keyed_at = None;
    }

    /// Whether key material is currently installed.
    pub fn has_keys(&self) -> bool {
        self.master.is_some()
    }

    /// Snapshot for observers.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            phase: self.phase,
            role: self.role,
            bytes_transferred: self.bytes_transferred,
            packets_exchanged: self.packets_exchanged,
            key_age: self.keyed_at.map(|at| at.elapsed()),
            idle: self.idle(),
            quality: self.quality,
            traffic: self.history.summary(),
        }
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: Duration) {
        if let Some(at) = self.last_activity.checked_sub(by) {
            self.last_activity = at;
        }
        self.keyed_at = self.keyed_at.and_then(|at| at.checked_sub(by));
    }
}
