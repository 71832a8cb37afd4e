//! Protocol engine.
//!
//! Sans-IO: every operation takes and returns byte buffers, the caller owns
//! the transport.
//!
//! ```text
//! Initiator                                         Responder
//!   create_handshake_init("s1")  ---- init ---->  process_handshake_init("s1")
//!   process_handshake_response   <--- response -
//!   encrypt_data / decrypt_data  <=== data ====>  encrypt_data / decrypt_data
//! ```
//!
//! Outgoing bytes pass through: frame flags, optional amplification layer,
//! ChaCha20-Poly1305, optional shaping, TLV encoding and REALITY wrapping.
//! Incoming bytes take the reverse path.
//!
//! ## Locking
//!
//! The session table sits behind one `RwLock` and every session behind its
//! own `Mutex`. The table lock is always taken first; no path takes the
//! table lock while holding a session lock. The traffic analyzer runs only
//! after every engine lock has been released, so it may call back into the
//! engine.

mod handshake;
mod metrics;
mod session;

pub use handshake::{HandshakeInit, HandshakeResponse};
pub use metrics::{EngineCounters, MetricsSnapshot};
pub use session::{RekeyPolicy, Role, SessionPhase, SessionState, SessionStats, DATA_KEY_TTL};

use std::collections::HashMap;
use std::sync::Arc;
#[cfg(feature = "runtime")]
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::amplification::{
    AmplificationProvider, AmplificationQuality, Amplified, NoopAmplifier, SymmetricLayer,
    AMPLIFICATION_MATERIAL_SIZE,
};
use crate::codec::{self, PacketType, TlvOrder, XtlsPacket};
use crate::crypto::{ct_eq, MasterSecret, Nonce, PublicKey, SecureRandom, StaticSecret, MASTER_SECRET_SIZE};
use crate::error::{Error, Result};
use crate::obfuscation::{
    can_use_fast_path, decode_frame, encode_frame, AdaptiveShaper, FrameFlags, TrafficProfile,
};
use crate::reality::{ClientHelloBuilder, RealityConfig, RealityWrapper};

/// Longest accepted session identifier in bytes.
pub const MAX_SESSION_ID_LEN: usize = 255;

/// Observer called with every packet before it is encoded.
pub type TrafficAnalyzer = Arc<dyn Fn(&XtlsPacket) + Send + Sync>;

type SessionHandle = Arc<Mutex<SessionState>>;

/// Wire bytes plus the shaped packet still owed to the traffic analyzer.
struct Outgoing {
    wire: Vec<u8>,
    packet: XtlsPacket,
}

/// How an outgoing packet is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shaping {
    /// Profile-driven padding, no record padding
    Adaptive,
    /// Record padding per the config
    Record,
    /// Vision fast path: no padding at all
    Bypass,
}

/// The XTLS-Reality protocol engine.
///
/// One engine serves any number of sessions from any number of threads.
/// Calls on the same session are serialized.
pub struct ProtocolEngine {
    config: RealityConfig,
    secret: StaticSecret,
    public_key: PublicKey,
    wrapper: RealityWrapper,
    shaper: AdaptiveShaper,
    amplifier: Arc<dyn AmplificationProvider>,
    policy: RekeyPolicy,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    counters: EngineCounters,
    analyzer: RwLock<Option<TrafficAnalyzer>>,
}

impl ProtocolEngine {
    /// Create an engine with the no-op amplifier.
    pub fn new(config: RealityConfig) -> Result<Self> {
        Self::with_amplifier(config, Arc::new(NoopAmplifier))
    }

    /// Create an engine with a custom amplification provider.
    pub fn with_amplifier(
        config: RealityConfig,
        amplifier: Arc<dyn AmplificationProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let secret = config.static_secret();
        let public_key = PublicKey::from(&secret);
        let wrapper = RealityWrapper::new(&config.server_name, config.enable_padding);
        let shaper = AdaptiveShaper::new(config.target_profile);

        debug!(
            server_name = %config.server_name,
            profile = %config.target_profile,
            amplification = config.amplification_enabled,
            "protocol engine created"
        );

        Ok(Self {
            config,
            secret,
            public_key,
            wrapper,
            shaper,
            amplifier,
            policy: RekeyPolicy::default(),
            sessions: RwLock::new(HashMap::new()),
            counters: EngineCounters::default(),
            analyzer: RwLock::new(None),
        })
    }

    /// Replace the rekey thresholds.
    pub fn with_rekey_policy(mut self, policy: RekeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &RealityConfig {
        &self.config
    }

    /// Local static public key.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    // ---------------------------------------------------------------------
    // Handshake
    // ---------------------------------------------------------------------

    /// Open a session and produce the handshake init for the peer.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if `session_id` is already in use by a
    /// session that is not closed.
    pub fn create_handshake_init(&self, session_id: &str) -> Result<Vec<u8>> {
        check_session_id(session_id)?;

        let mut state = SessionState::new(Role::Initiator);
        let outgoing = self.start_handshake(&mut state, SessionPhase::HandshakeSent)?;

        {
            let mut sessions = self.sessions.write();
            if let Some(existing) = sessions.get(session_id) {
                let phase = existing.lock().phase();
                if phase != SessionPhase::Closed {
                    return Err(Error::invalid_state(format!(
                        "session already exists in phase {:?}",
                        phase
                    )));
                }
            }
            sessions.insert(session_id.to_string(), Arc::new(Mutex::new(state)));
        }

        debug!(session = session_id, "handshake init created");
        Ok(self.observe(outgoing))
    }

    /// Answer a peer's handshake init.
    ///
    /// Creates the session, replaces a closed one under the same id, or
    /// rekeys it when it is already established. Returns the handshake
    /// response to send back.
    ///
    /// # Errors
    ///
    /// - [`Error::AuthenticationFailure`] on a short id or pinned key mismatch
    /// - [`Error::KeyAgreementFailure`] on a low-order peer key
    /// - [`Error::InvalidState`] when the session is mid-handshake, closing,
    ///   or running its own rekey (a collision; the caller retries)
    pub fn process_handshake_init(&self, session_id: &str, bytes: &[u8]) -> Result<Vec<u8>> {
        check_session_id(session_id)?;

        let init = HandshakeInit::parse(&self.read_handshake(bytes, PacketType::HandshakeInit)?)?;
        if !ct_eq(&init.short_id, &self.config.short_id_field()) {
            self.counters.increment_auth_failures();
            debug!(session = session_id, "handshake init with unknown short id");
            return Err(Error::AuthenticationFailure);
        }
        self.check_peer_key(&init.public_key)?;

        let existing = self.sessions.read().get(session_id).cloned();
        if let Some(handle) = existing {
            let mut state = handle.lock();
            match state.phase() {
                SessionPhase::Established => {
                    let outgoing = self.respond(&mut state, session_id, &init)?;
                    drop(state);
                    self.counters.increment_rekeys();
                    info!(session = session_id, "session rekeyed by peer");
                    return Ok(self.observe(outgoing));
                }
                // A closed id is free again, as on the initiator side
                SessionPhase::Closed => {}
                SessionPhase::Rekeying => {
                    return Err(Error::invalid_state(
                        "rekey collision: a local rekey is already pending",
                    ))
                }
                phase => {
                    return Err(Error::invalid_state(format!(
                        "cannot accept a handshake init in phase {:?}",
                        phase
                    )))
                }
            }
        }

        let mut state = SessionState::new(Role::Responder);
        state.phase = SessionPhase::HandshakeReceived;
        let outgoing = self.respond(&mut state, session_id, &init)?;

        {
            let mut sessions = self.sessions.write();
            if let Some(current) = sessions.get(session_id) {
                if current.lock().phase() != SessionPhase::Closed {
                    return Err(Error::invalid_state("session was created concurrently"));
                }
            }
            sessions.insert(session_id.to_string(), Arc::new(Mutex::new(state)));
        }

        info!(session = session_id, "session established (responder)");
        Ok(self.observe(outgoing))
    }

    /// Complete a handshake or rekey started by this side.
    ///
    /// On any error the session keeps its phase, so a valid response can
    /// still be processed afterwards.
    pub fn process_handshake_response(&self, session_id: &str, bytes: &[u8]) -> Result<()> {
        let handle = self.session(session_id)?;
        let mut state = handle.lock();

        let rekey = match state.phase() {
            SessionPhase::HandshakeSent => false,
            SessionPhase::Rekeying => true,
            phase => {
                return Err(Error::invalid_state(format!(
                    "no handshake pending (phase {:?})",
                    phase
                )))
            }
        };

        let response =
            HandshakeResponse::parse(&self.read_handshake(bytes, PacketType::HandshakeResponse)?)?;
        self.check_peer_key(&response.public_key)?;

        let shared = self.secret.diffie_hellman(&response.public_key)?;
        let mut master = MasterSecret::derive(&shared, &state.client_random, &response.server_random)?;
        drop(shared);

        let quality = self.amplify(
            session_id,
            &mut master,
            state.pending_material.as_ref(),
            response.material.as_ref(),
        )?;

        state.server_random = response.server_random;
        state.pending_material.zeroize();
        state.install(master, Role::Initiator, quality.is_some())?;
        state.quality = quality;
        self.counters.increment_handshakes();

        if rekey {
            self.counters.increment_rekeys();
            info!(session = session_id, order = ?state.tlv_order, "session rekeyed");
        } else {
            info!(session = session_id, order = ?state.tlv_order, "session established");
        }
        Ok(())
    }

    /// Start a rekey on an established session.
    ///
    /// The returned init goes to the peer's [`process_handshake_init`];
    /// until its response arrives the session decrypts with the old keys
    /// and refuses to encrypt.
    ///
    /// [`process_handshake_init`]: Self::process_handshake_init
    pub fn begin_rekey(&self, session_id: &str) -> Result<Vec<u8>> {
        let handle = self.session(session_id)?;
        let mut state = handle.lock();

        if state.phase() != SessionPhase::Established {
            return Err(Error::invalid_state(format!(
                "cannot rekey in phase {:?}",
                state.phase()
            )));
        }

        let outgoing = self.start_handshake(&mut state, SessionPhase::Rekeying)?;
        drop(state);

        debug!(session = session_id, "rekey started");
        Ok(self.observe(outgoing))
    }

    /// Whether the session has crossed a rekey threshold.
    pub fn should_rekey(&self, session_id: &str) -> Result<bool> {
        Ok(self.session(session_id)?.lock().should_rekey(&self.policy))
    }

    // ---------------------------------------------------------------------
    // Data path
    // ---------------------------------------------------------------------

    /// Encrypt `plaintext` into wire bytes.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the session is established
    /// - [`Error::RekeyRequired`] when a rekey threshold was crossed and
    ///   high-performance mode is off
    pub fn encrypt_data(&self, session_id: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let handle = self.session(session_id)?;
        let mut state = handle.lock();

        if state.phase() != SessionPhase::Established {
            return Err(Error::invalid_state(format!(
                "session not established (phase {:?})",
                state.phase()
            )));
        }

        if state.should_rekey(&self.policy) {
            if !self.config.high_performance_mode {
                return Err(Error::RekeyRequired);
            }
            if !state.rekey_skip_logged {
                warn!(session = session_id, "rekey due but skipped in high-performance mode");
                state.rekey_skip_logged = true;
            }
        }

        let counter = state.next_send_counter()?;
        let nonce = Nonce::with_salt(state.role.send_salt(), counter);

        let vision = self.config.enable_vision && can_use_fast_path(plaintext);
        let mut flags = FrameFlags::NONE;
        if vision {
            flags.insert(FrameFlags::VISION);
        }

        let frame = if state.amplified && !self.config.high_performance_mode {
            flags.insert(FrameFlags::AMPLIFIED);
            let sealed = SymmetricLayer::new(state.layer_key()?).seal(&nonce, plaintext)?;
            encode_frame(flags, &sealed)
        } else {
            encode_frame(flags, plaintext)
        };
        let frame = Zeroizing::new(frame);

        let value = state
            .data_aead(session_id)?
            .encrypt(&nonce, &frame, &data_aad(counter))?;
        let packet = XtlsPacket::new(PacketType::Data, value, counter);

        let shaping = if vision { Shaping::Bypass } else { self.shaping() };
        let outgoing = self.emit(packet, state.tlv_order, shaping)?;

        state.record_packet(plaintext.len(), outgoing.wire.len());
        drop(state);

        self.counters.add_packet(plaintext.len());
        Ok(self.observe(outgoing))
    }

    /// Decrypt wire bytes produced by the peer's [`encrypt_data`].
    ///
    /// Also accepted while a local rekey is pending.
    ///
    /// # Errors
    ///
    /// - [`Error::AuthenticationFailure`] if the tag does not verify; no
    ///   plaintext is returned
    /// - [`Error::InvalidPacketType`] for anything but a data packet
    /// - [`Error::Replay`] for a counter at or below the last accepted one
    ///
    /// [`encrypt_data`]: Self::encrypt_data
    pub fn decrypt_data(&self, session_id: &str, bytes: &[u8]) -> Result<Vec<u8>> {
        let handle = self.session(session_id)?;
        let mut state = handle.lock();

        if !matches!(state.phase(), SessionPhase::Established | SessionPhase::Rekeying) {
            return Err(Error::invalid_state(format!(
                "session not established (phase {:?})",
                state.phase()
            )));
        }

        let tlv = self.wrapper.unwrap(bytes)?;
        let packet = codec::decode_with_order(&tlv, state.tlv_order)?;
        if packet.packet_type != PacketType::Data {
            return Err(Error::InvalidPacketType {
                expected: PacketType::Data,
                actual: packet.packet_type,
            });
        }
        state.check_replay(packet.nonce)?;

        let nonce = Nonce::with_salt(state.role.recv_salt(), packet.nonce);
        let frame = state
            .data_aead(session_id)?
            .decrypt(&nonce, &packet.value, &data_aad(packet.nonce))
            .map_err(|err| self.note_failure(session_id, err))?;
        let frame = Zeroizing::new(frame);

        let (flags, body) = decode_frame(&frame)?;
        let plaintext = if flags.contains(FrameFlags::AMPLIFIED) {
            SymmetricLayer::new(state.layer_key()?)
                .open(&nonce, body)
                .map_err(|err| self.note_failure(session_id, err))?
        } else {
            body.to_vec()
        };

        state.accept_nonce(packet.nonce);
        state.record_packet(plaintext.len(), bytes.len());
        self.counters.add_packet(plaintext.len());
        Ok(plaintext)
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Close a session and scrub its keys. The entry stays until swept.
    pub fn close_session(&self, session_id: &str) -> Result<()> {
        let handle = self.session(session_id)?;
        let mut state = handle.lock();

        if state.phase() == SessionPhase::Closed {
            return Ok(());
        }
        state.phase = SessionPhase::Closing;
        state.scrub();
        state.phase = SessionPhase::Closed;

        debug!(session = session_id, "session closed");
        Ok(())
    }

    /// Remove a session immediately. Returns whether it existed.
    pub fn remove_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id);
        match removed {
            Some(handle) => {
                handle.lock().scrub();
                debug!(session = session_id, "session removed");
                true
            }
            None => false,
        }
    }

    /// Phase of a session.
    pub fn session_phase(&self, session_id: &str) -> Result<SessionPhase> {
        Ok(self.session(session_id)?.lock().phase())
    }

    /// Counters and traffic history of a session.
    pub fn session_stats(&self, session_id: &str) -> Result<SessionStats> {
        Ok(self.session(session_id)?.lock().stats())
    }

    /// Drop closed sessions and sessions idle past the TTL.
    ///
    /// Returns the number removed. Waits for in-flight operations on each
    /// session before inspecting it.
    pub fn cleanup_sessions(&self) -> usize {
        let ttl = self.config.session_ttl();

        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|id, handle| {
            let mut state = handle.lock();
            let expired = state.phase() == SessionPhase::Closed || state.idle() > ttl;
            if expired {
                state.scrub();
                debug!(session = %id, "session swept");
            }
            !expired
        });
        let swept = before - sessions.len();
        drop(sessions);

        if swept > 0 {
            self.counters.add_swept(swept);
            debug!(swept, "session sweep finished");
        }
        swept
    }

    /// Run [`cleanup_sessions`] every `interval`. Never returns.
    ///
    /// [`cleanup_sessions`]: Self::cleanup_sessions
    #[cfg(feature = "runtime")]
    pub async fn run_cleanup(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.cleanup_sessions();
        }
    }

    // ---------------------------------------------------------------------
    // Observability and shaping
    // ---------------------------------------------------------------------

    /// Current engine metrics.
    ///
    /// Amplification figures are averaged over sessions that mixed
    /// material; with none, the provider's own report is used.
    pub fn metrics(&self) -> MetricsSnapshot {
        let mut active_sessions = 0;
        let mut qualities: Vec<AmplificationQuality> = Vec::new();
        {
            let sessions = self.sessions.read();
            for handle in sessions.values() {
                let state = handle.lock();
                if !matches!(state.phase(), SessionPhase::Closing | SessionPhase::Closed) {
                    active_sessions += 1;
                }
                qualities.extend(state.quality);
            }
        }

        let (avg_entropy_estimate, avg_agreement_error_rate) = if qualities.is_empty() {
            let quality = self.amplifier.report_quality();
            (quality.entropy_estimate, quality.agreement_error_rate)
        } else {
            let n = qualities.len() as f64;
            (
                qualities.iter().map(|q| q.entropy_estimate).sum::<f64>() / n,
                qualities.iter().map(|q| q.agreement_error_rate).sum::<f64>() / n,
            )
        };

        MetricsSnapshot {
            active_sessions,
            total_bytes: self.counters.total_bytes(),
            total_packets: self.counters.total_packets(),
            avg_entropy_estimate,
            avg_agreement_error_rate,
            handshakes_completed: self.counters.handshakes_completed(),
            auth_failures: self.counters.auth_failures(),
            rekeys: self.counters.rekeys(),
            sessions_swept: self.counters.sessions_swept(),
        }
    }

    /// Install an observer called with every outgoing packet.
    pub fn set_traffic_analyzer<F>(&self, analyzer: F)
    where
        F: Fn(&XtlsPacket) + Send + Sync + 'static,
    {
        *self.analyzer.write() = Some(Arc::new(analyzer));
    }

    /// Remove the traffic observer.
    pub fn clear_traffic_analyzer(&self) {
        *self.analyzer.write() = None;
    }

    /// Switch the shaping profile for all sessions.
    pub fn update_traffic_profile(&self, profile: TrafficProfile) {
        self.shaper.update_profile(profile);
        info!(profile = %profile, "traffic profile updated");
    }

    /// Active shaping profile.
    pub fn traffic_profile(&self) -> TrafficProfile {
        self.shaper.profile()
    }

    /// Decoy ClientHello for the configured host, with a fresh random and
    /// key share.
    pub fn decoy_client_hello(&self) -> Result<Vec<u8>> {
        ClientHelloBuilder::new(self.config.server_name.as_str()).build()
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn session(&self, session_id: &str) -> Result<SessionHandle> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::UnknownSession(session_id.to_string()))
    }

    fn shaping(&self) -> Shaping {
        if self.config.adaptive_masking {
            Shaping::Adaptive
        } else {
            Shaping::Record
        }
    }

    /// Build and emit a handshake init, moving `state` to `next`.
    fn start_handshake(&self, state: &mut SessionState, next: SessionPhase) -> Result<Outgoing> {
        let client_random = SecureRandom::bytes::<32>();
        let material = self.local_material()?;

        let init = HandshakeInit {
            client_random,
            public_key: self.public_key,
            short_id: self.config.short_id_field(),
            material,
        };
        let packet = XtlsPacket::new(PacketType::HandshakeInit, init.encode(), 0);
        let outgoing = self.emit(packet, TlvOrder::Canonical, self.shaping())?;

        state.client_random = client_random;
        state.pending_material = material;
        state.phase = next;
        Ok(outgoing)
    }

    /// Derive keys for a received init, install them and build the response.
    fn respond(
        &self,
        state: &mut SessionState,
        session_id: &str,
        init: &HandshakeInit,
    ) -> Result<Outgoing> {
        let server_random = SecureRandom::bytes::<32>();
        let material = match init.material {
            Some(_) => self.local_material()?,
            None => None,
        };

        let shared = self.secret.diffie_hellman(&init.public_key)?;
        let mut master = MasterSecret::derive(&shared, &init.client_random, &server_random)?;
        drop(shared);

        let quality = self.amplify(session_id, &mut master, init.material.as_ref(), material.as_ref())?;

        let response = HandshakeResponse {
            server_random,
            public_key: self.public_key,
            material,
        };
        let packet = XtlsPacket::new(PacketType::HandshakeResponse, response.encode(), 0);
        let outgoing = self.emit(packet, TlvOrder::Canonical, self.shaping())?;

        state.client_random = init.client_random;
        state.server_random = server_random;
        state.install(master, Role::Responder, quality.is_some())?;
        state.quality = quality;
        self.counters.increment_handshakes();
        Ok(outgoing)
    }

    /// Local amplification material, when enabled.
    fn local_material(&self) -> Result<Option<[u8; AMPLIFICATION_MATERIAL_SIZE]>> {
        if !self.config.amplification_enabled {
            return Ok(None);
        }
        let material = self.amplifier.generate_material(AMPLIFICATION_MATERIAL_SIZE);
        let material = <[u8; AMPLIFICATION_MATERIAL_SIZE]>::try_from(material.as_slice())
            .map_err(|_| {
                Error::crypto(format!(
                    "amplification provider returned {} bytes, expected {}",
                    material.len(),
                    AMPLIFICATION_MATERIAL_SIZE
                ))
            })?;
        Ok(Some(material))
    }

    /// Mix provider output into `master` when both sides sent material.
    fn amplify(
        &self,
        session_id: &str,
        master: &mut MasterSecret,
        initiator_material: Option<&[u8; AMPLIFICATION_MATERIAL_SIZE]>,
        responder_material: Option<&[u8; AMPLIFICATION_MATERIAL_SIZE]>,
    ) -> Result<Option<AmplificationQuality>> {
        let (Some(initiator), Some(responder)) = (initiator_material, responder_material) else {
            return Ok(None);
        };

        let Amplified { material, quality } =
            self.amplifier
                .derive_material(initiator, responder, MASTER_SECRET_SIZE)?;
        master.mix(&material);

        if quality.agreement_error_rate > self.config.agreement_error_threshold {
            warn!(
                session = session_id,
                error_rate = quality.agreement_error_rate,
                threshold = self.config.agreement_error_threshold,
                "amplification agreement error rate above threshold"
            );
        }
        Ok(Some(quality))
    }

    fn check_peer_key(&self, peer: &PublicKey) -> Result<()> {
        if let Some(pinned) = &self.config.peer_public_key {
            if !ct_eq(pinned, peer.as_bytes()) {
                self.counters.increment_auth_failures();
                debug!("handshake from a key other than the pinned peer key");
                return Err(Error::AuthenticationFailure);
            }
        }
        Ok(())
    }

    /// Unwrap and decode a handshake packet, returning its value.
    fn read_handshake(&self, bytes: &[u8], expected: PacketType) -> Result<Vec<u8>> {
        let tlv = self.wrapper.unwrap(bytes)?;
        let packet = codec::decode(&tlv)?;
        if packet.packet_type != expected {
            return Err(Error::InvalidPacketType {
                expected,
                actual: packet.packet_type,
            });
        }
        Ok(packet.value)
    }

    /// Shape, encode and wrap an outgoing packet.
    fn emit(&self, packet: XtlsPacket, order: TlvOrder, shaping: Shaping) -> Result<Outgoing> {
        let packet = match shaping {
            Shaping::Adaptive => {
                self.shaper
                    .adapt_packet_structure(&packet, order, self.wrapper.marker().len())
            }
            Shaping::Record | Shaping::Bypass => XtlsPacket {
                tlv_order: order,
                ..packet
            },
        };

        let filler = self
            .shaper
            .generate_adaptive_padding(packet.padding_length as usize);
        let tlv = codec::encode_with_filler(&packet, order, &filler)?;

        let wire = match shaping {
            Shaping::Record => self
                .wrapper
                .wrap_with_filler(&tlv, |n| self.shaper.generate_adaptive_padding(n)),
            Shaping::Adaptive | Shaping::Bypass => self.wrapper.without_padding().wrap(&tlv),
        };
        Ok(Outgoing { wire, packet })
    }

    /// Hand the shaped packet to the analyzer and release the wire bytes.
    ///
    /// Callers must hold no engine lock.
    fn observe(&self, outgoing: Outgoing) -> Vec<u8> {
        let analyzer = self.analyzer.read().clone();
        if let Some(analyzer) = analyzer {
            analyzer(&outgoing.packet);
        }
        outgoing.wire
    }

    fn note_failure(&self, session_id: &str, err: Error) -> Error {
        if err.is_auth_failure() {
            self.counters.increment_auth_failures();
            debug!(session = session_id, "data packet failed authentication");
        }
        err
    }
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("server_name", &self.config.server_name)
            .field("profile", &self.shaper.profile())
            .field("sessions", &self.sessions.read().len())
            .finish_non_exhaustive()
    }
}

fn check_session_id(session_id: &str) -> Result<()> {
    if session_id.len() > MAX_SESSION_ID_LEN {
        return Err(Error::invalid_state(format!(
            "session id of {} bytes exceeds {}",
            session_id.len(),
            MAX_SESSION_ID_LEN
        )));
    }
    Ok(())
}

/// `type || nonce` authenticated with every data packet.
fn data_aad(nonce: u64) -> [u8; 9] {
    let mut aad = [0u8; 9];
    aad[0] = PacketType::Data as u8;
    aad[1..].copy_from_slice(&nonce.to_be_bytes());
    aad
}
