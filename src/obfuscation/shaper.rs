//! Per-packet shaping.

use std::collections::VecDeque;

use parking_lot::RwLock;
use serde::Serialize;

use crate::codec::{TlvOrder, XtlsPacket};
use crate::crypto::SecureRandom;
use crate::obfuscation::TrafficProfile;
use crate::reality::RECORD_HEADER_LEN;

/// Number of wire sizes remembered per session.
pub const HISTORY_LEN: usize = 32;

/// Picks padding and field order for outgoing packets.
///
/// The active profile can be swapped at runtime from any thread.
#[derive(Debug)]
pub struct AdaptiveShaper {
    profile: RwLock<TrafficProfile>,
}

impl AdaptiveShaper {
    /// Create a shaper for `profile`.
    pub fn new(profile: TrafficProfile) -> Self {
        Self {
            profile: RwLock::new(profile),
        }
    }

    /// Active profile.
    pub fn profile(&self) -> TrafficProfile {
        *self.profile.read()
    }

    /// Switch the active profile.
    pub fn update_profile(&self, profile: TrafficProfile) {
        *self.profile.write() = profile;
    }

    /// Shape `packet` for transmission with the session's pinned `order`.
    ///
    /// `marker_len` is the size of the mimicry marker the record wrapper puts
    /// in front of the TLV; profile targets apply to the whole record.
    /// Only `padding_length` and `tlv_order` change; the value is copied
    /// through untouched.
    pub fn adapt_packet_structure(
        &self,
        packet: &XtlsPacket,
        order: TlvOrder,
        marker_len: usize,
    ) -> XtlsPacket {
        let profile = self.profile();
        let wire_len = RECORD_HEADER_LEN + marker_len + packet.encoded_len();
        let padding = profile.padding_len(wire_len, &mut SecureRandom::rng());

        XtlsPacket {
            padding_length: u16::try_from(padding).unwrap_or(u16::MAX),
            tlv_order: order,
            ..packet.clone()
        }
    }

    /// `len` bytes of filler in the active profile's distribution.
    pub fn generate_adaptive_padding(&self, len: usize) -> Vec<u8> {
        self.profile().filler(len)
    }
}

impl Default for AdaptiveShaper {
    fn default() -> Self {
        Self::new(TrafficProfile::default())
    }
}

/// Recent wire sizes of one session.
#[derive(Debug, Clone, Default)]
pub struct TrafficHistory {
    sizes: VecDeque<usize>,
}

/// Summary of a [`TrafficHistory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HistorySummary {
    /// Samples held
    pub samples: usize,
    /// Mean wire size
    pub mean_size: f64,
    /// Largest wire size
    pub max_size: usize,
}

impl TrafficHistory {
    /// Record the size of one emitted or accepted record.
    pub fn record(&mut self, size: usize) {
        if self.sizes.len() == HISTORY_LEN {
            self.sizes.pop_front();
        }
        self.sizes.push_back(size);
    }

    /// Number of samples held.
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Samples, oldest first.
    pub fn sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.sizes.iter().copied()
    }

    /// Mean and maximum of the held samples.
    pub fn summary(&self) -> HistorySummary {
        if self.sizes.is_empty() {
            return HistorySummary::default();
        }
        let total: usize = self.sizes.iter().sum();
        HistorySummary {
            samples: self.sizes.len(),
            mean_size: total as f64 / self.sizes.len() as f64,
            max_size: self.sizes.iter().copied().max().unwrap_or(0),
        }
    }

    /// Drop every sample.
    pub fn clear(&mut self) {
        self.sizes.clear();
    }
}
