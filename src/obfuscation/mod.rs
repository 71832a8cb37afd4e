//! Traffic Shaping.
//!
//! Countermeasures against size and offset fingerprinting:
//!
//! 1. **Profiles**: padding policy per imitated traffic class
//! 2. **Adaptive Shaper**: per-packet padding and pinned TLV field order
//! 3. **Vision**: shaping bypass for large redundant payloads
//!
//! Shaping never touches authenticated bytes. Padding lands after the TLV
//! nonce and is discarded by the receiver before decryption.

mod profile;
mod shaper;
mod vision;

pub use profile::TrafficProfile;
pub use shaper::{AdaptiveShaper, HistorySummary, TrafficHistory, HISTORY_LEN};
pub use vision::{
    apply_fast_path, can_use_fast_path, decode_frame, encode_frame, FrameFlags, VISION_THRESHOLD,
};
