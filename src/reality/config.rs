//! Engine configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{PublicKey, SecureRandom, StaticSecret};
use crate::error::{Error, Result};
use crate::obfuscation::TrafficProfile;
use crate::reality::SHORT_ID_SIZE;

/// Configuration for one protocol engine.
///
/// Keys are base64 and the short id is hex in serialized form, so the
/// struct maps directly onto a TOML or JSON file. The private key is
/// wiped when the config is dropped.
#[derive(Clone, Serialize, Deserialize)]
pub struct RealityConfig {
    /// Hostname whose TLS traffic is mimicked (e.g. "www.microsoft.com")
    pub server_name: String,

    /// Local static X25519 secret
    #[serde(with = "base64_key")]
    pub private_key: [u8; 32],

    /// Expected peer public key; handshakes from any other key are rejected
    #[serde(default, with = "base64_key_opt", skip_serializing_if = "Option::is_none")]
    pub peer_public_key: Option<[u8; 32]>,

    /// Handshake discriminator, at most 8 bytes
    #[serde(default, with = "hex_short_id")]
    pub short_id: Vec<u8>,

    /// Skip shaping for large redundant payloads
    #[serde(default)]
    pub enable_vision: bool,

    /// Pad short records up to a common TLS record size
    #[serde(default = "default_true")]
    pub enable_padding: bool,

    /// Per-packet padding and field-order shaping
    #[serde(default)]
    pub adaptive_masking: bool,

    /// Exchange and mix secrecy-amplification material
    #[serde(default)]
    pub amplification_enabled: bool,

    /// Trade rekeying and the amplification layer for throughput
    #[serde(default)]
    pub high_performance_mode: bool,

    /// Traffic shape to imitate
    #[serde(default)]
    pub target_profile: TrafficProfile,

    /// Idle time after which a session is swept
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Agreement error rate above which an alert is logged
    #[serde(default = "default_error_threshold")]
    pub agreement_error_threshold: f64,
}

fn default_true() -> bool {
    true
}

fn default_session_ttl() -> u64 {
    24 * 60 * 60
}

fn default_error_threshold() -> f64 {
    0.11
}

impl RealityConfig {
    /// Create a configuration with default flags.
    pub fn new(server_name: impl Into<String>, private_key: [u8; 32]) -> Self {
        Self {
            server_name: server_name.into(),
            private_key,
            peer_public_key: None,
            short_id: Vec::new(),
            enable_vision: false,
            enable_padding: true,
            adaptive_masking: false,
            amplification_enabled: false,
            high_performance_mode: false,
            target_profile: TrafficProfile::default(),
            session_ttl_secs: default_session_ttl(),
            agreement_error_threshold: default_error_threshold(),
        }
    }

    /// Create a configuration with a fresh key pair and a random 8-byte short id.
    pub fn generate(server_name: impl Into<String>) -> Self {
        let mut config = Self::new(server_name, StaticSecret::random().to_bytes());
        config.short_id = SecureRandom::bytes::<SHORT_ID_SIZE>().to_vec();
        config
    }

    /// Local static secret.
    pub fn static_secret(&self) -> StaticSecret {
        StaticSecret::from_bytes(self.private_key)
    }

    /// Local public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&self.static_secret())
    }

    /// Short id zero-padded to the fixed handshake field width.
    pub fn short_id_field(&self) -> [u8; SHORT_ID_SIZE] {
        let mut field = [0u8; SHORT_ID_SIZE];
        let len = self.short_id.len().min(SHORT_ID_SIZE);
        field[..len].copy_from_slice(&self.short_id[..len]);
        field
    }

    /// Session idle TTL.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.server_name.is_empty() {
            return Err(Error::config("server_name cannot be empty"));
        }
        if self.private_key == [0u8; 32] {
            return Err(Error::config("private_key cannot be all zeros"));
        }
        if self.short_id.len() > SHORT_ID_SIZE {
            return Err(Error::config(format!(
                "short_id is {} bytes, limit is {}",
                self.short_id.len(),
                SHORT_ID_SIZE
            )));
        }
        if !(0.0..=1.0).contains(&self.agreement_error_threshold) {
            return Err(Error::config("agreement_error_threshold must be within [0, 1]"));
        }
        if self.session_ttl_secs == 0 {
            return Err(Error::config("session_ttl_secs must be positive"));
        }
        Ok(())
    }
}

impl Zeroize for RealityConfig {
    fn zeroize(&mut self) {
        self.private_key.zeroize();
    }
}

impl Drop for RealityConfig {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for RealityConfig {}

impl fmt::Debug for RealityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealityConfig")
            .field("server_name", &self.server_name)
            .field("private_key", &"<redacted>")
            .field("peer_public_key", &self.peer_public_key.map(hex::encode))
            .field("short_id", &hex::encode(&self.short_id))
            .field("enable_vision", &self.enable_vision)
            .field("enable_padding", &self.enable_padding)
            .field("adaptive_masking", &self.adaptive_masking)
            .field("amplification_enabled", &self.amplification_enabled)
            .field("high_performance_mode", &self.high_performance_mode)
            .field("target_profile", &self.target_profile)
            .finish_non_exhaustive()
    }
}

// Custom serde helpers for key and id fields
mod base64_key {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("key must be 32 bytes"))
    }
}

mod base64_key_opt {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(s) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let bytes = STANDARD.decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map(Some)
            .map_err(|_| serde::de::Error::custom("key must be 32 bytes"))
    }
}

mod hex_short_id {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = RealityConfig::new("www.example.com", [1u8; 32]);
        assert!(config.validate().is_ok());

        let bad_key = RealityConfig::new("www.example.com", [0u8; 32]);
        assert!(bad_key.validate().is_err());

        let mut long_id = config.clone();
        long_id.short_id = vec![0xaa; 9];
        assert!(long_id.validate().is_err());

        let mut bad_threshold = config.clone();
        bad_threshold.agreement_error_threshold = 1.5;
        assert!(bad_threshold.validate().is_err());

        let mut no_name = config;
        no_name.server_name.clear();
        assert!(no_name.validate().is_err());
    }

    #[test]
    fn test_short_id_field_is_zero_padded() {
        let mut config = RealityConfig::new("www.example.com", [1u8; 32]);
        config.short_id = vec![0xde, 0xad];
        assert_eq!(config.short_id_field(), [0xde, 0xad, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = RealityConfig::generate("www.microsoft.com");
        config.peer_public_key = Some([7u8; 32]);
        config.target_profile = TrafficProfile::Streaming;

        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("target_profile = \"streaming\""));
        assert!(text.contains(&hex::encode(&config.short_id)));

        let parsed: RealityConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.private_key, config.private_key);
        assert_eq!(parsed.peer_public_key, Some([7u8; 32]));
        assert_eq!(parsed.short_id, config.short_id);
        assert_eq!(parsed.target_profile, TrafficProfile::Streaming);
    }

    #[test]
    fn test_toml_defaults() {
        let text = r#"
            server_name = "www.cloudflare.com"
            private_key = "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE="
        "#;
        let config: RealityConfig = toml::from_str(text).unwrap();

        assert_eq!(config.private_key, [1u8; 32]);
        assert!(config.short_id.is_empty());
        assert!(config.enable_padding);
        assert!(!config.enable_vision);
        assert_eq!(config.target_profile, TrafficProfile::Https);
        assert_eq!(config.session_ttl(), Duration::from_secs(86_400));
        assert!((config.agreement_error_threshold - 0.11).abs() < f64::EPSILON);
        assert!(config.peer_public_key.is_none());
    }

    #[test]
    fn test_private_key_is_wiped() {
        fn wiped_on_drop<T: ZeroizeOnDrop>() {}
        wiped_on_drop::<RealityConfig>();

        let mut config = RealityConfig::generate("www.apple.com");
        assert_ne!(config.private_key, [0u8; 32]);
        config.zeroize();
        assert_eq!(config.private_key, [0u8; 32]);
        assert_eq!(config.server_name, "www.apple.com");
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let config = RealityConfig::new("www.example.com", [0x5au8; 32]);
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&hex::encode([0x5au8; 32])));
    }
}
