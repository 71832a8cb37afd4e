//! Decoy TLS ClientHello construction.
//!
//! Produces a complete, well-formed ClientHello for the mimicked hostname,
//! sent as the opening record of a new connection. Every nested length field
//! (record, handshake, vectors, extensions) is written as a placeholder and
//! patched in a single finalize pass once the content is known.

use bytes::{BufMut, BytesMut};

use crate::crypto::{EphemeralSecret, PublicKey, SecureRandom};
use crate::error::{Error, Result};
use crate::reality::{ExtensionType, CONTENT_TYPE_HANDSHAKE, HANDSHAKE_CLIENT_HELLO, RECORD_VERSION};

/// Record version browsers use on the first ClientHello record
const HELLO_RECORD_VERSION: u16 = 0x0301;

const TLS13: u16 = 0x0304;
const X25519_GROUP: u16 = 0x001d;

const DEFAULT_CIPHER_SUITES: &[u16] = &[
    0x1301, // TLS_AES_128_GCM_SHA256
    0x1302, // TLS_AES_256_GCM_SHA384
    0x1303, // TLS_CHACHA20_POLY1305_SHA256
    0xc02b, // TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
    0xc02f, // TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256
    0xc02c, // TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384
    0xc030, // TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384
    0xcca9, // TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256
    0xcca8, // TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256
];

const DEFAULT_GROUPS: &[u16] = &[
    X25519_GROUP,
    0x0017, // secp256r1
    0x0018, // secp384r1
];

const DEFAULT_SIGNATURE_ALGORITHMS: &[u16] = &[
    0x0403, // ecdsa_secp256r1_sha256
    0x0804, // rsa_pss_rsae_sha256
    0x0401, // rsa_pkcs1_sha256
    0x0503, // ecdsa_secp384r1_sha384
    0x0805, // rsa_pss_rsae_sha384
    0x0501, // rsa_pkcs1_sha384
    0x0806, // rsa_pss_rsae_sha512
    0x0601, // rsa_pkcs1_sha512
];

struct LengthSlot {
    at: usize,
    width: usize,
    end: Option<usize>,
}

/// Byte writer with deferred length fields.
struct HelloWriter {
    buf: BytesMut,
    slots: Vec<LengthSlot>,
    open: Vec<usize>,
}

impl HelloWriter {
    fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(512),
            slots: Vec::new(),
            open: Vec::new(),
        }
    }

    /// Reserve a `width`-byte length covering everything up to the matching `close`.
    fn open(&mut self, width: usize) {
        self.slots.push(LengthSlot {
            at: self.buf.len(),
            width,
            end: None,
        });
        self.open.push(self.slots.len() - 1);
        self.buf.put_bytes(0, width);
    }

    fn close(&mut self) {
        if let Some(index) = self.open.pop() {
            self.slots[index].end = Some(self.buf.len());
        }
    }

    fn finalize(mut self) -> Result<Vec<u8>> {
        if !self.open.is_empty() {
            return Err(Error::malformed("unterminated length field"));
        }

        for slot in &self.slots {
            let end = slot
                .end
                .ok_or_else(|| Error::malformed("unterminated length field"))?;
            let len = end - slot.at - slot.width;
            if len >= 1usize << (8 * slot.width) {
                return Err(Error::malformed(format!(
                    "{} bytes do not fit a {}-byte length field",
                    len, slot.width
                )));
            }
            let be = (len as u32).to_be_bytes();
            self.buf[slot.at..slot.at + slot.width].copy_from_slice(&be[4 - slot.width..]);
        }

        Ok(self.buf.to_vec())
    }
}

/// Builder for decoy ClientHello records.
#[derive(Debug, Clone)]
pub struct ClientHelloBuilder {
    server_name: String,
    random: [u8; 32],
    session_id: Vec<u8>,
    cipher_suites: Vec<u16>,
    supported_groups: Vec<u16>,
    signature_algorithms: Vec<u16>,
    alpn: Vec<String>,
    key_share: [u8; 32],
}

impl ClientHelloBuilder {
    /// Start a ClientHello for `server_name` with browser-like defaults,
    /// a random `random`, a random 32-byte legacy session id and a fresh
    /// X25519 key share.
    pub fn new(server_name: impl Into<String>) -> Self {
        let ephemeral = EphemeralSecret::random();
        Self {
            server_name: server_name.into(),
            random: SecureRandom::bytes(),
            session_id: SecureRandom::bytes::<32>().to_vec(),
            cipher_suites: DEFAULT_CIPHER_SUITES.to_vec(),
            supported_groups: DEFAULT_GROUPS.to_vec(),
            signature_algorithms: DEFAULT_SIGNATURE_ALGORITHMS.to_vec(),
            alpn: vec!["h2".to_string(), "http/1.1".to_string()],
            key_share: PublicKey::from(&ephemeral).to_bytes(),
        }
    }

    /// Fixed 32-byte random.
    pub fn random(mut self, random: [u8; 32]) -> Self {
        self.random = random;
        self
    }

    /// Legacy session id, at most 32 bytes.
    pub fn session_id(mut self, session_id: Vec<u8>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Offered cipher suites.
    pub fn cipher_suites(mut self, suites: Vec<u16>) -> Self {
        self.cipher_suites = suites;
        self
    }

    /// Offered key exchange groups.
    pub fn supported_groups(mut self, groups: Vec<u16>) -> Self {
        self.supported_groups = groups;
        self
    }

    /// Offered signature algorithms.
    pub fn signature_algorithms(mut self, algorithms: Vec<u16>) -> Self {
        self.signature_algorithms = algorithms;
        self
    }

    /// ALPN protocols; an empty list omits the extension.
    pub fn alpn(mut self, protocols: Vec<String>) -> Self {
        self.alpn = protocols;
        self
    }

    /// X25519 public key carried in the key_share extension.
    pub fn key_share(mut self, public: [u8; 32]) -> Self {
        self.key_share = public;
        self
    }

    /// Serialize the record.
    ///
    /// # Errors
    ///
    /// Fails when a field outgrows its length prefix (e.g. a session id
    /// above 32 bytes or an ALPN name above 255 bytes).
    pub fn build(&self) -> Result<Vec<u8>> {
        if self.session_id.len() > 32 {
            return Err(Error::malformed("legacy session id exceeds 32 bytes"));
        }

        let mut w = HelloWriter::new();

        w.buf.put_u8(CONTENT_TYPE_HANDSHAKE);
        w.buf.put_u16(HELLO_RECORD_VERSION);
        w.open(2);

        w.buf.put_u8(HANDSHAKE_CLIENT_HELLO);
        w.open(3);

        w.buf.put_u16(RECORD_VERSION);
        w.buf.put_slice(&self.random);

        w.open(1);
        w.buf.put_slice(&self.session_id);
        w.close();

        w.open(2);
        for suite in &self.cipher_suites {
            w.buf.put_u16(*suite);
        }
        w.close();

        // Compression methods: null only
        w.buf.put_u8(1);
        w.buf.put_u8(0);

        w.open(2);
        self.write_extensions(&mut w);
        w.close();

        w.close(); // handshake
        w.close(); // record

        w.finalize()
    }

    fn write_extensions(&self, w: &mut HelloWriter) {
        // server_name: list { host_name(0) name }
        w.buf.put_u16(ExtensionType::ServerName as u16);
        w.open(2);
        w.open(2);
        w.buf.put_u8(0);
        w.open(2);
        w.buf.put_slice(self.server_name.as_bytes());
        w.close();
        w.close();
        w.close();

        write_u16_list(w, ExtensionType::SupportedGroups, &self.supported_groups);
        write_u16_list(w, ExtensionType::SignatureAlgorithms, &self.signature_algorithms);

        if !self.alpn.is_empty() {
            w.buf.put_u16(ExtensionType::ApplicationLayerProtocolNegotiation as u16);
            w.open(2);
            w.open(2);
            for protocol in &self.alpn {
                w.open(1);
                w.buf.put_slice(protocol.as_bytes());
                w.close();
            }
            w.close();
            w.close();
        }

        w.buf.put_u16(ExtensionType::SupportedVersions as u16);
        w.open(2);
        w.open(1);
        w.buf.put_u16(TLS13);
        w.buf.put_u16(RECORD_VERSION);
        w.close();
        w.close();

        w.buf.put_u16(ExtensionType::KeyShare as u16);
        w.open(2);
        w.open(2);
        w.buf.put_u16(X25519_GROUP);
        w.open(2);
        w.buf.put_slice(&self.key_share);
        w.close();
        w.close();
        w.close();
    }
}

fn write_u16_list(w: &mut HelloWriter, extension: ExtensionType, values: &[u16]) {
    w.buf.put_u16(extension as u16);
    w.open(2);
    w.open(2);
    for value in values {
        w.buf.put_u16(*value);
    }
    w.close();
    w.close();
}
