//! Engine benchmarks.
//!
//! Covers the primitives on the handshake and data paths, then the full
//! engine data path under each shaping mode.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use xtls_reality::codec::{self, PacketType, TlvOrder, XtlsPacket};
use xtls_reality::crypto::{Aead, AeadKey, EphemeralSecret, MasterSecret, Nonce, PublicKey, StaticSecret};
use xtls_reality::{ProtocolEngine, RealityConfig, TrafficProfile};

fn bench_x25519_keygen(c: &mut Criterion) {
    c.bench_function("x25519_keygen", |b| {
        b.iter(|| {
            let secret = EphemeralSecret::random();
            black_box(PublicKey::from(&secret))
        })
    });
}

fn bench_x25519_dh(c: &mut Criterion) {
    let alice_secret = StaticSecret::random();
    let bob_secret = StaticSecret::random();
    let bob_public = PublicKey::from(&bob_secret);

    c.bench_function("x25519_dh", |b| {
        b.iter(|| black_box(alice_secret.diffie_hellman(&bob_public).unwrap()))
    });
}

fn bench_chacha20(c: &mut Criterion) {
    let aead = Aead::new(&AeadKey::from_bytes([0x42u8; 32]));
    let nonce = Nonce::with_salt([0, 0, 0, 1], 7);
    let plaintext = vec![0u8; 1200]; // Typical packet size
    let ciphertext = aead.encrypt(&nonce, &plaintext, b"aad").unwrap();

    let mut group = c.benchmark_group("chacha20");
    group.throughput(Throughput::Bytes(1200));
    group.bench_function("encrypt_1200", |b| {
        b.iter(|| black_box(aead.encrypt(&nonce, &plaintext, b"aad").unwrap()))
    });
    group.bench_function("decrypt_1200", |b| {
        b.iter(|| black_box(aead.decrypt(&nonce, &ciphertext, b"aad").unwrap()))
    });
    group.finish();
}

fn bench_key_schedule(c: &mut Criterion) {
    let secret = StaticSecret::random();
    let peer = PublicKey::from(&StaticSecret::random());
    let shared = secret.diffie_hellman(&peer).unwrap();

    c.bench_function("master_and_data_key", |b| {
        b.iter(|| {
            let master = MasterSecret::derive(&shared, &[1u8; 32], &[2u8; 32]).unwrap();
            black_box(master.data_key("session").unwrap())
        })
    });
}

fn bench_tlv_codec(c: &mut Criterion) {
    let mut packet = XtlsPacket::new(PacketType::Data, vec![0xabu8; 1200], 42);
    packet.padding_length = 64;
    let filler = vec![0u8; 64];
    let encoded = codec::encode_with_filler(&packet, TlvOrder::NonceFirst, &filler).unwrap();

    let mut group = c.benchmark_group("tlv");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("encode", |b| {
        b.iter(|| black_box(codec::encode_with_filler(&packet, TlvOrder::NonceFirst, &filler).unwrap()))
    });
    group.bench_function("decode", |b| {
        b.iter(|| black_box(codec::decode_with_order(&encoded, TlvOrder::NonceFirst).unwrap()))
    });
    group.finish();
}

fn connected(configure: impl Fn(&mut RealityConfig)) -> (ProtocolEngine, ProtocolEngine) {
    let mut client_config = RealityConfig::new("www.microsoft.com", [1u8; 32]);
    let mut server_config = RealityConfig::new("www.microsoft.com", [2u8; 32]);
    configure(&mut client_config);
    configure(&mut server_config);

    let client = ProtocolEngine::new(client_config).unwrap();
    let server = ProtocolEngine::new(server_config).unwrap();
    let init = client.create_handshake_init("bench").unwrap();
    let response = server.process_handshake_init("bench", &init).unwrap();
    client.process_handshake_response("bench", &response).unwrap();
    (client, server)
}

fn bench_handshake(c: &mut Criterion) {
    let client = ProtocolEngine::new(RealityConfig::new("www.microsoft.com", [1u8; 32])).unwrap();
    let server = ProtocolEngine::new(RealityConfig::new("www.microsoft.com", [2u8; 32])).unwrap();

    c.bench_function("engine_handshake", |b| {
        b.iter(|| {
            let init = client.create_handshake_init("hs").unwrap();
            let response = server.process_handshake_init("hs", &init).unwrap();
            client.process_handshake_response("hs", &response).unwrap();
            client.remove_session("hs");
            server.remove_session("hs");
        })
    });
}

fn bench_engine_data_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_encrypt");
    let payload = vec![0x5au8; 1200];
    group.throughput(Throughput::Bytes(payload.len() as u64));

    // high_performance_mode keeps the packet counter from forcing a rekey mid-run
    let (client, _) = connected(|config| config.high_performance_mode = true);
    group.bench_function("record_padding", |b| {
        b.iter(|| black_box(client.encrypt_data("bench", &payload).unwrap()))
    });

    for profile in TrafficProfile::ALL {
        let (client, _) = connected(|config| {
            config.high_performance_mode = true;
            config.adaptive_masking = true;
            config.target_profile = profile;
        });
        group.bench_with_input(BenchmarkId::new("adaptive", profile), &payload, |b, payload| {
            b.iter(|| black_box(client.encrypt_data("bench", payload).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_x25519_keygen,
    bench_x25519_dh,
    bench_chacha20,
    bench_key_schedule,
    bench_tlv_codec,
    bench_handshake,
    bench_engine_data_path,
);

criterion_main!(benches);
