//! XTLS-Reality command line
//!
//! Usage: xtls-reality [OPTIONS]
//!
//! Options:
//!   -g, --generate [HOST]   Generate a new engine configuration
//!   --show-pubkey <FILE>    Show the public key of a configuration
//!   --demo [PROFILE]        Run two engines against each other in memory
//!   -h, --help              Print help information

use std::env;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use xtls_reality::{ProtocolEngine, RealityConfig, TrafficProfile};

fn main() -> anyhow::Result<()> {
    // Respects RUST_LOG (e.g. RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "-h" | "--help" => {
            print_usage();
        }
        "-g" | "--generate" => {
            let host = args.get(2).map(String::as_str).unwrap_or("www.microsoft.com");
            generate_config(host)?;
        }
        "--show-pubkey" => {
            if args.len() < 3 {
                eprintln!("Error: --show-pubkey requires a config file path");
                return Ok(());
            }
            show_pubkey(&args[2])?;
        }
        "--demo" => {
            let profile = match args.get(2) {
                Some(name) => name.parse::<TrafficProfile>()?,
                None => TrafficProfile::default(),
            };
            run_demo(profile)?;
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
        }
    }

    Ok(())
}

fn print_usage() {
    println!(
        r#"XTLS-Reality - TLS-mimicking tunnel engine

USAGE:
    xtls-reality [OPTIONS]

OPTIONS:
    -g, --generate [HOST]   Generate a new configuration (default host: www.microsoft.com)
    --show-pubkey <FILE>    Show the public key and short id of a configuration
    --demo [PROFILE]        Handshake and exchange data between two in-memory engines
                            (profiles: https, gaming, streaming)
    -h, --help              Print help information

EXAMPLES:
    Generate a configuration:
        xtls-reality --generate www.apple.com > engine.toml

    Show the public key to pin on the peer:
        xtls-reality --show-pubkey engine.toml

    Watch the engine shape traffic like a game:
        RUST_LOG=debug xtls-reality --demo gaming
"#
    );
}

fn generate_config(host: &str) -> anyhow::Result<()> {
    let config = RealityConfig::generate(host);
    let public_key = config.public_key();

    println!("# XTLS-Reality Configuration");
    println!("# Generated: {}", chrono::Utc::now());
    println!();
    println!("{}", toml::to_string_pretty(&config)?);
    println!();
    println!("# Peer connection info:");
    println!("# Public Key (base64): {}", STANDARD.encode(public_key.as_bytes()));
    println!("# Short ID (hex): {}", hex::encode(&config.short_id));

    Ok(())
}

fn show_pubkey(config_path: &str) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(config_path)?;
    let config: RealityConfig = toml::from_str(&content)?;
    config.validate()?;

    println!("Public Key (base64): {}", STANDARD.encode(config.public_key().as_bytes()));
    println!("Short ID (hex):      {}", hex::encode(&config.short_id));
    println!("Mimicked host:       {}", config.server_name);

    Ok(())
}

fn run_demo(profile: TrafficProfile) -> anyhow::Result<()> {
    let mut client_config = RealityConfig::generate("www.microsoft.com");
    let mut server_config = RealityConfig::generate("www.microsoft.com");
    server_config.short_id = client_config.short_id.clone();
    client_config.peer_public_key = Some(server_config.public_key().to_bytes());
    server_config.peer_public_key = Some(client_config.public_key().to_bytes());

    for config in [&mut client_config, &mut server_config] {
        config.adaptive_masking = true;
        config.enable_vision = true;
        config.target_profile = profile;
    }

    let client = ProtocolEngine::new(client_config)?;
    let server = ProtocolEngine::new(server_config)?;

    let sizes = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&sizes);
    client.set_traffic_analyzer(move |packet| sink.lock().push(packet.encoded_len()));

    let init = client.create_handshake_init("demo")?;
    let response = server.process_handshake_init("demo", &init)?;
    client.process_handshake_response("demo", &response)?;
    tracing::info!("Handshake complete ({} + {} bytes)", init.len(), response.len());

    let messages: [&[u8]; 4] = [
        b"GET / HTTP/1.1\r\nHost: www.microsoft.com\r\n\r\n",
        b"ping",
        &[0u8; 8192],
        b"bye",
    ];
    for message in messages {
        let wire = client.encrypt_data("demo", message)?;
        let echoed = server.decrypt_data("demo", &wire)?;
        anyhow::ensure!(echoed == message, "payload mismatch");
        tracing::info!("{:>5} plaintext bytes -> {:>5} wire bytes", message.len(), wire.len());
    }

    let rekey = client.begin_rekey("demo")?;
    let rekey_response = server.process_handshake_init("demo", &rekey)?;
    client.process_handshake_response("demo", &rekey_response)?;

    let wire = server.encrypt_data("demo", b"after rekey")?;
    anyhow::ensure!(client.decrypt_data("demo", &wire)? == b"after rekey", "payload mismatch");

    println!("Shaped TLV sizes ({}): {:?}", profile, sizes.lock());
    println!();
    println!("{}", client.metrics().format_report());
    println!("Session: {}", describe_session(&client.session_stats("demo")?));

    client.close_session("demo")?;
    server.close_session("demo")?;
    Ok(())
}

fn describe_session(stats: &xtls_reality::SessionStats) -> String {
    format!(
        "phase={:?} role={:?} bytes={} packets={} mean_wire={:.1}",
        stats.phase, stats.role, stats.bytes_transferred, stats.packets_exchanged, stats.traffic.mean_size
    )
}
