//! Clipboard relay server
//!
//! Run with: cargo run --example relay_server [BIND_ADDR]
//!
//! Examples:
//!   CLIPFLOW_TOKENS=secret cargo run --example relay_server             # binds to 0.0.0.0:5000
//!   CLIPFLOW_TOKENS=secret cargo run --example relay_server localhost   # binds to 127.0.0.1:5000
//!   CLIPFLOW_TOKENS=a,b:10 cargo run --example relay_server 0.0.0.0:5050
//!
//! `CLIPFLOW_TOKENS` is a comma separated list of `token[:max_mb]` entries.
//! A token without a size limit may upload anything up to the global cap.
//!
//! Optional settings:
//!   CLIPFLOW_STORAGE_DIR=/var/lib/clipflow     # payload directory (default: files)
//!   CLIPFLOW_FILE_CACHE_MINUTES=30             # payload retention (default: 60)
//!   CLIPFLOW_MAX_REQUEST_BODY=10485760         # global body cap in bytes
//!
//! ## Try it
//!
//! Upload some text:
//!   curl -X POST -H 'X-Auth-Token: secret' -H 'X-User-Key: me' \
//!        --data 'hello' 'http://localhost:5000/api/clipboard/text?dataLength=5'
//!
//! Fetch the latest record:
//!   curl -H 'X-Auth-Token: secret' -H 'X-User-Key: me' http://localhost:5000/api/clipboard
//!
//! Devices subscribe on `ws://localhost:5000/api/clipboard/ws` with the same
//! headers plus `X-Client-Id`, and send `ping` at least once a minute.

use std::net::SocketAddr;

use clipflow_rs::{ClipServer, ServerConfig, TokenSetting};

const DEFAULT_PORT: u16 = 5000;

/// Parse bind address from command line argument
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:5000
/// - "localhost:5050" -> 127.0.0.1:5050
/// - "127.0.0.1" -> 127.0.0.1:5000
/// - "0.0.0.0:5000" -> 0.0.0.0:5000
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

/// Parse `token[:max_mb]` entries
fn parse_tokens(raw: &str) -> Result<Vec<TokenSetting>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((token, mb)) => mb
                .parse::<f64>()
                .map(|mb| TokenSetting::new(token).max_file_size_mb(mb))
                .map_err(|_| format!("Invalid size limit in token entry '{}'", entry)),
            None => Ok(TokenSetting::new(entry)),
        })
        .collect()
}

fn print_usage() {
    eprintln!("Usage: relay_server [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:{})", DEFAULT_PORT);
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CLIPFLOW_TOKENS                Comma separated token[:max_mb] list (required)");
    eprintln!("  CLIPFLOW_STORAGE_DIR           Payload directory (default: files)");
    eprintln!("  CLIPFLOW_FILE_CACHE_MINUTES    Minutes unreferenced payloads are kept (default: 60)");
    eprintln!("  CLIPFLOW_MAX_REQUEST_BODY      Largest request body in bytes (default: 524288000)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr = match args.get(1) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
    };

    let tokens = match std::env::var("CLIPFLOW_TOKENS") {
        Ok(raw) => parse_tokens(&raw)?,
        Err(_) => {
            eprintln!("Error: CLIPFLOW_TOKENS is not set");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clipflow_rs=debug".parse()?)
                .add_directive("relay_server=debug".parse()?),
        )
        .init();

    let config = match ServerConfig::default().with_env() {
        Ok(config) => ServerConfig {
            bind_addr,
            tokens,
            ..config
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    println!("Starting clipboard relay on {}", config.bind_addr);
    println!("Payloads stored in {}", config.storage_dir.display());
    println!(
        "Unreferenced payloads kept for {} minute(s)",
        config.cleanup.retention.as_secs() / 60
    );
    println!("{} token(s) configured", config.tokens.len());

    let server = ClipServer::new(config).await?;

    let result = server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await;

    if let Err(e) = result {
        eprintln!("Server error: {}", e);
    }

    Ok(())
}
