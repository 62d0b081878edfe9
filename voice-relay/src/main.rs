use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::UdpSocket;
use tokio::time::interval;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use voice_relay::relay::{validate_channel, RegisterOutcome, RelayState, BUFFER_SIZE, CLIENT_TIMEOUT_SEC};

/// `voice-relay <port>`
#[derive(Parser, Debug)]
#[command(name = "voice-relay", about = "UDP voice channel relay")]
struct Config {
    /// UDP port to listen on.
    port: u16,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("VOICE_RELAY_LOG_JSON").is_ok() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = Config::parse();
    let addr = format!("0.0.0.0:{}", config.port);
    let socket = UdpSocket::bind(&addr).await?;
    info!(%addr, "voice-relay listening");

    let state = Arc::new(RelayState::new());
    run(socket, state).await
}

async fn run(socket: UdpSocket, state: Arc<RelayState>) -> anyhow::Result<()> {
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut eviction_timer = interval(Duration::from_secs(CLIENT_TIMEOUT_SEC));

    loop {
        tokio::select! {
            recv = socket.recv_from(&mut buf) => {
                let (len, sender) = match recv {
                    Ok(v) => v,
                    Err(err) => {
                        warn!(%err, "udp recv error");
                        continue;
                    }
                };
                handle_datagram(&socket, &state, sender, &buf[..len]).await;
            }
            _ = eviction_timer.tick() => {
                let evicted = state.evict_inactive(Duration::from_secs(CLIENT_TIMEOUT_SEC));
                for addr in evicted {
                    debug!(%addr, "evicted inactive endpoint");
                }
            }
        }
    }
}

async fn handle_datagram(socket: &UdpSocket, state: &RelayState, sender: SocketAddr, payload: &[u8]) {
    if let Some(rest) = strip_prefix(payload, b"PING") {
        let _ = rest;
        let _ = socket.send_to(b"PONG", sender).await;
        return;
    }

    if let Some(rest) = strip_prefix(payload, b"REGISTER ") {
        let channel = String::from_utf8_lossy(rest).trim().to_string();
        if !validate_channel(&channel) {
            let _ = socket.send_to(b"ERROR:INVALID_CHANNEL", sender).await;
            return;
        }
        match state.register(sender, &channel) {
            RegisterOutcome::Registered => {
                let _ = socket.send_to(b"REGISTERED", sender).await;
            }
            RegisterOutcome::ReRegistered => {
                let _ = socket.send_to(b"RE-REGISTERED", sender).await;
            }
            RegisterOutcome::ServerFull => {
                let _ = socket.send_to(b"ERROR:SERVER_FULL", sender).await;
            }
        }
        return;
    }

    if let Some(rest) = strip_prefix(payload, b"AUDIO ") {
        let space = rest.iter().position(|&b| b == b' ').unwrap_or(rest.len());
        let channel = String::from_utf8_lossy(&rest[..space]).to_string();
        if !validate_channel(&channel) {
            return;
        }
        if let Some(targets) = state.audio_targets(sender, &channel) {
            for target in targets {
                let _ = socket.send_to(payload, target).await;
            }
        }
        return;
    }

    debug!(%sender, len = payload.len(), "ignoring unrecognized datagram");
}

fn strip_prefix<'a>(payload: &'a [u8], tag: &[u8]) -> Option<&'a [u8]> {
    payload.strip_prefix(tag)
}
