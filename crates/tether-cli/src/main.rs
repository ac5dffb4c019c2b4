//! # Tether diagnostic client
//!
//! Connects to a socket endpoint, wires the built-in schemas to log lines,
//! and prints every engine event until the connection closes.
//!
//! ## Usage
//!
//! ```bash
//! # Connect to a URL
//! tether ws://127.0.0.1:8080/socket
//!
//! # Or load a config file
//! tether --config tether.toml
//!
//! # Or take the URL from the environment
//! TETHER_URL=ws://host/socket tether
//! ```

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tether_client::{Routes, Socket, SocketConfig, SocketEvent, SocketState};
use tether_protocol::messages::{AckReply, ChatMessage, Goodbye, Hello, Ping, PresenceChange, UserTyping};
use tether_protocol::RouteRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;
    tracing::info!(url = %config.url, "connecting");

    let routes = Routes::new()
        .on::<Hello, _>(|_| tracing::info!("server said hello"))
        .on::<ChatMessage, _>(|m| {
            tracing::info!(channel = %m.channel, user = ?m.user, "{}", m.text);
        })
        .on::<PresenceChange, _>(|p| {
            tracing::info!(user = %p.user, presence = %p.presence, "presence changed");
        })
        .on::<UserTyping, _>(|t| tracing::debug!(channel = %t.channel, "someone is typing"))
        .on::<Goodbye, _>(|_| tracing::warn!("server is going away"));

    let (socket, mut events) = Socket::connect(config, routes, RouteRegistry::standard()).await;

    if socket.state() == SocketState::Open {
        socket.send_with_reply::<_, AckReply, _>(&Ping::default(), |reply| match reply.error {
            Some(error) => tracing::warn!(code = error.code, "ping failed: {}", error.msg),
            None => tracing::info!(ok = reply.ok, "ping acknowledged"),
        })?;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SocketEvent::ReceiveError(e)) => tracing::error!("transport error: {e}"),
                Some(SocketEvent::DeserializationError(e)) => {
                    tracing::warn!("dropped undecodable frame: {e}");
                }
                Some(SocketEvent::HandlingError(e)) => tracing::warn!("handling error: {e}"),
                Some(SocketEvent::Closed) | None => {
                    tracing::info!("connection closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, closing");
                socket.close().await;
            }
        }
    }

    Ok(())
}

fn load_config() -> Result<SocketConfig> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("--config") => {
            let path = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
            Ok(SocketConfig::load(path)?)
        }
        Some(url) => Ok(SocketConfig::new(url)),
        None => Ok(SocketConfig::default()),
    }
}
