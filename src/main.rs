//! whep-player - Main entry point
//!
//! Connects to a WHEP stream, logs status transitions, and keeps the
//! session alive until Ctrl-C.

use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use whep_player::args::Args;
use whep_player::whep::{NegotiationEngine, Severity, WhepPlayer};
use whep_player::PacketProbeSink;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();
    let config = args.load_config()?;

    // Initialize logging with noise filtering for third-party WebRTC crates
    env_logger::Builder::new()
        .parse_filters(
            &std::env::var("WHEP_PLAYER_LOG").unwrap_or_else(|_| config.logging.level.clone()),
        )
        .filter_module("webrtc_ice", log::LevelFilter::Error)
        .filter_module("webrtc_dtls", log::LevelFilter::Error)
        .filter_module("webrtc_mdns", log::LevelFilter::Error)
        .init();

    info!("whep-player v{}", env!("CARGO_PKG_VERSION"));

    if config.target.stream_path.trim().is_empty() {
        return Err(
            "No stream path given (pass one as an argument or set target.stream_path)".into(),
        );
    }

    let sink = Arc::new(PacketProbeSink::new(config.stall_timeout()));
    let negotiator = Arc::new(NegotiationEngine::new(config.webrtc.ice_servers.clone()));
    let player = WhepPlayer::new(negotiator, sink, config.retry_policy());

    // Mirror status updates into the log
    let mut status = player.subscribe_status();
    tokio::spawn(async move {
        loop {
            match status.recv().await {
                Ok(event) => match event.severity {
                    Severity::Error => error!("{}", event.message),
                    Severity::Warning => warn!("{}", event.message),
                    _ => info!("{}", event.message),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Dropped {} status updates", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    player.start(config.target())?;

    signal::ctrl_c().await?;
    info!("Shutting down...");
    player.stop().await;

    Ok(())
}
