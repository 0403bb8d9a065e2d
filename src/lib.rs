//! whep-player - WHEP playback client
//!
//! Pulls a WebRTC stream from a WHEP (WebRTC-HTTP Egress Protocol)
//! server and supervises the connection: negotiation, transport health,
//! and bounded stall-triggered reconnects.

pub mod args;
pub mod config;
pub mod sink;
pub mod whep;

// Re-exports
pub use config::Config;
pub use sink::{MediaSink, PacketProbeSink};
pub use whep::{
    NegotiationEngine, PlayerState, RetryPolicy, Severity, StatusEvent, StreamTarget, WhepError,
    WhepPlayer,
};
