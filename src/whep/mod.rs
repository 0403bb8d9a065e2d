//! WHEP playback core
//!
//! Implements the client side of WHEP (WebRTC-HTTP Egress Protocol):
//! - HTTP offer/answer signaling
//! - Peer connection negotiation
//! - Transport state monitoring
//! - Bounded, stall-triggered reconnection

pub mod controller;
pub mod events;
pub mod negotiation;
pub mod retry;
pub mod signaling;
pub mod transport;

pub use controller::{PlayerState, Severity, StatusEvent, WhepPlayer};
pub use events::{PlayerEvent, SinkEvents};
pub use negotiation::{NegotiationEngine, Negotiator, PeerHandle};
pub use retry::{RetryDecision, RetryPolicy};
pub use signaling::{SignalingClient, StreamTarget};
pub use transport::{TransportMonitor, TransportState};

use std::error::Error;
use std::fmt;

/// WHEP client errors
#[derive(Debug, Clone)]
pub enum WhepError {
    /// Invalid caller input (e.g. empty stream path), rejected before any
    /// network or transport action
    Validation(String),
    /// HTTP offer/answer exchange failed
    Signaling {
        status: Option<u16>,
        message: String,
    },
    /// Offer creation or description exchange failed
    Negotiation(String),
    /// Transport reported an unrecoverable failure
    TransportFailed,
    /// Transport was closed
    TransportClosed,
}

impl fmt::Display for WhepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhepError::Validation(msg) => write!(f, "Invalid input: {}", msg),
            WhepError::Signaling {
                status: Some(status),
                message,
            } => write!(f, "Signaling failed (HTTP {}): {}", status, message),
            WhepError::Signaling {
                status: None,
                message,
            } => write!(f, "Signaling failed: {}", message),
            WhepError::Negotiation(msg) => write!(f, "Negotiation failed: {}", msg),
            WhepError::TransportFailed => write!(f, "Transport failed"),
            WhepError::TransportClosed => write!(f, "Transport closed"),
        }
    }
}

impl Error for WhepError {}
