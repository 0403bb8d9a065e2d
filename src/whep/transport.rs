//! Transport state monitoring
//!
//! Maps the peer connection's raw connectivity states onto the small
//! logical state set the controller reasons about, and forwards each
//! transition as an event on the controller channel.

use super::events::PlayerEvent;
use log::debug;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;

/// Logical transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Created, not yet ready
    New,
    /// Transport is up and media can flow
    Connected,
    /// Transient loss; the transport may self-heal
    Disconnected,
    /// Explicitly closed (terminal)
    Closed,
    /// Unrecoverable failure (terminal)
    Failed,
}

impl From<RTCPeerConnectionState> for TransportState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connected => TransportState::Connected,
            RTCPeerConnectionState::Disconnected => TransportState::Disconnected,
            RTCPeerConnectionState::Closed => TransportState::Closed,
            RTCPeerConnectionState::Failed => TransportState::Failed,
            // New / Connecting / Unspecified are all pre-ready
            _ => TransportState::New,
        }
    }
}

impl TransportState {
    /// True for states the transport cannot leave
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportState::Closed | TransportState::Failed)
    }
}

/// Forwards transport state transitions into the controller channel
pub struct TransportMonitor;

impl TransportMonitor {
    /// Wire state change events from `peer_connection`, tagged with `session`.
    ///
    /// The registered callback only performs a channel send; it never blocks.
    pub fn attach(
        peer_connection: &Arc<RTCPeerConnection>,
        session: u64,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) {
        peer_connection.on_peer_connection_state_change(Box::new(move |state| {
            let logical = TransportState::from(state);
            debug!("Session {} transport state: {} -> {:?}", session, state, logical);
            let _ = events.send(PlayerEvent::Transport {
                session,
                state: logical,
            });
            Box::pin(async {})
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_raw_states_to_logical_states() {
        assert_eq!(
            TransportState::from(RTCPeerConnectionState::New),
            TransportState::New
        );
        assert_eq!(
            TransportState::from(RTCPeerConnectionState::Connecting),
            TransportState::New
        );
        assert_eq!(
            TransportState::from(RTCPeerConnectionState::Connected),
            TransportState::Connected
        );
        assert_eq!(
            TransportState::from(RTCPeerConnectionState::Disconnected),
            TransportState::Disconnected
        );
        assert_eq!(
            TransportState::from(RTCPeerConnectionState::Closed),
            TransportState::Closed
        );
        assert_eq!(
            TransportState::from(RTCPeerConnectionState::Failed),
            TransportState::Failed
        );
    }

    #[test]
    fn only_closed_and_failed_are_terminal() {
        assert!(TransportState::Closed.is_terminal());
        assert!(TransportState::Failed.is_terminal());
        assert!(!TransportState::New.is_terminal());
        assert!(!TransportState::Connected.is_terminal());
        assert!(!TransportState::Disconnected.is_terminal());
    }
}
