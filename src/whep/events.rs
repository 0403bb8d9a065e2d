//! Controller event plumbing
//!
//! Every asynchronous source (negotiation completion, transport state
//! changes, media sink callbacks, the retry timer) reports through one
//! channel, tagged with the epoch of the session it belongs to. The
//! controller discards events whose epoch is no longer current, so late
//! callbacks from a torn-down session can never touch its successor.

use super::negotiation::PeerHandle;
use super::transport::TransportState;
use super::WhepError;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Event delivered to the controller's pump task
pub enum PlayerEvent {
    /// Negotiation finished for the tagged session
    Negotiated {
        session: u64,
        result: Result<Arc<dyn PeerHandle>, WhepError>,
    },
    /// Transport state transition
    Transport {
        session: u64,
        state: TransportState,
    },
    /// The media sink observed the first frames
    FirstFrame { session: u64 },
    /// The media sink stopped receiving frames
    StreamEmptied { session: u64 },
    /// A scheduled reconnect delay elapsed
    RetryTimer { session: u64 },
}

/// Epoch-tagged callback handle handed to the media sink
#[derive(Clone)]
pub struct SinkEvents {
    session: u64,
    events: mpsc::UnboundedSender<PlayerEvent>,
}

impl SinkEvents {
    pub(crate) fn new(session: u64, events: mpsc::UnboundedSender<PlayerEvent>) -> Self {
        Self { session, events }
    }

    /// Presentation actually began
    pub fn first_frame(&self) {
        let _ = self.events.send(PlayerEvent::FirstFrame {
            session: self.session,
        });
    }

    /// Presentation stopped receiving frames
    pub fn stream_emptied(&self) {
        let _ = self.events.send(PlayerEvent::StreamEmptied {
            session: self.session,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_events_carry_their_session_tag() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = SinkEvents::new(7, tx);

        events.first_frame();
        match rx.try_recv() {
            Ok(PlayerEvent::FirstFrame { session }) => assert_eq!(session, 7),
            _ => panic!("Expected FirstFrame"),
        }

        events.stream_emptied();
        match rx.try_recv() {
            Ok(PlayerEvent::StreamEmptied { session }) => assert_eq!(session, 7),
            _ => panic!("Expected StreamEmptied"),
        }
    }
}
