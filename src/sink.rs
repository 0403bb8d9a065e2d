//! Media sink
//!
//! Consumes the RTP tracks a negotiated session delivers. The probe
//! sink does not decode; it watches packet arrival timing and reports
//! flow and stall transitions back to the controller.

use crate::whep::SinkEvents;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use webrtc::track::track_remote::TrackRemote;

/// Destination for incoming media tracks
pub trait MediaSink: Send + Sync {
    /// Take ownership of a remote track. Implementations spawn their own
    /// read task and must not block the caller.
    fn attach_stream(&self, track: Arc<TrackRemote>, events: SinkEvents);
}

/// Sink that drains RTP packets and derives flow state from their timing.
///
/// A packet after silence reports `first_frame`; silence longer than
/// `stall_timeout` reports `stream_emptied`, once per stall.
pub struct PacketProbeSink {
    stall_timeout: Duration,
}

impl PacketProbeSink {
    pub fn new(stall_timeout: Duration) -> Self {
        Self { stall_timeout }
    }
}

impl MediaSink for PacketProbeSink {
    fn attach_stream(&self, track: Arc<TrackRemote>, events: SinkEvents) {
        let stall_timeout = self.stall_timeout;
        tokio::spawn(async move {
            info!("Reading {} track {}", track.kind(), track.id());
            let mut flowing = false;
            let mut stall_reported = false;
            let mut packets: u64 = 0;
            loop {
                match tokio::time::timeout(stall_timeout, track.read_rtp()).await {
                    Ok(Ok((_packet, _))) => {
                        packets += 1;
                        stall_reported = false;
                        if !flowing {
                            flowing = true;
                            events.first_frame();
                        }
                    }
                    Ok(Err(e)) => {
                        let text = e.to_string().to_ascii_lowercase();
                        if text.contains("eof") || text.contains("closed") {
                            debug!("Track {} ended after {} packets", track.id(), packets);
                        } else {
                            warn!(
                                "Track {} read error after {} packets: {}",
                                track.id(),
                                packets,
                                e
                            );
                        }
                        break;
                    }
                    Err(_) => {
                        if !stall_reported {
                            stall_reported = true;
                            flowing = false;
                            warn!(
                                "Track {} silent for {:?} ({} packets so far)",
                                track.id(),
                                stall_timeout,
                                packets
                            );
                            events.stream_emptied();
                        }
                    }
                }
            }
        });
    }
}
