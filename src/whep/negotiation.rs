//! Peer connection negotiation
//!
//! Owns one offer/answer exchange: build the peer connection, declare a
//! bidirectional video transceiver, push the local offer through the
//! signaling client, and apply the remote answer. A failed step never
//! leaves a half-open connection behind.

use super::events::{PlayerEvent, SinkEvents};
use super::signaling::{SignalingClient, StreamTarget};
use super::transport::TransportMonitor;
use super::WhepError;
use crate::config::IceServerConfig;
use crate::sink::MediaSink;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

/// Upper bound on waiting for ICE candidate gathering before the offer
/// is posted
const ICE_GATHER_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to a live transport connection
#[async_trait]
pub trait PeerHandle: Send + Sync {
    /// Close the underlying connection, releasing its resources
    async fn close(&self);
}

#[async_trait]
impl PeerHandle for RTCPeerConnection {
    async fn close(&self) {
        if let Err(e) = RTCPeerConnection::close(self).await {
            warn!("Failed to close peer connection: {}", e);
        }
    }
}

/// Negotiation seam: the controller depends on this, not on the WebRTC
/// engine directly
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Run one full offer/answer exchange for the tagged session.
    ///
    /// Transport state changes and incoming media are reported through
    /// `events` and `sink`; the returned handle owns the connection.
    /// Callers must serialize attempts: a second call before the prior
    /// handle is released is undefined.
    async fn negotiate(
        &self,
        target: &StreamTarget,
        session: u64,
        events: mpsc::UnboundedSender<PlayerEvent>,
        sink: Arc<dyn MediaSink>,
    ) -> Result<Arc<dyn PeerHandle>, WhepError>;
}

/// Production negotiation engine backed by the webrtc crate
pub struct NegotiationEngine {
    signaling: SignalingClient,
    ice_servers: Vec<IceServerConfig>,
}

impl NegotiationEngine {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self {
            signaling: SignalingClient::new(),
            ice_servers,
        }
    }

    async fn create_peer_connection(&self) -> Result<Arc<RTCPeerConnection>, WhepError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| WhepError::Negotiation(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(|e| {
            WhepError::Negotiation(format!("Failed to register interceptors: {}", e))
        })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let peer_connection = api
            .new_peer_connection(RTCConfiguration {
                ice_servers: self.rtc_ice_servers(),
                ..Default::default()
            })
            .await
            .map_err(|e| {
                WhepError::Negotiation(format!("Failed to create peer connection: {}", e))
            })?;

        Ok(Arc::new(peer_connection))
    }

    fn rtc_ice_servers(&self) -> Vec<RTCIceServer> {
        self.ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect()
    }

    async fn exchange(
        &self,
        peer_connection: &Arc<RTCPeerConnection>,
        target: &StreamTarget,
    ) -> Result<(), WhepError> {
        // The offer must request receive capability even though this client
        // only consumes media.
        let init = RTCRtpTransceiverInit {
            direction: RTCRtpTransceiverDirection::Sendrecv,
            send_encodings: Vec::new(),
        };
        peer_connection
            .add_transceiver_from_kind(RTPCodecType::Video, Some(init))
            .await
            .map_err(|e| {
                WhepError::Negotiation(format!("Failed to add video transceiver: {}", e))
            })?;

        // Signal ICE gathering completion so the offer can carry the
        // gathered candidates
        let ice_complete = Arc::new(Notify::new());
        let ice_complete_tx = Arc::clone(&ice_complete);
        peer_connection.on_ice_gathering_state_change(Box::new(move |state| {
            if state == RTCIceGathererState::Complete {
                ice_complete_tx.notify_one();
            }
            Box::pin(async {})
        }));

        let offer = peer_connection
            .create_offer(None)
            .await
            .map_err(|e| WhepError::Negotiation(format!("Failed to create offer: {}", e)))?;
        peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| {
                WhepError::Negotiation(format!("Failed to set local description: {}", e))
            })?;

        // Bounded wait; a slow TURN server must not hang negotiation
        tokio::select! {
            _ = ice_complete.notified() => {}
            _ = tokio::time::sleep(ICE_GATHER_TIMEOUT) => {
                debug!("ICE gathering timed out, posting partial candidates");
            }
        }

        let local = peer_connection
            .local_description()
            .await
            .ok_or_else(|| WhepError::Negotiation("No local description available".to_string()))?;

        let answer_sdp = self.signaling.negotiate(target, &local.sdp).await?;

        let answer = RTCSessionDescription::answer(answer_sdp)
            .map_err(|e| WhepError::Negotiation(format!("Invalid answer SDP: {}", e)))?;
        peer_connection
            .set_remote_description(answer)
            .await
            .map_err(|e| {
                WhepError::Negotiation(format!("Failed to set remote description: {}", e))
            })?;

        debug!("Negotiation complete for {}", target.stream_path);
        Ok(())
    }
}

#[async_trait]
impl Negotiator for NegotiationEngine {
    async fn negotiate(
        &self,
        target: &StreamTarget,
        session: u64,
        events: mpsc::UnboundedSender<PlayerEvent>,
        sink: Arc<dyn MediaSink>,
    ) -> Result<Arc<dyn PeerHandle>, WhepError> {
        let peer_connection = self.create_peer_connection().await?;

        TransportMonitor::attach(&peer_connection, session, events.clone());

        // Incoming tracks go straight to the media sink, independent of how
        // the rest of the negotiation turns out.
        let sink_events = SinkEvents::new(session, events);
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            info!(
                "Session {} incoming {} track: {}",
                session,
                track.kind(),
                track.id()
            );
            sink.attach_stream(track, sink_events.clone());
            Box::pin(async {})
        }));

        if let Err(e) = self.exchange(&peer_connection, target).await {
            PeerHandle::close(peer_connection.as_ref()).await;
            return Err(e);
        }

        Ok(peer_connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offer_requests_bidirectional_video() {
        let engine = NegotiationEngine::new(Vec::new());
        let peer_connection = engine.create_peer_connection().await.unwrap();

        let init = RTCRtpTransceiverInit {
            direction: RTCRtpTransceiverDirection::Sendrecv,
            send_encodings: Vec::new(),
        };
        peer_connection
            .add_transceiver_from_kind(RTPCodecType::Video, Some(init))
            .await
            .unwrap();

        let offer = peer_connection.create_offer(None).await.unwrap();
        assert!(offer.sdp.contains("m=video"));
        assert!(offer.sdp.contains("a=sendrecv"));

        let _ = RTCPeerConnection::close(&peer_connection).await;
    }

    #[tokio::test]
    async fn local_description_available_after_offer() {
        let engine = NegotiationEngine::new(Vec::new());
        let peer_connection = engine.create_peer_connection().await.unwrap();

        let init = RTCRtpTransceiverInit {
            direction: RTCRtpTransceiverDirection::Sendrecv,
            send_encodings: Vec::new(),
        };
        peer_connection
            .add_transceiver_from_kind(RTPCodecType::Video, Some(init))
            .await
            .unwrap();
        let offer = peer_connection.create_offer(None).await.unwrap();
        peer_connection.set_local_description(offer).await.unwrap();

        // This is the description the signaling exchange posts
        let local = peer_connection.local_description().await.unwrap();
        assert!(local.sdp.contains("m=video"));

        let _ = RTCPeerConnection::close(&peer_connection).await;
    }

    #[test]
    fn ice_servers_are_forwarded() {
        let engine = NegotiationEngine::new(vec![IceServerConfig {
            urls: vec!["turn:turn.example.com:3478".to_string()],
            username: Some("user".to_string()),
            credential: Some("secret".to_string()),
        }]);
        let servers = engine.rtc_ice_servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls[0], "turn:turn.example.com:3478");
        assert_eq!(servers[0].username, "user");
        assert_eq!(servers[0].credential, "secret");
    }
}
