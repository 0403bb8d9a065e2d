//! Connection lifecycle controller
//!
//! Single owner of the player state machine. All asynchronous sources
//! (negotiation tasks, transport callbacks, the media sink, the retry
//! timer) funnel into one event pump, so every transition happens under
//! one lock and in one place. Each play attempt gets a fresh session
//! epoch; events tagged with an older epoch are discarded on arrival.

use super::events::PlayerEvent;
use super::negotiation::{Negotiator, PeerHandle};
use super::retry::RetryPolicy;
use super::signaling::StreamTarget;
use super::transport::TransportState;
use super::WhepError;
use crate::sink::MediaSink;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Lifecycle state of the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// Created, no play request yet
    Idle,
    /// Negotiation in progress
    Connecting,
    /// Media is flowing
    Active,
    /// Frames stopped arriving on a live transport
    Stalled,
    /// A reconnect is scheduled
    Reconnecting,
    /// Playback ended, by request or by giving up
    Stopped,
}

/// Severity of a user-facing status message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// User-facing status update
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub message: String,
    pub severity: Severity,
}

/// One play attempt, identified by its epoch
struct Session {
    id: u64,
    target: StreamTarget,
    peer: Option<Arc<dyn PeerHandle>>,
    /// Frames flowed on this session while the transport was healthy.
    /// Sticky: set on first frame, cleared only when the transport
    /// degrades. A stall with this flag set is terminal, not retried.
    media_started: bool,
    transport: TransportState,
    /// The transport reached Connected at least once
    was_connected: bool,
}

impl Session {
    fn new(id: u64, target: StreamTarget) -> Self {
        Self {
            id,
            target,
            peer: None,
            media_started: false,
            transport: TransportState::New,
            was_connected: false,
        }
    }
}

struct Inner {
    state: PlayerState,
    session: Option<Session>,
    /// Play attempts since the last explicit stop
    attempts: u32,
    next_session_id: u64,
    retry_timer: Option<JoinHandle<()>>,
}

impl Inner {
    fn set_state(&mut self, state: PlayerState) {
        if self.state != state {
            debug!("Player state: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn cancel_retry(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }
}

struct Core {
    inner: Mutex<Inner>,
    status_tx: broadcast::Sender<StatusEvent>,
    events_tx: mpsc::UnboundedSender<PlayerEvent>,
    negotiator: Arc<dyn Negotiator>,
    sink: Arc<dyn MediaSink>,
    retry: RetryPolicy,
}

impl Core {
    fn publish(&self, message: impl Into<String>, severity: Severity) {
        let event = StatusEvent {
            message: message.into(),
            severity,
        };
        debug!("Status [{:?}]: {}", event.severity, event.message);
        let _ = self.status_tx.send(event);
    }

    fn arm_retry(&self, inner: &mut Inner, session_id: u64, delay: Duration) {
        inner.cancel_retry();
        let events = self.events_tx.clone();
        inner.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(PlayerEvent::RetryTimer {
                session: session_id,
            });
        }));
    }

    /// Begin a new play attempt for `target`.
    ///
    /// Tears down any previous session, bumps the epoch, and kicks off
    /// negotiation in the background. Completion arrives as a
    /// [`PlayerEvent::Negotiated`] on the pump.
    fn start(core: &Arc<Core>, target: StreamTarget) -> Result<(), WhepError> {
        if target.stream_path.trim().is_empty() {
            core.publish("Please enter a stream path", Severity::Error);
            return Err(WhepError::Validation("stream path is empty".to_string()));
        }

        let (session_id, attempt, old_peer) = {
            let mut guard = core.inner.lock();
            let inner = &mut *guard;
            inner.cancel_retry();
            let old_peer = inner.session.take().and_then(|s| s.peer);
            inner.attempts += 1;
            inner.next_session_id += 1;
            let session_id = inner.next_session_id;
            inner.session = Some(Session::new(session_id, target.clone()));
            inner.set_state(PlayerState::Connecting);
            (session_id, inner.attempts, old_peer)
        };

        info!(
            "Connecting to stream '{}' (session {}, attempt {})",
            target.stream_path, session_id, attempt
        );
        core.publish("Connecting to stream...", Severity::Info);

        let core = Arc::clone(core);
        tokio::spawn(async move {
            // Release the previous transport before opening a new one
            if let Some(peer) = old_peer {
                peer.close().await;
            }
            let result = core
                .negotiator
                .negotiate(
                    &target,
                    session_id,
                    core.events_tx.clone(),
                    Arc::clone(&core.sink),
                )
                .await;
            let _ = core.events_tx.send(PlayerEvent::Negotiated {
                session: session_id,
                result,
            });
        });

        Ok(())
    }

    async fn pump(core: Arc<Core>, mut events: mpsc::UnboundedReceiver<PlayerEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                PlayerEvent::Negotiated { session, result } => {
                    Core::on_negotiated(&core, session, result).await;
                }
                PlayerEvent::Transport { session, state } => {
                    Core::on_transport(&core, session, state).await;
                }
                PlayerEvent::FirstFrame { session } => {
                    Core::on_first_frame(&core, session);
                }
                PlayerEvent::StreamEmptied { session } => {
                    Core::on_stream_emptied(&core, session).await;
                }
                PlayerEvent::RetryTimer { session } => {
                    Core::on_retry_timer(&core, session);
                }
            }
        }
    }

    async fn on_negotiated(
        core: &Arc<Core>,
        session_id: u64,
        result: Result<Arc<dyn PeerHandle>, WhepError>,
    ) {
        let orphan;
        {
            let mut guard = core.inner.lock();
            let inner = &mut *guard;
            let is_current = inner.session.as_ref().map(|s| s.id) == Some(session_id);
            if is_current {
                match result {
                    Ok(peer) => {
                        if let Some(session) = inner.session.as_mut() {
                            session.peer = Some(peer);
                        }
                        drop(guard);
                        core.publish("Connected to server", Severity::Success);
                    }
                    Err(e) => {
                        error!("Session {} negotiation failed: {}", session_id, e);
                        inner.session = None;
                        inner.set_state(PlayerState::Stopped);
                        drop(guard);
                        core.publish(format!("Connection failed: {}", e), Severity::Error);
                    }
                }
                return;
            }
            orphan = result.ok();
        }
        // The attempt was superseded or stopped while negotiating
        if let Some(peer) = orphan {
            debug!("Closing orphaned connection from session {}", session_id);
            peer.close().await;
        }
    }

    async fn on_transport(core: &Arc<Core>, session_id: u64, state: TransportState) {
        let peer_to_close;
        {
            let mut guard = core.inner.lock();
            let inner = &mut *guard;
            let session = match inner.session.as_mut() {
                Some(s) if s.id == session_id => s,
                _ => {
                    debug!(
                        "Discarding {:?} transport event for stale session {}",
                        state, session_id
                    );
                    return;
                }
            };
            session.transport = state;

            match state {
                TransportState::New => return,
                TransportState::Connected => {
                    session.was_connected = true;
                    drop(guard);
                    core.publish("Loading stream...", Severity::Info);
                    return;
                }
                TransportState::Disconnected => {
                    // Transient; ICE may recover without our involvement
                    session.media_started = false;
                    drop(guard);
                    core.publish("Disconnected from server", Severity::Warning);
                    return;
                }
                TransportState::Closed => {
                    warn!("Session {}: {}", session_id, WhepError::TransportClosed);
                    peer_to_close = inner.session.take().and_then(|s| s.peer);
                    inner.cancel_retry();
                    inner.set_state(PlayerState::Stopped);
                    drop(guard);
                    core.publish("Connection closed", Severity::Warning);
                }
                TransportState::Failed => {
                    error!("Session {}: {}", session_id, WhepError::TransportFailed);
                    peer_to_close = inner.session.take().and_then(|s| s.peer);
                    inner.cancel_retry();
                    inner.set_state(PlayerState::Stopped);
                    drop(guard);
                    core.publish("Connection failed", Severity::Error);
                }
            }
        }
        if let Some(peer) = peer_to_close {
            peer.close().await;
        }
    }

    fn on_first_frame(core: &Arc<Core>, session_id: u64) {
        let mut guard = core.inner.lock();
        let inner = &mut *guard;
        match inner.session.as_mut() {
            Some(s) if s.id == session_id => {
                // Frames cannot precede the transport coming up
                if !s.was_connected {
                    debug!(
                        "Ignoring first frame before transport connect for session {}",
                        session_id
                    );
                    return;
                }
                s.media_started = true;
            }
            _ => return,
        }
        if inner.state != PlayerState::Active {
            // Frames arriving settle any pending reconnect
            inner.cancel_retry();
            inner.set_state(PlayerState::Active);
            drop(guard);
            core.publish("Stream started", Severity::Success);
        }
    }

    async fn on_stream_emptied(core: &Arc<Core>, session_id: u64) {
        let peer_to_close;
        {
            let mut guard = core.inner.lock();
            let inner = &mut *guard;
            let transport;
            let media_started;
            match inner.session.as_ref() {
                Some(s) if s.id == session_id => {
                    transport = s.transport;
                    media_started = s.media_started;
                }
                _ => return,
            }
            // A stall on a dead or dying transport is the transport
            // path's problem
            if transport != TransportState::Connected {
                return;
            }
            if inner.state == PlayerState::Reconnecting {
                return;
            }

            inner.set_state(PlayerState::Stalled);
            warn!(
                "Session {} stream emptied (attempt {}, media started: {})",
                session_id, inner.attempts, media_started
            );

            let decision = core.retry.decide(inner.attempts, media_started, transport);
            if decision.should_retry {
                inner.set_state(PlayerState::Reconnecting);
                core.arm_retry(inner, session_id, decision.delay);
                drop(guard);
                core.publish("Reconnecting...", Severity::Warning);
                return;
            }

            peer_to_close = inner.session.take().and_then(|s| s.peer);
            inner.set_state(PlayerState::Stopped);
            drop(guard);
            core.publish("Disconnected from server", Severity::Warning);
        }
        if let Some(peer) = peer_to_close {
            peer.close().await;
        }
    }

    fn on_retry_timer(core: &Arc<Core>, session_id: u64) {
        let target = {
            let mut guard = core.inner.lock();
            let inner = &mut *guard;
            inner.retry_timer = None;
            if inner.state != PlayerState::Reconnecting {
                return;
            }
            match inner.session.as_ref() {
                Some(s) if s.id == session_id => s.target.clone(),
                _ => return,
            }
        };
        info!("Retry delay elapsed for session {}", session_id);
        if let Err(e) = Core::start(core, target) {
            error!("Reconnect failed to start: {}", e);
        }
    }
}

/// WHEP playback client
///
/// Thin handle over the shared controller core. `start` is cheap and
/// synchronous; everything slow happens on background tasks and is
/// reported through [`subscribe_status`](WhepPlayer::subscribe_status).
pub struct WhepPlayer {
    core: Arc<Core>,
    pump: JoinHandle<()>,
}

impl WhepPlayer {
    pub fn new(
        negotiator: Arc<dyn Negotiator>,
        sink: Arc<dyn MediaSink>,
        retry: RetryPolicy,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = broadcast::channel(64);
        let core = Arc::new(Core {
            inner: Mutex::new(Inner {
                state: PlayerState::Idle,
                session: None,
                attempts: 0,
                next_session_id: 0,
                retry_timer: None,
            }),
            status_tx,
            events_tx,
            negotiator,
            sink,
            retry,
        });
        let pump = tokio::spawn(Core::pump(Arc::clone(&core), events_rx));
        Self { core, pump }
    }

    /// Begin playback of `target`.
    ///
    /// Replaces any session already in flight. Fails only on invalid
    /// input; network and transport failures surface as status events.
    pub fn start(&self, target: StreamTarget) -> Result<(), WhepError> {
        Core::start(&self.core, target)
    }

    /// Stop playback and release the transport. Safe to call repeatedly.
    pub async fn stop(&self) {
        let (peer, was_running) = {
            let mut guard = self.core.inner.lock();
            let inner = &mut *guard;
            inner.cancel_retry();
            let peer = inner.session.take().and_then(|s| s.peer);
            inner.attempts = 0;
            let was_running = !matches!(inner.state, PlayerState::Idle | PlayerState::Stopped);
            if was_running {
                inner.set_state(PlayerState::Stopped);
            }
            (peer, was_running)
        };
        if let Some(peer) = peer {
            peer.close().await;
        }
        if was_running {
            info!("Playback stopped");
            self.core.publish("Ready to connect", Severity::Info);
        }
    }

    pub fn state(&self) -> PlayerState {
        self.core.inner.lock().state
    }

    /// Play attempts since the last explicit stop
    pub fn attempt_number(&self) -> u32 {
        self.core.inner.lock().attempts
    }

    /// Subscribe to user-facing status updates
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.core.status_tx.subscribe()
    }

    #[cfg(test)]
    fn retry_armed(&self) -> bool {
        self.core.inner.lock().retry_timer.is_some()
    }
}

impl Drop for WhepPlayer {
    fn drop(&mut self) {
        // Callers should stop() first; dropping only reclaims our tasks,
        // not an open transport
        self.pump.abort();
        self.core.inner.lock().cancel_retry();
    }
}
