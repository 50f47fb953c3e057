//! Peer-to-peer transport negotiation and the control-channel link.
//!
//! Transport callbacks never touch session state directly. Everything they
//! observe is pushed as an [`EngineEvent`] into one queue consumed by the
//! session's dispatch loop, which keeps delivery ordered and the
//! track-before-answer race an explicit interleaving.

use crate::credentials::SessionCredential;
use crate::error::SessionError;
use crate::media::{AudioSink, AudioSource, LocalAudio};
use crate::signaling::SignalingClient;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use voicelink_wire::ClientEvent;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Label of the data channel carrying protocol events.
const CONTROL_CHANNEL_LABEL: &str = "oai-events";

/// Capacity of the inbound event queue.
pub(crate) const EVENT_QUEUE_CAPACITY: usize = 128;

/// A transport-level occurrence, delivered to the session's dispatch loop.
#[derive(Debug)]
pub enum EngineEvent {
    /// The control channel is open; configuration may now be sent.
    ChannelOpen,
    /// A raw JSON message arrived on the control channel.
    ChannelMessage(String),
    /// The remote audio track arrived and was attached to playback.
    RemoteMediaLive,
    /// The transport failed underneath an established session.
    TransportFault(String),
}

/// Builds the media session and control channel for one session attempt.
#[async_trait]
pub trait MediaConnector: Send + Sync {
    async fn connect(
        &self,
        credential: SessionCredential,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<Arc<dyn ControlLink>, SessionError>;
}

/// Handle to an established transport: outbound control-channel sends plus
/// teardown. `close` is idempotent and callable from any state.
#[async_trait]
pub trait ControlLink: Send + Sync {
    async fn send_event(&self, event: &ClientEvent) -> Result<(), SessionError>;
    async fn close(&self);
}

/// The production connector: a WebRTC peer connection negotiated against the
/// remote realtime endpoint via an SDP offer/answer exchange.
pub struct WebRtcConnector {
    signaling: Arc<dyn SignalingClient>,
    source: Arc<dyn AudioSource>,
    sink: Arc<dyn AudioSink>,
}

impl WebRtcConnector {
    pub fn new(
        signaling: Arc<dyn SignalingClient>,
        source: Arc<dyn AudioSource>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self {
            signaling,
            source,
            sink,
        }
    }

    async fn negotiate(
        &self,
        peer: &Arc<RTCPeerConnection>,
        local: &LocalAudio,
        credential: &SessionCredential,
        events: &mpsc::Sender<EngineEvent>,
        closing: &Arc<AtomicBool>,
    ) -> Result<Arc<RTCDataChannel>, SessionError> {
        // The channel must exist before the offer so it is described in it.
        let channel = peer.create_data_channel(CONTROL_CHANNEL_LABEL, None).await?;

        let tx = events.clone();
        channel.on_open(Box::new(move || {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(EngineEvent::ChannelOpen).await;
            })
        }));

        let tx = events.clone();
        channel.on_message(Box::new(move |message: DataChannelMessage| {
            let tx = tx.clone();
            Box::pin(async move {
                if !message.is_string {
                    warn!("ignoring binary control-channel message");
                    return;
                }
                match String::from_utf8(message.data.to_vec()) {
                    Ok(text) => {
                        let _ = tx.send(EngineEvent::ChannelMessage(text)).await;
                    }
                    Err(err) => warn!(error = %err, "control-channel message was not UTF-8"),
                }
            })
        }));

        // The remote track can arrive before or after the answer is applied;
        // the attach guard makes a second arrival a no-op.
        let attached = Arc::new(AtomicBool::new(false));
        let sink = Arc::clone(&self.sink);
        let tx = events.clone();
        peer.on_track(Box::new(move |track, _receiver, _transceiver| {
            let attached = Arc::clone(&attached);
            let sink = Arc::clone(&sink);
            let tx = tx.clone();
            Box::pin(async move {
                if attached.swap(true, Ordering::SeqCst) {
                    debug!("remote track already attached; ignoring duplicate");
                    return;
                }
                info!("remote audio track arrived");
                sink.attach(track).await;
                let _ = tx.send(EngineEvent::RemoteMediaLive).await;
            })
        }));

        let tx = events.clone();
        let fault_guard = Arc::clone(closing);
        peer.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let tx = tx.clone();
            let fault_guard = Arc::clone(&fault_guard);
            Box::pin(async move {
                match state {
                    RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed => {
                        if !fault_guard.load(Ordering::SeqCst) {
                            let _ = tx
                                .send(EngineEvent::TransportFault(format!(
                                    "peer connection {state}"
                                )))
                                .await;
                        }
                    }
                    RTCPeerConnectionState::Disconnected => {
                        warn!("peer connection disconnected");
                    }
                    _ => {}
                }
            })
        }));

        let _ = peer.add_track(local.track()).await?;

        let offer = peer.create_offer(None).await?;
        let mut gathered = peer.gathering_complete_promise().await;
        peer.set_local_description(offer).await?;
        let _ = gathered.recv().await;

        let offer_sdp = peer
            .local_description()
            .await
            .ok_or_else(|| {
                SessionError::Transport("local description missing after gathering".into())
            })?
            .sdp;

        let answer_sdp = self.signaling.exchange(&offer_sdp, credential).await?;
        let answer = RTCSessionDescription::answer(answer_sdp)
            .map_err(|err| SessionError::Signaling(format!("malformed answer: {err}")))?;
        peer.set_remote_description(answer).await?;

        info!("media session negotiated");
        Ok(channel)
    }
}

#[async_trait]
impl MediaConnector for WebRtcConnector {
    async fn connect(
        &self,
        credential: SessionCredential,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<Arc<dyn ControlLink>, SessionError> {
        // Microphone first: its failure mode is the one the user can act on,
        // and nothing else is worth building without it.
        let mut local = self.source.open().await?;

        let peer = new_peer_connection().await?;
        let closing = Arc::new(AtomicBool::new(false));
        match self
            .negotiate(&peer, &local, &credential, &events, &closing)
            .await
        {
            Ok(channel) => Ok(Arc::new(WebRtcLink {
                peer,
                channel,
                local: Mutex::new(Some(local)),
                sink: Arc::clone(&self.sink),
                closing,
            })),
            Err(err) => {
                local.stop();
                if let Err(close_err) = peer.close().await {
                    debug!(error = %close_err, "peer connection close after failed negotiation");
                }
                Err(err)
            }
        }
    }
}

async fn new_peer_connection() -> Result<Arc<RTCPeerConnection>, SessionError> {
    let mut media = MediaEngine::default();
    media.register_default_codecs()?;
    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media)
        .map_err(|err| SessionError::Transport(err.to_string()))?;
    let api = APIBuilder::new()
        .with_media_engine(media)
        .with_interceptor_registry(registry)
        .build();
    let peer = api.new_peer_connection(RTCConfiguration::default()).await?;
    Ok(Arc::new(peer))
}

struct WebRtcLink {
    peer: Arc<RTCPeerConnection>,
    channel: Arc<RTCDataChannel>,
    local: Mutex<Option<LocalAudio>>,
    sink: Arc<dyn AudioSink>,
    closing: Arc<AtomicBool>,
}

#[async_trait]
impl ControlLink for WebRtcLink {
    async fn send_event(&self, event: &ClientEvent) -> Result<(), SessionError> {
        let payload = serde_json::to_string(event)
            .map_err(|err| SessionError::Transport(format!("event could not be encoded: {err}")))?;
        self.channel.send_text(payload).await?;
        Ok(())
    }

    async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut local) = self.local.lock().await.take() {
            local.stop();
        }
        if let Err(err) = self.channel.close().await {
            debug!(error = %err, "control channel close");
        }
        if let Err(err) = self.peer.close().await {
            debug!(error = %err, "peer connection close");
        }
        self.sink.detach();
        info!("media session closed");
    }
}
