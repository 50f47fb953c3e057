//! Audio I/O ports.
//!
//! The negotiator does not talk to sound hardware itself; it acquires the
//! outbound track through [`AudioSource`] and hands the inbound track to
//! [`AudioSink`]. The agent binary provides device-backed implementations;
//! the in-crate ones cover text-only operation and tests.

use crate::error::SessionError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// A sample-writable Opus track suitable for the outbound audio path.
pub fn opus_track(label: &str) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: 48_000,
            channels: 2,
            ..Default::default()
        },
        label.to_owned(),
        "voicelink".to_owned(),
    ))
}

/// The acquired local audio input: the track added to the peer connection
/// plus whatever capture machinery feeds it. Stopping is tied to the value's
/// lifetime so a torn-down session cannot leave the device open.
pub struct LocalAudio {
    track: Arc<dyn TrackLocal + Send + Sync>,
    stopper: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl LocalAudio {
    pub fn new(
        track: Arc<dyn TrackLocal + Send + Sync>,
        stopper: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            track,
            stopper: Some(Box::new(stopper)),
        }
    }

    /// A track with no capture machinery behind it.
    pub fn unmanaged(track: Arc<dyn TrackLocal + Send + Sync>) -> Self {
        Self {
            track,
            stopper: None,
        }
    }

    pub(crate) fn track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        Arc::clone(&self.track)
    }

    pub(crate) fn stop(&mut self) {
        if let Some(stopper) = self.stopper.take() {
            stopper();
        }
    }
}

impl Drop for LocalAudio {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Provider of the local (microphone) audio track.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Acquires the capture device and returns the outbound track.
    /// Failures must be [`SessionError::MediaAccess`] so the user is pointed
    /// at the microphone rather than the network.
    async fn open(&self) -> Result<LocalAudio, SessionError>;
}

/// Playback sink for the remote audio track.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Called once per session when the remote track arrives.
    async fn attach(&self, track: Arc<TrackRemote>);
    /// Stops playback. Must tolerate being called without a prior `attach`.
    fn detach(&self);
}

/// Produces an outbound track that never carries samples, keeping the audio
/// section of the offer intact for text-only operation.
#[derive(Default)]
pub struct SilentAudioSource;

#[async_trait]
impl AudioSource for SilentAudioSource {
    async fn open(&self) -> Result<LocalAudio, SessionError> {
        Ok(LocalAudio::unmanaged(opus_track("silence")))
    }
}

/// Discards remote audio while keeping the track drained.
#[derive(Default)]
pub struct NullAudioSink {
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NullAudioSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AudioSink for NullAudioSink {
    async fn attach(&self, track: Arc<TrackRemote>) {
        let handle = tokio::spawn(async move { while track.read_rtp().await.is_ok() {} });
        let mut worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = worker.replace(handle) {
            previous.abort();
        }
    }

    fn detach(&self) {
        let mut worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = worker.take() {
            handle.abort();
        }
    }
}
