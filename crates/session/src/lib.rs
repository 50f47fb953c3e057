//! Realtime voice session management.
//!
//! A [`VoiceSession`] holds a live, bidirectional voice (and text)
//! conversation with a remote conversational-AI service over a WebRTC peer
//! connection: a short-lived credential is fetched from a broker, an SDP
//! offer/answer exchange establishes the audio path, and a data channel
//! carries the JSON event protocol used to configure the session, stream
//! transcripts, signal speech activity, and dispatch tool calls.
//!
//! Collaborators are injected as trait objects ([`CredentialSource`],
//! [`MediaConnector`], [`AudioSource`], [`AudioSink`]) so the lifecycle logic
//! is testable without devices or a network.

mod channel;
pub mod config;
pub mod credentials;
pub mod error;
pub mod media;
pub mod session;
pub mod signaling;
pub mod tools;
pub mod transcript;
pub mod transport;

pub use config::{SessionOptions, VadOptions};
pub use credentials::{BrokerClient, CredentialSource, SessionCredential};
pub use error::SessionError;
pub use media::{AudioSink, AudioSource, LocalAudio, NullAudioSink, SilentAudioSource, opus_track};
pub use session::{SessionNotice, SessionStatus, VoiceSession};
pub use signaling::{HttpSignalingClient, SignalingClient};
pub use tools::{Tool, ToolInvocation, ToolRegistry};
pub use transcript::{ConversationTurn, Role, TranscriptAggregator};
pub use transport::{ControlLink, EngineEvent, MediaConnector, WebRtcConnector};
