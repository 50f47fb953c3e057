//! The session error taxonomy.
//!
//! Only failures that end a `start()` attempt or an outbound send are typed
//! here. Malformed inbound events and undeclared tool names are contained
//! where they occur: logged, dropped, and never escalated to a session error.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The credential broker was unreachable or rejected the request. The
    /// message is surfaced to the user verbatim.
    #[error("{0}")]
    Credential(String),

    /// Local audio input could not be acquired. Kept distinct from connection
    /// failures so the user is told to check microphone permissions rather
    /// than their network.
    #[error("microphone unavailable: {0}")]
    MediaAccess(String),

    /// The offer/answer exchange with the remote service failed.
    #[error("signaling failed: {0}")]
    Signaling(String),

    /// The peer connection or control channel failed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// An operation that needs a live session was called while none is
    /// active.
    #[error("no active session")]
    NotActive,
}

impl From<webrtc::Error> for SessionError {
    fn from(err: webrtc::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_access_is_distinct_from_connection_failures() {
        let media = SessionError::MediaAccess("permission denied".into());
        let signaling = SessionError::Signaling("503 Service Unavailable".into());
        assert!(media.to_string().contains("microphone"));
        assert!(!signaling.to_string().contains("microphone"));
    }

    #[test]
    fn credential_message_is_verbatim() {
        let err = SessionError::Credential("Failed to get realtime token".into());
        assert_eq!(err.to_string(), "Failed to get realtime token");
    }
}
