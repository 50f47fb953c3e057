//! Session configuration payload for `session.update`.

use crate::tools::ToolDefinition;
use serde::Serialize;

/// The remote session configuration sent once per connection.
#[derive(Serialize, Debug, Clone)]
pub struct SessionConfig {
    /// Natural-language behavioral instructions for the remote agent.
    pub instructions: String,
    /// Voice identifier for synthesized speech.
    pub voice: String,
    /// Sampling temperature.
    pub temperature: f32,
    pub turn_detection: TurnDetection,
    /// Tools the remote model may invoke. Omitted entirely when none are
    /// declared.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// Voice-activity-detection parameters controlling turn segmentation.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad {
        /// Amplitude threshold above which audio counts as speech.
        threshold: f32,
        /// Leading audio included before detected speech, in milliseconds.
        prefix_padding_ms: u32,
        /// Trailing silence that marks the end of a turn, in milliseconds.
        silence_duration_ms: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_wire_shape() {
        let config = SessionConfig {
            instructions: "Be curious.".into(),
            voice: "sage".into(),
            temperature: 0.8,
            turn_detection: TurnDetection::ServerVad {
                threshold: 0.5,
                prefix_padding_ms: 300,
                silence_duration_ms: 500,
            },
            tools: Vec::new(),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["voice"], "sage");
        assert_eq!(json["turn_detection"]["type"], "server_vad");
        assert_eq!(json["turn_detection"]["silence_duration_ms"], 500);
        // No declared tools: the field is left out, not sent as [].
        assert!(json.get("tools").is_none());
    }
}
