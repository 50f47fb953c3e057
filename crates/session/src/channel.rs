//! Control-channel protocol handling: building outbound events and
//! classifying inbound ones.
//!
//! Classification happens exactly once, here; downstream handlers receive
//! typed values and never re-check message shape.

use crate::config::SessionOptions;
use crate::tools::ToolInvocation;
use crate::transcript::Role;
use voicelink_wire::{
    ClientEvent, Item, ItemRole, ServerEvent, SessionConfig, ToolDefinition, TurnDetection,
};

/// The one-time session configuration event sent when the channel opens.
pub(crate) fn configure(options: &SessionOptions, tools: Vec<ToolDefinition>) -> ClientEvent {
    ClientEvent::SessionUpdate {
        session: SessionConfig {
            instructions: options.instructions.clone(),
            voice: options.voice.clone(),
            temperature: options.temperature,
            turn_detection: TurnDetection::ServerVad {
                threshold: options.vad.threshold,
                prefix_padding_ms: options.vad.prefix_padding_ms,
                silence_duration_ms: options.vad.silence_duration_ms,
            },
            tools,
        },
    }
}

/// Outbound user text: the item, then the prompt for a model response.
/// The two sends are not atomic but must be issued back-to-back in this
/// order.
pub(crate) fn user_text(text: &str) -> [ClientEvent; 2] {
    [
        ClientEvent::ConversationItemCreate {
            item: Item::user_text(text),
        },
        ClientEvent::ResponseCreate,
    ]
}

/// A classified inbound event.
#[derive(Debug)]
pub(crate) enum Inbound {
    Transcript { role: Role, content: String },
    Listening(bool),
    ToolCall(ToolInvocation),
    Ignored,
}

/// Decodes one raw control-channel message.
///
/// Unknown event types classify as [`Inbound::Ignored`]; malformed JSON (or
/// malformed tool-call arguments) is an error the caller logs and drops.
pub(crate) fn classify(raw: &str) -> Result<Inbound, serde_json::Error> {
    let event: ServerEvent = serde_json::from_str(raw)?;
    Ok(match event {
        ServerEvent::ConversationItemCreated { item } => {
            let role = match item.role {
                Some(ItemRole::User) => Some(Role::User),
                Some(ItemRole::Assistant) => Some(Role::Assistant),
                _ => None,
            };
            match (role, item.transcript()) {
                (Some(role), Some(text)) if !text.is_empty() => Inbound::Transcript {
                    role,
                    content: text.to_owned(),
                },
                _ => Inbound::Ignored,
            }
        }
        ServerEvent::InputAudioBufferSpeechStarted => Inbound::Listening(true),
        ServerEvent::InputAudioBufferSpeechStopped => Inbound::Listening(false),
        // Audio starting to stream supersedes any speech-activity state.
        ServerEvent::ResponseAudioDelta => Inbound::Listening(false),
        ServerEvent::ResponseFunctionCallArgumentsDone {
            call_id,
            name,
            arguments,
        } => {
            let arguments = serde_json::from_str(&arguments)?;
            Inbound::ToolCall(ToolInvocation {
                call_id,
                name,
                arguments,
            })
        }
        ServerEvent::Unknown => Inbound::Ignored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn speech_events_toggle_listening() {
        let started = classify(r#"{"type":"input_audio_buffer.speech_started"}"#).unwrap();
        assert!(matches!(started, Inbound::Listening(true)));
        let stopped = classify(r#"{"type":"input_audio_buffer.speech_stopped"}"#).unwrap();
        assert!(matches!(stopped, Inbound::Listening(false)));
    }

    #[test]
    fn audio_delta_clears_listening() {
        let raw = json!({"type": "response.audio.delta", "delta": "AAAA"}).to_string();
        assert!(matches!(classify(&raw).unwrap(), Inbound::Listening(false)));
    }

    #[test]
    fn item_with_transcript_becomes_a_turn() {
        let raw = json!({
            "type": "conversation.item.created",
            "item": {
                "role": "assistant",
                "content": [{"type": "audio", "transcript": "Tell me about your business."}]
            }
        })
        .to_string();
        let Inbound::Transcript { role, content } = classify(&raw).unwrap() else {
            panic!("expected a transcript");
        };
        assert_eq!(role, Role::Assistant);
        assert_eq!(content, "Tell me about your business.");
    }

    #[test]
    fn item_without_transcript_is_ignored() {
        let raw = json!({
            "type": "conversation.item.created",
            "item": {"role": "user", "content": [{"type": "input_text", "text": "hi"}]}
        })
        .to_string();
        assert!(matches!(classify(&raw).unwrap(), Inbound::Ignored));
    }

    #[test]
    fn unknown_event_types_are_ignored() {
        let raw = json!({"type": "response.done", "response": {}}).to_string();
        assert!(matches!(classify(&raw).unwrap(), Inbound::Ignored));
    }

    #[test]
    fn malformed_payloads_are_errors_not_panics() {
        assert!(classify("not json at all").is_err());
        let bad_arguments = json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_1",
            "name": "show_route",
            "arguments": "{broken"
        })
        .to_string();
        assert!(classify(&bad_arguments).is_err());
    }

    #[test]
    fn tool_call_arguments_are_parsed_once() {
        let raw = json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_9",
            "name": "show_route",
            "arguments": "{\"origin\":{\"lat\":33.749,\"lng\":-84.388}}"
        })
        .to_string();
        let Inbound::ToolCall(invocation) = classify(&raw).unwrap() else {
            panic!("expected a tool call");
        };
        assert_eq!(invocation.call_id, "call_9");
        assert_eq!(invocation.arguments["origin"]["lat"], 33.749);
    }

    #[test]
    fn configure_carries_vad_and_tools() {
        let options = SessionOptions {
            instructions: "Be brief.".into(),
            ..Default::default()
        };
        let declarations = vec![voicelink_wire::ToolDefinition::function(
            "show_route",
            "Show a route",
            voicelink_wire::ParameterSchema::object([], []),
        )];
        let event = configure(&options, declarations);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session.update");
        assert_eq!(json["session"]["instructions"], "Be brief.");
        assert_eq!(json["session"]["turn_detection"]["type"], "server_vad");
        assert_eq!(json["session"]["tools"][0]["name"], "show_route");
    }

    #[test]
    fn user_text_is_item_then_response() {
        let [first, second] = user_text("hello");
        assert!(matches!(first, ClientEvent::ConversationItemCreate { .. }));
        assert!(matches!(second, ClientEvent::ResponseCreate));
    }
}
