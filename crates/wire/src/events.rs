//! Client and server event envelopes.

use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};

/// An event sent from the client to the remote service.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Configures the session. Sent exactly once, right after the control
    /// channel opens.
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
    /// Appends an item (user text, tool output) to the conversation.
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: Item },
    /// Asks the remote model to produce its next response.
    #[serde(rename = "response.create")]
    ResponseCreate,
}

/// An event received from the remote service.
///
/// Only the variants the session consumes are modeled; every other `type`
/// decodes to [`ServerEvent::Unknown`] and is dropped by the dispatcher.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A conversation item was committed remotely. Carries the transcript
    /// fragment for voice turns.
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated { item: CreatedItem },
    /// Server-side VAD detected the start of user speech.
    #[serde(rename = "input_audio_buffer.speech_started")]
    InputAudioBufferSpeechStarted,
    /// Server-side VAD detected the end of user speech.
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    InputAudioBufferSpeechStopped,
    /// A chunk of model audio is being produced. The audio itself travels on
    /// the media track; the event is only used as a speaking signal.
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta,
    /// A tool invocation's arguments have fully arrived.
    #[serde(rename = "response.function_call_arguments.done")]
    ResponseFunctionCallArgumentsDone {
        call_id: String,
        name: String,
        /// JSON-encoded argument object, validated remotely against the
        /// declared parameter schema.
        arguments: String,
    },
    #[serde(other)]
    Unknown,
}

/// Role attached to a conversation item.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemRole {
    User,
    Assistant,
    System,
}

/// A conversation item constructed locally for `conversation.item.create`.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    Message {
        role: ItemRole,
        content: Vec<ContentPart>,
    },
    /// The acknowledgement for a completed tool invocation.
    FunctionCallOutput {
        call_id: String,
        /// Serialized [`crate::tools::ToolResult`].
        output: String,
    },
}

impl Item {
    /// A user message holding a single text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Item::Message {
            role: ItemRole::User,
            content: vec![ContentPart::InputText { text: text.into() }],
        }
    }
}

/// A conversation item as delivered by `conversation.item.created`.
///
/// The remote service creates items of kinds this client never inspects
/// (function calls, system notes), so everything beyond role and content is
/// optional rather than a strict union.
#[derive(Deserialize, Debug, Clone)]
pub struct CreatedItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<ItemRole>,
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

impl CreatedItem {
    /// The transcript text of the item's first audio content part, if any.
    pub fn transcript(&self) -> Option<&str> {
        self.content.first().and_then(ContentPart::transcript)
    }
}

/// One content part inside a conversation item.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText {
        text: String,
    },
    Text {
        text: String,
    },
    InputAudio {
        #[serde(default)]
        transcript: Option<String>,
    },
    Audio {
        #[serde(default)]
        transcript: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl ContentPart {
    /// Transcript text for audio parts; `None` for text parts, which carry
    /// their payload in `text` and never describe spoken audio.
    pub fn transcript(&self) -> Option<&str> {
        match self {
            ContentPart::InputAudio { transcript } | ContentPart::Audio { transcript } => {
                transcript.as_deref()
            }
            _ => None,
        }
    }
}
