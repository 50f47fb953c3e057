//! Wire-format types for the realtime control channel.
//!
//! Every message on the channel is a single JSON object with a mandatory
//! `type` discriminator. This crate defines the serializable client events,
//! the deserializable server events, and the session/tool configuration
//! payloads they carry. Event types the client does not consume decode to
//! [`ServerEvent::Unknown`] so the protocol stays forward-compatible.

pub mod events;
pub mod session;
pub mod tools;

pub use events::{ClientEvent, ContentPart, CreatedItem, Item, ItemRole, ServerEvent};
pub use session::{SessionConfig, TurnDetection};
pub use tools::{ParameterSchema, PropertySchema, ToolDefinition, ToolResult};
