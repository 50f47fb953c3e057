//! Local tool registration and invocation dispatch.

use crate::error::SessionError;
use crate::transport::ControlLink;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use voicelink_wire::{ClientEvent, Item, ParameterSchema, ToolDefinition, ToolResult};

/// A tool invocation requested by the remote model.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    /// Parsed argument object; schema validation happened remotely against
    /// the declared parameters.
    pub arguments: Value,
}

/// A locally executable capability the remote model may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> ParameterSchema;
    /// Runs the tool. The side effect must be complete before returning; the
    /// returned result is what the remote model sees.
    async fn invoke(&self, arguments: Value) -> ToolResult;
    /// Clears any display state the tool accumulated during a session.
    fn reset(&self) {}
}

/// The tool table declared to the remote service in `session.update`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn declarations(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| {
                ToolDefinition::function(tool.name(), tool.description(), tool.parameters())
            })
            .collect()
    }

    pub fn reset_all(&self) {
        for tool in &self.tools {
            tool.reset();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }
}

/// Executes one invocation and acknowledges it over the control channel.
///
/// Undeclared names are dropped without a response; the remote side times out
/// on its own. For a known tool exactly one `function_call_output` is sent,
/// followed by `response.create` to resume the remote model's turn.
pub(crate) async fn dispatch(
    registry: &ToolRegistry,
    link: &dyn ControlLink,
    invocation: ToolInvocation,
) -> Result<(), SessionError> {
    let Some(tool) = registry.get(&invocation.name) else {
        warn!(
            name = %invocation.name,
            call_id = %invocation.call_id,
            "dropping invocation for undeclared tool"
        );
        return Ok(());
    };

    info!(name = %invocation.name, call_id = %invocation.call_id, "executing tool");
    let result = tool.invoke(invocation.arguments).await;
    if !result.success {
        warn!(name = %invocation.name, message = %result.message, "tool reported failure");
    }

    let output = serde_json::to_string(&result).unwrap_or_else(|_| {
        r#"{"success":false,"message":"tool result could not be encoded"}"#.to_owned()
    });
    link.send_event(&ClientEvent::ConversationItemCreate {
        item: Item::FunctionCallOutput {
            call_id: invocation.call_id,
            output,
        },
    })
    .await?;
    link.send_event(&ClientEvent::ResponseCreate).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use voicelink_wire::PropertySchema;

    struct RecordingLink {
        sent: Mutex<Vec<ClientEvent>>,
    }

    #[async_trait]
    impl ControlLink for RecordingLink {
        async fn send_event(&self, event: &ClientEvent) -> Result<(), SessionError> {
            self.sent.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn close(&self) {}
    }

    struct Greeter;

    #[async_trait]
    impl Tool for Greeter {
        fn name(&self) -> &str {
            "greet"
        }

        fn description(&self) -> &str {
            "Greets someone by name."
        }

        fn parameters(&self) -> ParameterSchema {
            ParameterSchema::object(
                [("name", PropertySchema::string("Who to greet"))],
                ["name"],
            )
        }

        async fn invoke(&self, arguments: Value) -> ToolResult {
            ToolResult::ok(format!(
                "hello {}",
                arguments["name"].as_str().unwrap_or("stranger")
            ))
        }
    }

    fn registry_with_greeter() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Greeter));
        registry
    }

    #[tokio::test]
    async fn known_tool_yields_output_then_response_create() {
        let registry = registry_with_greeter();
        let link = RecordingLink {
            sent: Mutex::new(Vec::new()),
        };
        let invocation = ToolInvocation {
            call_id: "call_3".into(),
            name: "greet".into(),
            arguments: serde_json::json!({"name": "Ada"}),
        };

        dispatch(&registry, &link, invocation).await.unwrap();

        let sent = link.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        let ClientEvent::ConversationItemCreate {
            item: Item::FunctionCallOutput { call_id, output },
        } = &sent[0]
        else {
            panic!("expected a function_call_output item");
        };
        assert_eq!(call_id, "call_3");
        let result: ToolResult = serde_json::from_str(output).unwrap();
        assert!(result.success);
        assert_eq!(result.message, "hello Ada");
        assert!(matches!(sent[1], ClientEvent::ResponseCreate));
    }

    #[tokio::test]
    async fn undeclared_tool_sends_nothing() {
        let registry = registry_with_greeter();
        let link = RecordingLink {
            sent: Mutex::new(Vec::new()),
        };
        let invocation = ToolInvocation {
            call_id: "call_4".into(),
            name: "draw_map".into(),
            arguments: Value::Null,
        };

        dispatch(&registry, &link, invocation).await.unwrap();
        assert!(link.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn declarations_mirror_registered_tools() {
        let registry = registry_with_greeter();
        let declarations = registry.declarations();
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].name, "greet");
        assert_eq!(declarations[0].kind, "function");
    }
}
