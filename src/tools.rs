//! Tool registrar
//!
//! Turns persisted tool definitions into invocable, schema-described
//! operations bound to the one shared browser session. No function
//! synthesis happens at registration time: the registry keeps the
//! definitions as descriptors and dispatches `tools/call` by name lookup,
//! handing the step list to the interpreter.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::ToolExecutionError;
use crate::interpreter::{run_steps, StepHost};
use crate::model::ToolDefinition;

/// The shared session every registered operation executes against. The
/// production host is `SessionWrapper`; the lock is what serializes
/// concurrent invocations.
pub type SharedSession = Arc<Mutex<dyn StepHost>>;

/// MCP-facing tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Derive the served descriptor for a tool: a fixed templated description
/// and an object schema with one required string property per declared arg.
pub fn descriptor_for(tool: &ToolDefinition) -> ToolDescriptor {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for arg in &tool.args {
        properties.insert(
            arg.clone(),
            json!({
                "type": "string",
                "description": format!("Parameter {arg}")
            }),
        );
        required.push(Value::String(arg.clone()));
    }

    ToolDescriptor {
        name: tool.name.clone(),
        description: format!("Automated tool for {}", tool.name),
        input_schema: json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": required
        }),
    }
}

/// A `tools/call` failure
#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error(transparent)]
    Execution(#[from] ToolExecutionError),
}

/// Live operations for one served configuration.
///
/// Built once at server start from the configuration's current tool
/// definitions; tools added afterwards are not visible until a restart.
/// Every invocation takes the session lock for its whole step sequence, so
/// concurrent calls queue rather than interleave on the shared browser.
pub struct ToolRegistry {
    session: SharedSession,
    tools: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn new(session: SharedSession, tools: Vec<ToolDefinition>) -> Self {
        Self { session, tools }
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// List all served tool definitions
    pub fn list_definitions(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(descriptor_for).collect()
    }

    /// Invoke a tool by name with an MCP argument object.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolCallError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ToolCallError::UnknownTool(name.to_string()))?;

        let params = coerce_params(&arguments);
        info!("Tool call: {} with {} argument(s)", name, params.len());

        // one step sequence at a time on the shared session
        let session = self.session.lock().await;
        let value = run_steps(&*session, &tool.name, &tool.steps, &params).await?;
        Ok(value)
    }
}

/// Flatten an MCP argument object into the string map the interpreter
/// threads into code cells. Schema enforcement upstream already promised
/// string values; anything else is carried as its JSON text.
pub fn coerce_params(arguments: &Value) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Value::Object(map) = arguments {
        for (key, value) in map {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            params.insert(key.clone(), text);
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Step, StepKind};

    fn tool(name: &str, args: &[&str]) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            steps: vec![Step {
                kind: StepKind::LoadPage,
                order: 0,
                code: "example.com".to_string(),
            }],
        }
    }

    #[test]
    fn schema_has_one_required_string_property_per_arg() {
        let descriptor = descriptor_for(&tool("weather", &["city", "date"]));

        assert_eq!(descriptor.name, "weather");
        assert_eq!(descriptor.description, "Automated tool for weather");

        let schema = &descriptor.input_schema;
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["city", "date"]));
        assert_eq!(
            schema["properties"]["city"],
            json!({"type": "string", "description": "Parameter city"})
        );
        assert_eq!(
            schema["properties"]["date"],
            json!({"type": "string", "description": "Parameter date"})
        );
        assert_eq!(schema["properties"].as_object().unwrap().len(), 2);
    }

    #[test]
    fn schema_for_no_args_is_empty_object() {
        let descriptor = descriptor_for(&tool("plain", &[]));
        let schema = &descriptor.input_schema;
        assert_eq!(schema["properties"], json!({}));
        assert_eq!(schema["required"], json!([]));
    }

    #[test]
    fn descriptor_serializes_input_schema_key() {
        let descriptor = descriptor_for(&tool("t", &[]));
        let wire = serde_json::to_value(&descriptor).unwrap();
        assert!(wire.get("inputSchema").is_some());
        assert!(wire.get("input_schema").is_none());
    }

    #[test]
    fn coerce_params_keeps_strings_and_stringifies_rest() {
        let params = coerce_params(&json!({"city": "Paris", "count": 3}));
        assert_eq!(params.get("city").unwrap(), "Paris");
        assert_eq!(params.get("count").unwrap(), "3");
    }
}
