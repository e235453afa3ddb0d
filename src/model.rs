//! Tool data model
//!
//! Steps, tool definitions, and server configurations, serialized in the
//! on-disk `config.json` format: one directory per server, tools carrying
//! their step list under the `cells` key with `type`/`order`/`code` fields.

use serde::{Deserialize, Serialize};

/// What a single step does when executed.
///
/// These four kinds are the only ones that exist in the data model; the
/// interactive REPL offered by editing frontends is a UI affordance and is
/// deliberately not representable here, so it can never be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    /// Navigate the session to a URL
    #[serde(rename = "Load Page")]
    LoadPage,
    /// Run host-side code for its side effects
    #[serde(rename = "Execute Python")]
    ExecutePython,
    /// Run a script in the page context
    #[serde(rename = "Execute JavaScript")]
    ExecuteJavaScript,
    /// Run host-side code and end the tool with its `result`
    #[serde(rename = "Return Data")]
    ReturnData,
}

/// One action in a tool's sequence.
///
/// `order` determines execution sequence; it is not required to be unique,
/// and ties keep their input order (the sort is stable). `code` holds a URL
/// for [`StepKind::LoadPage`] and source text otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub order: i64,
    pub code: String,
}

/// A named, parameterized, ordered list of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    /// Declared parameter names; each becomes a required string input.
    /// Order-preserving.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(rename = "cells", default)]
    pub steps: Vec<Step>,
}

impl ToolDefinition {
    /// Sort steps ascending by `order` (stable). Applied at save time so
    /// persisted configurations are already in execution order.
    pub fn sort_steps(&mut self) {
        self.steps.sort_by_key(|s| s.order);
    }
}

/// A named collection of tool definitions, persisted as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
}

impl ServerConfig {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
        }
    }

    pub fn tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }
}
