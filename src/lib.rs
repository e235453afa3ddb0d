//! Toolbench MCP Server
//!
//! Compose ordered sequences of browser actions into named tools and serve
//! them as callable operations over the Model Context Protocol.
//!
//! # Features
//!
//! - **MCP Protocol**: JSON-RPC 2.0 over stdio
//! - **Browser Session**: one shared headless session driven over WebDriver
//! - **Step Pipeline**: Load Page / Execute Python / Execute JavaScript /
//!   Return Data cells, executed in declared order
//! - **Sandboxed Cells**: host-side code runs in an interpreter subprocess,
//!   never in-process
//! - **Server Registry**: per-server `config.json` directories with full
//!   tool CRUD
//!
//! # Architecture
//!
//! ```text
//! MCP client ──► MCP Protocol ──► ToolRegistry ──► Step Interpreter
//!                  (stdio)            │                  │
//!                                     │                  ├── Load Page ──────► SessionWrapper
//!                                     │                  ├── Execute JS ─────►   (fantoccini /
//!                                     │                  └── Python cells ───►    chromedriver)
//!                                     └── ServerStore (servers/<name>/config.json)
//! ```

pub mod config;
pub mod error;
pub mod interpreter;
pub mod mcp;
pub mod model;
pub mod python;
pub mod registry;
pub mod session;
pub mod tools;

pub use config::Config;
pub use error::{RegistryError, SessionError, ToolExecutionError};
pub use interpreter::{run_steps, StepHost};
pub use mcp::{McpRequest, McpResponse, McpServer};
pub use model::{ServerConfig, Step, StepKind, ToolDefinition};
pub use python::{ExecOutcome, PythonEvaluator, SessionBinding};
pub use registry::ServerStore;
pub use session::{SessionConfig, SessionWrapper};
pub use tools::{descriptor_for, SharedSession, ToolCallError, ToolDescriptor, ToolRegistry};
