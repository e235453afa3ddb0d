//! Toolbench MCP Server - Entry Point
//!
//! Subcommands cover the two halves of the application: editing server
//! configurations (create/list/show/add-tool/update-tool/delete-tool) and
//! executing them (exec for a single cell, run for one tool, serve for the
//! MCP stdio server).

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use toolbench_mcp::{
    Config, McpServer, ServerStore, SessionConfig, SessionWrapper, ToolDefinition, ToolRegistry,
};

#[derive(Parser)]
#[command(name = "toolbench-mcp", version, about = "Compose browser-automation tools and serve them over MCP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new, empty server configuration
    Create { name: String },

    /// List all server configurations
    List,

    /// Show a server configuration's tools
    Show { name: String },

    /// Add a tool to a server from a JSON definition file
    AddTool {
        server: String,
        /// Tool definition file ({"name", "args", "cells"})
        #[arg(long)]
        file: PathBuf,
    },

    /// Replace a named tool from a JSON definition file
    UpdateTool {
        server: String,
        tool: String,
        #[arg(long)]
        file: PathBuf,
    },

    /// Delete a named tool
    DeleteTool { server: String, tool: String },

    /// Execute a single cell against a fresh browser session
    Exec {
        /// Cell kind
        kind: CellKind,
        /// URL for load-page, source text otherwise
        code: String,
        /// Parameter bindings, repeatable: --arg name=value
        #[arg(long = "arg", value_parser = parse_key_val)]
        args: Vec<(String, String)>,
    },

    /// Invoke one tool of a server directly
    Run {
        server: String,
        tool: String,
        /// Parameter bindings, repeatable: --arg name=value
        #[arg(long = "arg", value_parser = parse_key_val)]
        args: Vec<(String, String)>,
    },

    /// Serve a configuration's tools over MCP (stdio)
    Serve { server: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CellKind {
    LoadPage,
    ExecutePython,
    ExecuteJavascript,
    ReturnData,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid argument '{s}', expected name=value"))?;
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let serve_mode = matches!(cli.command, Command::Serve { .. });

    // Setup logging based on mode
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    if serve_mode {
        // MCP mode - log to stderr as JSON, stdout carries the protocol
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let config = Config::from_env()?;
    let store = ServerStore::new(&config.servers_root);

    match cli.command {
        Command::Create { name } => {
            store.create(&name)?;
            println!("Created server '{name}'");
        }

        Command::List => {
            for name in store.list()? {
                println!("{name}");
            }
        }

        Command::Show { name } => {
            let server = store.load(&name)?;
            println!("{}", server.name);
            for tool in &server.tools {
                println!(
                    "  {} (args: {}) - {} cell(s)",
                    tool.name,
                    tool.args.join(", "),
                    tool.steps.len()
                );
            }
        }

        Command::AddTool { server, file } => {
            let tool = read_tool_definition(&file)?;
            let mut server_config = store.load(&server)?;
            let name = tool.name.clone();
            store.add_tool(&mut server_config, tool)?;
            println!("Added tool '{name}' to '{server}'");
        }

        Command::UpdateTool { server, tool, file } => {
            let replacement = read_tool_definition(&file)?;
            let mut server_config = store.load(&server)?;
            store.update_tool(&mut server_config, &tool, replacement)?;
            println!("Updated tool '{tool}' in '{server}'");
        }

        Command::DeleteTool { server, tool } => {
            let mut server_config = store.load(&server)?;
            store.delete_tool(&mut server_config, &tool)?;
            println!("Deleted tool '{tool}' from '{server}'");
        }

        Command::Exec { kind, code, args } => {
            let session = open_session(&config).await?;
            let outcome = exec_cell(&session, kind, &code, args.into_iter().collect()).await;
            session.lock().await.close().await;
            outcome?;
        }

        Command::Run { server, tool, args } => {
            let server_config = store.load(&server)?;
            if server_config.tool(&tool).is_none() {
                anyhow::bail!("server '{server}' has no tool named '{tool}'");
            }

            let session = open_session(&config).await?;
            let registry = ToolRegistry::new(session.clone(), server_config.tools.clone());

            let mut arguments = serde_json::Map::new();
            for (key, value) in args {
                arguments.insert(key, serde_json::Value::String(value));
            }

            let outcome = registry.call(&tool, serde_json::Value::Object(arguments)).await;
            session.lock().await.close().await;

            match outcome {
                Ok(value) => println!("{value}"),
                Err(e) => anyhow::bail!("{e}"),
            }
        }

        Command::Serve { server } => {
            let server_config = store.load(&server)?;
            if server_config.tools.is_empty() {
                anyhow::bail!(
                    "server '{server}' has no tools to register; add at least one tool before serving"
                );
            }

            info!("Toolbench MCP Server v{}", env!("CARGO_PKG_VERSION"));

            let session = open_session(&config).await?;
            let registry = Arc::new(ToolRegistry::new(
                session.clone(),
                server_config.tools.clone(),
            ));
            let mcp = McpServer::new(server_config.name.clone(), registry);

            let mut loop_task = tokio::spawn(async move { mcp.run().await });

            let served: anyhow::Result<()> = tokio::select! {
                joined = &mut loop_task => {
                    joined.context("MCP server task panicked").and_then(|r| r)
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupt received, stopping server");
                    loop_task.abort();
                    let _ = tokio::time::timeout(Duration::from_secs(5), loop_task).await;
                    Ok(())
                }
            };

            // the session closes at shutdown regardless of how serving ended
            session.lock().await.close().await;
            served?;
        }
    }

    Ok(())
}

async fn open_session(config: &Config) -> anyhow::Result<Arc<Mutex<SessionWrapper>>> {
    let session = SessionWrapper::open(SessionConfig::from(config)).await?;
    Ok(Arc::new(Mutex::new(session)))
}

fn read_tool_definition(path: &PathBuf) -> anyhow::Result<ToolDefinition> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("invalid tool definition in {}", path.display()))
}

/// Execute one cell and print its outcome the way the tool editor shows it:
/// captured output first, then the return value when there is one.
async fn exec_cell(
    session: &Arc<Mutex<SessionWrapper>>,
    kind: CellKind,
    code: &str,
    params: HashMap<String, String>,
) -> anyhow::Result<()> {
    let guard = session.lock().await;
    match kind {
        CellKind::LoadPage => {
            guard.navigate(code).await?;
            println!("Successfully loaded: {code}");
        }
        CellKind::ExecuteJavascript => {
            let value = guard.run_script(code).await?;
            println!("Return Value:");
            println!("{value}");
        }
        CellKind::ExecutePython | CellKind::ReturnData => {
            let outcome = guard.run_local_code(code, &params).await?;
            if !outcome.output.is_empty() {
                println!("Output:");
                println!("{}", outcome.output.trim_end());
            }
            if !outcome.result.is_null() {
                println!("Return Value:");
                println!("{}", outcome.result);
            }
        }
    }
    Ok(())
}
