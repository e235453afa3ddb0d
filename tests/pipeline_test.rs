//! Tool Pipeline Integration Tests
//!
//! Exercises the registrar and interpreter together over a scripted step
//! host: invocation through the registry, the getTitle scenario, and the
//! serialization of concurrent invocations on the shared session.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;

use toolbench_mcp::{
    ExecOutcome, SessionError, SharedSession, Step, StepHost, StepKind, ToolCallError,
    ToolDefinition, ToolRegistry,
};

/// Step host that answers like a page titled `Example Domain` and records
/// every call, optionally sleeping inside local-code execution so tests can
/// provoke interleaving.
struct ScriptedHost {
    log: Arc<StdMutex<Vec<String>>>,
    local_delay: Duration,
}

impl ScriptedHost {
    fn new(log: Arc<StdMutex<Vec<String>>>, local_delay: Duration) -> Self {
        Self { log, local_delay }
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl StepHost for ScriptedHost {
    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        self.record(format!("navigate:{url}"));
        Ok(())
    }

    async fn run_script(&self, code: &str) -> Result<Value, SessionError> {
        self.record(format!("script:{code}"));
        Ok(Value::Null)
    }

    async fn run_local_code(
        &self,
        code: &str,
        params: &HashMap<String, String>,
    ) -> Result<ExecOutcome, SessionError> {
        self.record(format!("local-start:{code}"));
        if !self.local_delay.is_zero() {
            tokio::time::sleep(self.local_delay).await;
        }
        self.record(format!("local-end:{code}"));
        let result = if code.contains("driver_title") {
            json!("Example Domain")
        } else if let Some(arg) = params.get("city") {
            json!(arg)
        } else {
            Value::Null
        };
        Ok(ExecOutcome {
            output: String::new(),
            result,
        })
    }
}

fn step(kind: StepKind, order: i64, code: &str) -> Step {
    Step {
        kind,
        order,
        code: code.to_string(),
    }
}

fn get_title_tool() -> ToolDefinition {
    ToolDefinition {
        name: "getTitle".to_string(),
        args: vec![],
        steps: vec![
            step(StepKind::LoadPage, 0, "example.com"),
            step(StepKind::ReturnData, 1, "result = driver_title()"),
        ],
    }
}

#[tokio::test]
async fn get_title_scenario_returns_title_with_one_navigation() {
    let log = Arc::new(StdMutex::new(Vec::new()));
    let host = Arc::new(Mutex::new(ScriptedHost::new(log.clone(), Duration::ZERO)));
    let session: SharedSession = host;
    let registry = ToolRegistry::new(session, vec![get_title_tool()]);

    let value = registry.call("getTitle", json!({})).await.unwrap();
    assert_eq!(value, json!("Example Domain"));

    let entries = log.lock().unwrap().clone();
    let navigations = entries.iter().filter(|e| e.starts_with("navigate:")).count();
    assert_eq!(navigations, 1);
}

#[tokio::test]
async fn unknown_tool_is_rejected() {
    let log = Arc::new(StdMutex::new(Vec::new()));
    let session: SharedSession =
        Arc::new(Mutex::new(ScriptedHost::new(log, Duration::ZERO)));
    let registry = ToolRegistry::new(session, vec![get_title_tool()]);

    let err = registry.call("missing", json!({})).await.unwrap_err();
    assert!(matches!(err, ToolCallError::UnknownTool(_)));
}

#[tokio::test]
async fn declared_args_reach_local_code_cells() {
    let log = Arc::new(StdMutex::new(Vec::new()));
    let session: SharedSession =
        Arc::new(Mutex::new(ScriptedHost::new(log, Duration::ZERO)));

    let tool = ToolDefinition {
        name: "echoCity".to_string(),
        args: vec!["city".to_string()],
        steps: vec![step(StepKind::ReturnData, 0, "result = args['city']")],
    };
    let registry = ToolRegistry::new(session, vec![tool]);

    let value = registry
        .call("echoCity", json!({"city": "Paris"}))
        .await
        .unwrap();
    assert_eq!(value, json!("Paris"));
}

#[tokio::test]
async fn concurrent_invocations_never_interleave_steps() {
    let log = Arc::new(StdMutex::new(Vec::new()));
    let session: SharedSession = Arc::new(Mutex::new(ScriptedHost::new(
        log.clone(),
        Duration::from_millis(50),
    )));

    let slow = ToolDefinition {
        name: "slow".to_string(),
        args: vec![],
        steps: vec![
            step(StepKind::LoadPage, 0, "slow.example"),
            step(StepKind::ExecutePython, 1, "slow-cell"),
        ],
    };
    let fast = ToolDefinition {
        name: "fast".to_string(),
        args: vec![],
        steps: vec![
            step(StepKind::LoadPage, 0, "fast.example"),
            step(StepKind::ExecutePython, 1, "fast-cell"),
        ],
    };
    let registry = Arc::new(ToolRegistry::new(session, vec![slow, fast]));

    let first = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.call("slow", json!({})).await })
    };
    // give the first invocation a head start into its delayed cell
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.call("fast", json!({})).await })
    };

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let entries = log.lock().unwrap().clone();
    // each invocation runs start-to-finish before the other begins
    assert_eq!(
        entries,
        vec![
            "navigate:slow.example".to_string(),
            "local-start:slow-cell".to_string(),
            "local-end:slow-cell".to_string(),
            "navigate:fast.example".to_string(),
            "local-start:fast-cell".to_string(),
            "local-end:fast-cell".to_string(),
        ]
    );
}
