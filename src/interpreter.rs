//! Step interpreter
//!
//! Executes a tool's steps in ascending `order` against a step host and
//! produces the tool's result: the `result` of the first `Return Data`
//! cell, or null when no such cell exists. The first failing step aborts
//! the remainder; side effects of earlier steps are not rolled back.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{SessionError, ToolExecutionError};
use crate::model::{Step, StepKind};
use crate::python::ExecOutcome;
use crate::session::SessionWrapper;

/// The session operations a step sequence needs. `SessionWrapper` is the
/// production host; tests substitute a recording implementation.
#[async_trait]
pub trait StepHost: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), SessionError>;
    async fn run_script(&self, code: &str) -> Result<Value, SessionError>;
    async fn run_local_code(
        &self,
        code: &str,
        params: &HashMap<String, String>,
    ) -> Result<ExecOutcome, SessionError>;
}

#[async_trait]
impl StepHost for SessionWrapper {
    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        SessionWrapper::navigate(self, url).await
    }

    async fn run_script(&self, code: &str) -> Result<Value, SessionError> {
        SessionWrapper::run_script(self, code).await
    }

    async fn run_local_code(
        &self,
        code: &str,
        params: &HashMap<String, String>,
    ) -> Result<ExecOutcome, SessionError> {
        SessionWrapper::run_local_code(self, code, params).await
    }
}

/// Run `steps` in ascending `order` with `params` threaded into the
/// code-executing cells. Failures carry the tool's name.
pub async fn run_steps(
    host: &dyn StepHost,
    tool: &str,
    steps: &[Step],
    params: &HashMap<String, String>,
) -> Result<Value, ToolExecutionError> {
    let mut ordered: Vec<&Step> = steps.iter().collect();
    ordered.sort_by_key(|s| s.order);

    for step in ordered {
        let outcome = match step.kind {
            StepKind::LoadPage => host.navigate(&step.code).await.map(|()| None),
            StepKind::ExecuteJavaScript => host.run_script(&step.code).await.map(|_| None),
            StepKind::ExecutePython => host.run_local_code(&step.code, params).await.map(|o| {
                if !o.output.is_empty() {
                    debug!("Cell output: {}", o.output.trim_end());
                }
                None
            }),
            StepKind::ReturnData => host
                .run_local_code(&step.code, params)
                .await
                .map(|o| Some(o.result)),
        };

        match outcome {
            // a Return Data cell ends the tool; later steps never run
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(source) => {
                return Err(ToolExecutionError {
                    tool: tool.to_string(),
                    source,
                })
            }
        }
    }

    Ok(Value::Null)
}
