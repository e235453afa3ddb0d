//! Host-side code evaluation
//!
//! Runs the code of `Execute Python` / `Return Data` cells in a separate
//! interpreter process, never in-process. The subprocess gets exactly two
//! bound surfaces: an `args` dict with the tool parameters, and `driver_*`
//! helpers that drive the wrapper's live browser session over the W3C
//! WebDriver wire protocol (endpoint and session id are passed through the
//! environment). Everything the code prints is captured as `output`; the
//! value bound to the variable `result` when the script ends is captured as
//! `result`.

use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::SessionError;

/// Endpoint coordinates of the live WebDriver session, handed to the
/// subprocess so its code drives the same browser the interpreter does.
#[derive(Debug, Clone)]
pub struct SessionBinding {
    pub webdriver_url: String,
    pub session_id: String,
}

/// Outcome of one host-side execution.
///
/// `result` is the last value bound to the name `result` in the executed
/// code, `Value::Null` when the code never bound it. Multiple assignments
/// and shadowing are not guarded against; the final binding wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecOutcome {
    pub output: String,
    pub result: Value,
}

/// Marker line separating captured output from the serialized `result`.
const RESULT_MARKER: &str = "__TOOLBENCH_RESULT__";

/// Bound names available to cell code. Talks W3C WebDriver directly so the
/// subprocess needs nothing beyond the standard library.
const PRELUDE: &str = r#"import json as _tb_json
import os as _tb_os
import urllib.request as _tb_request

args = _tb_json.loads(_tb_os.environ.get("TOOL_ARGS", "{}"))

_TB_ENDPOINT = _tb_os.environ.get("WEBDRIVER_URL", "").rstrip("/")
_TB_SESSION = _tb_os.environ.get("WEBDRIVER_SESSION", "")


def _tb_wd(method, path, payload=None):
    url = "%s/session/%s%s" % (_TB_ENDPOINT, _TB_SESSION, path)
    data = None if payload is None else _tb_json.dumps(payload).encode()
    req = _tb_request.Request(
        url, data=data, method=method, headers={"Content-Type": "application/json"}
    )
    with _tb_request.urlopen(req) as resp:
        return _tb_json.load(resp).get("value")


def driver_navigate(url):
    return _tb_wd("POST", "/url", {"url": url})


def driver_execute(script, script_args=None):
    return _tb_wd("POST", "/execute/sync", {"script": script, "args": script_args or []})


def driver_title():
    return _tb_wd("GET", "/title")


def driver_url():
    return _tb_wd("GET", "/url")


def driver_source():
    return _tb_wd("GET", "/source")
"#;

const EPILOGUE: &str = r#"
import json as _tb_json
import sys as _tb_sys

_tb_sys.stdout.write(
    "\n__TOOLBENCH_RESULT__" + _tb_json.dumps(globals().get("result"), default=str) + "\n"
)
"#;

/// Evaluates cell code in an interpreter subprocess.
#[derive(Debug, Clone)]
pub struct PythonEvaluator {
    python_bin: String,
    timeout: Duration,
}

impl PythonEvaluator {
    pub fn new(python_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python_bin: python_bin.into(),
            timeout,
        }
    }

    /// Run `code` with `params` bound as `args` and the session reachable
    /// through the `driver_*` helpers.
    pub async fn eval(
        &self,
        code: &str,
        params: &HashMap<String, String>,
        session: &SessionBinding,
    ) -> Result<ExecOutcome, SessionError> {
        let script = [PRELUDE, code, EPILOGUE].join("\n");

        let mut file = tempfile::Builder::new()
            .prefix("toolbench-cell-")
            .suffix(".py")
            .tempfile()
            .map_err(|e| SessionError::Execution(format!("failed to stage cell code: {e}")))?;
        file.write_all(script.as_bytes())
            .map_err(|e| SessionError::Execution(format!("failed to stage cell code: {e}")))?;
        file.flush()
            .map_err(|e| SessionError::Execution(format!("failed to stage cell code: {e}")))?;

        let args_json = serde_json::to_string(params)
            .map_err(|e| SessionError::Execution(format!("failed to encode parameters: {e}")))?;

        let mut cmd = Command::new(&self.python_bin);
        cmd.arg(file.path())
            .env("TOOL_ARGS", args_json)
            .env("WEBDRIVER_URL", &session.webdriver_url)
            .env("WEBDRIVER_SESSION", &session.session_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Executing cell code via {}", self.python_bin);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                SessionError::Execution(format!(
                    "execution timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                SessionError::Execution(format!("failed to run {}: {e}", self.python_bin))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.trim();
            return Err(SessionError::Execution(if message.is_empty() {
                format!("interpreter exited with status {}", output.status)
            } else {
                message.to_string()
            }));
        }

        Ok(split_outcome(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Separate captured output from the serialized `result` value the epilogue
/// appended. A missing marker means the script ended before the epilogue
/// (only possible when the interpreter still exited 0); treat everything as
/// output with a null result.
fn split_outcome(stdout: &str) -> ExecOutcome {
    match stdout.rfind(RESULT_MARKER) {
        Some(pos) => {
            let mut output = &stdout[..pos];
            // drop the newline the epilogue prepends to its marker line
            if let Some(trimmed) = output.strip_suffix('\n') {
                output = trimmed;
            }
            let tail = stdout[pos + RESULT_MARKER.len()..]
                .lines()
                .next()
                .unwrap_or("null");
            let result = serde_json::from_str(tail).unwrap_or(Value::Null);
            ExecOutcome {
                output: output.to_string(),
                result,
            }
        }
        None => ExecOutcome {
            output: stdout.to_string(),
            result: Value::Null,
        },
    }
}
