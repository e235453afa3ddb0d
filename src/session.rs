//! Browser session wrapper
//!
//! Owns the one live browser-driving session: locates a browser and a
//! chromedriver binary, spawns the driver, and connects a WebDriver client
//! to it. Every tool invocation and direct cell execution goes through this
//! wrapper; callers serialize access behind a single async lock so at most
//! one step sequence runs at a time.

use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::SessionError;
use crate::python::{ExecOutcome, PythonEvaluator, SessionBinding};

/// Well-known browser install locations, probed in order.
const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome-stable",
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
];

/// Well-known chromedriver locations, probed in order.
const DRIVER_PATHS: &[&str] = &[
    "/usr/bin/chromedriver",
    "/usr/local/bin/chromedriver",
    "/usr/lib/chromium-browser/chromedriver",
    "/snap/bin/chromium.chromedriver",
];

/// Session launch parameters, extracted from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub chrome_path: Option<String>,
    pub chromedriver_path: Option<String>,
    pub driver_port: u16,
    pub headless: bool,
    pub python_bin: String,
    pub exec_timeout: Duration,
    pub wait_timeout: Duration,
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            chrome_path: config.chrome_path.clone(),
            chromedriver_path: config.chromedriver_path.clone(),
            driver_port: config.driver_port,
            headless: config.headless,
            python_bin: config.python_bin.clone(),
            exec_timeout: Duration::from_secs(config.exec_timeout_secs),
            wait_timeout: Duration::from_secs(config.wait_timeout_secs),
        }
    }
}

/// The single live browser session.
pub struct SessionWrapper {
    client: Option<Client>,
    driver: Option<Child>,
    evaluator: PythonEvaluator,
    binding: SessionBinding,
    wait_timeout: Duration,
}

impl SessionWrapper {
    /// Locate browser and driver binaries, launch chromedriver, and start a
    /// headless session. Any failure here is fatal to application start.
    pub async fn open(config: SessionConfig) -> Result<Self, SessionError> {
        let chrome = find_binary(
            config.chrome_path.as_deref(),
            CHROME_PATHS,
            "google-chrome-stable",
            "browser",
        )?;
        info!("Using browser binary at {}", chrome.display());

        let driver_bin = find_binary(
            config.chromedriver_path.as_deref(),
            DRIVER_PATHS,
            "chromedriver",
            "chromedriver",
        )?;
        ensure_executable(&driver_bin);
        info!("Using chromedriver at {}", driver_bin.display());

        let mut cmd = Command::new(&driver_bin);
        cmd.arg(format!("--port={}", config.driver_port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let driver = cmd
            .spawn()
            .map_err(|e| SessionError::Setup(format!("failed to launch chromedriver: {e}")))?;

        let webdriver_url = format!("http://127.0.0.1:{}", config.driver_port);
        wait_for_driver(&webdriver_url, Duration::from_secs(15)).await?;

        let mut args = vec![
            Value::String("--no-sandbox".to_string()),
            Value::String("--disable-dev-shm-usage".to_string()),
        ];
        if config.headless {
            args.push(Value::String("--headless=new".to_string()));
        }

        let mut chrome_options = Map::new();
        chrome_options.insert("args".to_string(), Value::Array(args));
        chrome_options.insert(
            "binary".to_string(),
            Value::String(chrome.to_string_lossy().into_owned()),
        );

        let mut capabilities = Map::new();
        capabilities.insert(
            "goog:chromeOptions".to_string(),
            Value::Object(chrome_options),
        );

        let mut builder = ClientBuilder::rustls()
            .map_err(|e| SessionError::Setup(format!("failed to initialize TLS connector: {e}")))?;
        builder.capabilities(capabilities);

        let client = builder.connect(&webdriver_url).await.map_err(|e| {
            SessionError::Setup(format!("failed to start browser session: {e}"))
        })?;

        let session_id = client
            .session_id()
            .await
            .map_err(|e| SessionError::Setup(format!("failed to read session id: {e}")))?
            .ok_or_else(|| SessionError::Setup("browser session has no id".to_string()))?;

        info!("Browser session {} ready", session_id);

        Ok(Self {
            client: Some(client),
            driver: Some(driver),
            evaluator: PythonEvaluator::new(config.python_bin, config.exec_timeout),
            binding: SessionBinding {
                webdriver_url,
                session_id,
            },
            wait_timeout: config.wait_timeout,
        })
    }

    fn client(&self) -> Result<&Client, SessionError> {
        self.client
            .as_ref()
            .ok_or_else(|| SessionError::Setup("browser session is closed".to_string()))
    }

    /// Navigate to `url`, prefixing `https://` when no scheme is given.
    pub async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        let url = normalize_url(url);
        debug!("Navigating to {}", url);
        self.client()?
            .goto(&url)
            .await
            .map_err(|e| SessionError::Navigation(format!("failed to load {url}: {e}")))
    }

    /// Execute a script in the page context and return its value.
    pub async fn run_script(&self, code: &str) -> Result<Value, SessionError> {
        self.client()?
            .execute(code, vec![])
            .await
            .map_err(|e| SessionError::Script(e.to_string()))
    }

    /// Execute host-side code with the tool parameters and a handle to this
    /// session bound into it.
    pub async fn run_local_code(
        &self,
        code: &str,
        params: &HashMap<String, String>,
    ) -> Result<ExecOutcome, SessionError> {
        // fail fast instead of handing a dead endpoint to the subprocess
        self.client()?;
        self.evaluator.eval(code, params, &self.binding).await
    }

    /// Poll until an element matching the CSS `selector` appears.
    pub async fn wait_for_element(
        &self,
        selector: &str,
        timeout: Option<Duration>,
    ) -> Result<Element, SessionError> {
        let timeout = timeout.unwrap_or(self.wait_timeout);
        self.client()?
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(selector))
            .await
            .map_err(|_| SessionError::Timeout {
                selector: selector.to_string(),
                timeout_secs: timeout.as_secs(),
            })
    }

    /// Current rendered document markup.
    pub async fn page_markup(&self) -> Result<String, SessionError> {
        self.client()?
            .source()
            .await
            .map_err(|e| SessionError::Script(format!("failed to read page source: {e}")))
    }

    /// Terminate the session and the driver process. Idempotent; safe to
    /// call multiple times and on a session that never fully opened.
    pub async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                warn!("Browser session close failed: {}", e);
            }
        }
        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.kill().await {
                warn!("Chromedriver kill failed: {}", e);
            }
        }
    }
}

/// Resolve a binary: explicit override, then well-known paths, then a
/// system lookup by name.
fn find_binary(
    override_path: Option<&str>,
    fixed_paths: &[&str],
    lookup_name: &str,
    label: &str,
) -> Result<PathBuf, SessionError> {
    if let Some(path) = override_path {
        let path = Path::new(path);
        if is_executable_file(path) {
            return Ok(path.to_path_buf());
        }
        return Err(SessionError::Setup(format!(
            "configured {label} binary {} is missing or not executable",
            path.display()
        )));
    }

    for candidate in fixed_paths {
        let path = Path::new(candidate);
        if is_executable_file(path) {
            return Ok(path.to_path_buf());
        }
    }

    which::which(lookup_name).map_err(|_| {
        SessionError::Setup(format!(
            "could not find a {label} binary; ensure one is installed"
        ))
    })
}

fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Add execute bits to the driver binary when missing. Failure is only a
/// warning; the spawn itself will surface a real permission problem.
fn ensure_executable(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(path) {
            Ok(metadata) => {
                let mut permissions = metadata.permissions();
                let mode = permissions.mode();
                if mode & 0o111 != 0o111 {
                    permissions.set_mode(mode | 0o111);
                    if let Err(e) = std::fs::set_permissions(path, permissions) {
                        warn!(
                            "Could not set executable permissions on {}: {}",
                            path.display(),
                            e
                        );
                    }
                }
            }
            Err(e) => warn!("Could not stat {}: {}", path.display(), e),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

/// Wait for the spawned chromedriver to answer on its status endpoint.
async fn wait_for_driver(webdriver_url: &str, limit: Duration) -> Result<(), SessionError> {
    let http = reqwest::Client::new();
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if let Ok(resp) = http.get(format!("{webdriver_url}/status")).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(SessionError::Setup(format!(
                "chromedriver did not become ready at {webdriver_url}"
            )));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn normalize_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}
