//! Configuration management

use anyhow::Result;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for server configurations
    pub servers_root: PathBuf,

    /// Browser binary override (skips discovery when set)
    pub chrome_path: Option<String>,

    /// Chromedriver binary override (skips discovery when set)
    pub chromedriver_path: Option<String>,

    /// Port the spawned chromedriver listens on
    pub driver_port: u16,

    /// Interpreter used for host-side code cells
    pub python_bin: String,

    /// Time limit for one host-side code execution, in seconds
    pub exec_timeout_secs: u64,

    /// Default element-wait timeout, in seconds
    pub wait_timeout_secs: u64,

    /// Launch the browser headless
    pub headless: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let servers_root = std::env::var("TOOLBENCH_SERVERS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("servers"));

        let chrome_path = std::env::var("CHROME_PATH").ok();
        let chromedriver_path = std::env::var("CHROMEDRIVER_PATH").ok();

        let driver_port = std::env::var("TOOLBENCH_DRIVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(9515);

        let python_bin =
            std::env::var("TOOLBENCH_PYTHON").unwrap_or_else(|_| "python3".to_string());

        let exec_timeout_secs = std::env::var("TOOLBENCH_EXEC_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let wait_timeout_secs = std::env::var("TOOLBENCH_WAIT_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let headless = std::env::var("TOOLBENCH_HEADLESS")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Ok(Self {
            servers_root,
            chrome_path,
            chromedriver_path,
            driver_port,
            python_bin,
            exec_timeout_secs,
            wait_timeout_secs,
            headless,
        })
    }
}
