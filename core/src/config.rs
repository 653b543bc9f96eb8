//! Defaults applied to every new task.
//!
//! `TaskConfig` is plain data with a default for every field, so a partial
//! JSON document (or none at all) yields a working configuration. The C
//! bridge passes its configuration through `TaskConfig::from_json`.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::TaskError;

/// Default memory capture ceiling: 200 KiB.
pub const DEFAULT_BUFFER_CEILING: usize = 200 * 1024;

/// Engine-level defaults for a task.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskConfig {
    pub connect_timeout_secs: u64,
    /// Upper bound on waiting for the response head once connected.
    pub response_timeout_secs: u64,
    /// Abort when fewer than `low_speed_limit` bytes per second arrive,
    /// averaged over `low_speed_time_secs`.
    pub low_speed_limit: u64,
    pub low_speed_time_secs: u64,
    pub buffer_ceiling: usize,
    /// Directory for file-capture temp files. `None` means the system temp
    /// directory.
    pub temp_dir: Option<PathBuf>,
    pub max_redirects: u32,
    pub fail_on_error_status: bool,
    pub user_agent: String,
    pub tls: TlsPolicy,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            response_timeout_secs: 30,
            low_speed_limit: 1024,
            low_speed_time_secs: 30,
            buffer_ceiling: DEFAULT_BUFFER_CEILING,
            temp_dir: None,
            max_redirects: 10,
            fail_on_error_status: false,
            user_agent: concat!("nettask/", env!("CARGO_PKG_VERSION")).to_string(),
            tls: TlsPolicy::default(),
        }
    }
}

impl TaskConfig {
    /// Parse a JSON configuration. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, TaskError> {
        let config: TaskConfig = serde_json::from_str(json)
            .map_err(|e| TaskError::config("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), TaskError> {
        if self.buffer_ceiling < 2 {
            return Err(TaskError::config(
                "buffer_ceiling",
                "must leave room for at least one byte and a terminator",
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(TaskError::config("connect_timeout_secs", "must be positive"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// TLS trust settings handed to the transport as-is.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TlsPolicy {
    pub verify_peer: bool,
    /// PEM bundle replacing the built-in roots.
    pub ca_bundle: Option<PathBuf>,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self {
            verify_peer: true,
            ca_bundle: None,
        }
    }
}
