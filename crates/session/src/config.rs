// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

/// Seven days: the idle allowance for sessions that carry no metadata.
pub const DEFAULT_INACTIVITY_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Two minutes of warning before either expiry.
pub const DEFAULT_WARNING_MS: u64 = 2 * 60 * 1000;

/// Configuration for the session lifecycle monitor.
#[derive(Debug, Clone, Parser)]
#[command(name = "clinic-session", version, about = "Session lifecycle monitor")]
pub struct SessionConfig {
    /// Base URL of the clinic API (the refresh call is `POST {api_url}/auth/refresh`).
    #[arg(long, default_value = "http://127.0.0.1:8000/api", env = "CLINIC_API_URL")]
    pub api_url: String,

    /// Expiration poll interval in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "CLINIC_SESSION_POLL_MS")]
    pub poll_ms: u64,

    /// Minimum spacing between persisted activity writes, in milliseconds.
    #[arg(long, default_value_t = 60_000, env = "CLINIC_SESSION_ACTIVITY_THROTTLE_MS")]
    pub activity_throttle_ms: u64,

    /// Idle allowance used when the session carries no metadata.
    #[arg(long, default_value_t = DEFAULT_INACTIVITY_MS, env = "CLINIC_SESSION_DEFAULT_INACTIVITY_MS")]
    pub default_inactivity_ms: u64,

    /// Warning lead time used when the session carries no metadata.
    #[arg(long, default_value_t = DEFAULT_WARNING_MS, env = "CLINIC_SESSION_DEFAULT_WARNING_MS")]
    pub default_warning_ms: u64,

    /// Timeout for outbound API requests in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "CLINIC_SESSION_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Directory holding the persisted session store.
    #[arg(long, env = "CLINIC_SESSION_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Log filter (tracing `EnvFilter` syntax).
    #[arg(long, default_value = "info", env = "CLINIC_LOG_LEVEL")]
    pub log_level: String,

    /// Log format: `text` or `json`.
    #[arg(long, default_value = "text", env = "CLINIC_LOG_FORMAT")]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands of the `clinic-session` binary.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Watch the persisted session and enforce expiry (default).
    Monitor,
    /// Print the persisted session snapshot as JSON.
    Status,
    /// End the persisted session as a user logout.
    Logout,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000/api".to_owned(),
            poll_ms: 30_000,
            activity_throttle_ms: 60_000,
            default_inactivity_ms: DEFAULT_INACTIVITY_MS,
            default_warning_ms: DEFAULT_WARNING_MS,
            request_timeout_ms: 10_000,
            state_dir: None,
            log_level: "info".to_owned(),
            log_format: "text".to_owned(),
            command: None,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_ms == 0 {
            anyhow::bail!("--poll-ms must be greater than zero");
        }
        if self.activity_throttle_ms == 0 {
            anyhow::bail!("--activity-throttle-ms must be greater than zero");
        }
        if self.default_warning_ms >= self.default_inactivity_ms {
            anyhow::bail!("--default-warning-ms must be shorter than --default-inactivity-ms");
        }
        match self.log_format.as_str() {
            "text" | "json" => Ok(()),
            other => anyhow::bail!("invalid log format: {other}"),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn activity_throttle(&self) -> Duration {
        Duration::from_millis(self.activity_throttle_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Resolve the state directory.
    ///
    /// Checks `--state-dir`, then `$XDG_STATE_HOME/clinic/session`,
    /// then `$HOME/.local/state/clinic/session`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("clinic/session");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/clinic/session");
        }
        PathBuf::from(".clinic/session")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
