//! Settings file loading and log level names.
//!
//! Settings come from a YAML file; every key is optional. See
//! [`Settings`] for the keys and their defaults.

use crate::error::SettingsError;
use crate::fetcher::RetryPolicy;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything the run can be configured with from file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log level name, e.g. `WARNING` or `debug`. Unset defers to `RUST_LOG`.
    pub log_level: Option<String>,
    /// Append logs here instead of writing to stderr.
    pub log_file: Option<PathBuf>,
    /// The site profile file.
    pub websites: PathBuf,
    /// The record history file.
    pub history: PathBuf,
    /// Template for the HTML report.
    pub template: PathBuf,
    /// Where the HTML report is written.
    pub output: PathBuf,
    /// How many sites may be fetched at once.
    pub concurrency: usize,
    /// Retry behaviour for listing page fetches.
    pub retry: RetrySettings,
    /// Request timeout for a single fetch attempt, in seconds.
    pub timeout_secs: u64,
    /// ServerChan keys to push new records to.
    pub serverchan: Vec<ServerChanSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: None,
            log_file: None,
            websites: PathBuf::from("websites.json"),
            history: PathBuf::from("data.json"),
            template: PathBuf::from("template.html"),
            output: PathBuf::from("index.html"),
            concurrency: 1,
            retry: RetrySettings::default(),
            timeout_secs: 30,
            serverchan: Vec::new(),
        }
    }
}

/// How the fetch delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: usize,
    pub delay_secs: u64,
    pub backoff: Backoff,
    pub max_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_secs: 5,
            backoff: Backoff::Fixed,
            max_delay_secs: 30,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        let delay = Duration::from_secs(self.delay_secs);
        match self.backoff {
            Backoff::Fixed => RetryPolicy::Fixed {
                attempts: self.attempts,
                delay,
            },
            Backoff::Exponential => RetryPolicy::Exponential {
                attempts: self.attempts,
                base_delay: delay,
                max_delay: Duration::from_secs(self.max_delay_secs),
            },
        }
    }
}

/// One ServerChan account. Unknown keys are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerChanSettings {
    pub send_key: String,
    #[serde(default)]
    pub channel: Option<u32>,
    #[serde(default)]
    pub openid: Option<String>,
}

impl Settings {
    /// Load settings from `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist, so the caller can
    /// fall back to defaults and say so once logging is running.
    pub fn load(path: &Path) -> Result<Option<Self>, SettingsError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if content.trim().is_empty() {
            return Ok(Some(Self::default()));
        }
        serde_yaml::from_str(&content)
            .map(Some)
            .map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// Map a log level name to a `tracing` filter directive.
///
/// Accepts the classic names (`CRITICAL`, `FATAL`, `ERROR`, `WARNING`,
/// `WARN`, `INFO`, `DEBUG`, `NOTSET`) in any case, plus `trace`. Anything
/// else is treated like `NOTSET` and shows everything.
pub fn level_directive(name: &str) -> &'static str {
    match name.trim().to_ascii_uppercase().as_str() {
        "CRITICAL" | "FATAL" | "ERROR" => "error",
        "WARNING" | "WARN" => "warn",
        "INFO" => "info",
        "DEBUG" => "debug",
        _ => "trace",
    }
}
