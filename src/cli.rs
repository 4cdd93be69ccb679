//! Command-line interface definitions.
//!
//! Flags override the matching keys of the settings file. Every option can
//! also be given through an environment variable.

use crate::settings::Settings;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Crawl once and print new records
/// listing_watch
///
/// # Push new records through the configured ServerChan keys
/// listing_watch --push
///
/// # Verbose run against another settings file
/// listing_watch -c ./watch.yaml --log debug
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML settings file
    #[arg(short, long, env = "LISTING_WATCH_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Log level (CRITICAL, ERROR, WARNING, INFO, DEBUG, NOTSET); overrides the settings file
    #[arg(short, long, env = "LISTING_WATCH_LOG")]
    pub log: Option<String>,

    /// Shorthand for `--log DEBUG`
    #[arg(long)]
    pub debug: bool,

    /// Deliver new records as push notifications instead of printing them
    #[arg(short, long)]
    pub push: bool,

    /// Site profile file
    #[arg(long, env = "LISTING_WATCH_WEBSITES")]
    pub websites: Option<PathBuf>,

    /// Record history file
    #[arg(long, env = "LISTING_WATCH_HISTORY")]
    pub history: Option<PathBuf>,

    /// HTML report template
    #[arg(long, env = "LISTING_WATCH_TEMPLATE")]
    pub template: Option<PathBuf>,

    /// HTML report output path
    #[arg(short, long, env = "LISTING_WATCH_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Number of sites fetched at once
    #[arg(long, env = "LISTING_WATCH_CONCURRENCY")]
    pub concurrency: Option<usize>,
}

impl Cli {
    /// The log level name to use, if the command line picks one.
    pub fn log_level(&self) -> Option<&str> {
        match (&self.log, self.debug) {
            (Some(level), _) => Some(level.as_str()),
            (None, true) => Some("DEBUG"),
            (None, false) => None,
        }
    }

    /// Overwrite the settings the command line names.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(level) = self.log_level() {
            settings.log_level = Some(level.to_string());
        }
        if let Some(path) = &self.websites {
            settings.websites = path.clone();
        }
        if let Some(path) = &self.history {
            settings.history = path.clone();
        }
        if let Some(path) = &self.template {
            settings.template = path.clone();
        }
        if let Some(path) = &self.output {
            settings.output = path.clone();
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = concurrency;
        }
    }
}
