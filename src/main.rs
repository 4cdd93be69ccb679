//! # Listing Watch
//!
//! Periodically crawls the article listing pages of a configurable set of
//! websites, keeps a deduplicated history of everything seen, and announces
//! what is new.
//!
//! ## Features
//!
//! - Per-site extraction rules: CSS selectors zipped by position, or
//!   container blocks with nested title and time lookups
//! - Bounded retry and charset detection for unreliable, non-UTF-8 sites
//! - A JSON history rewritten atomically on every run
//! - New records pushed through ServerChan or printed as Markdown
//! - A static HTML page rendered from the full history
//!
//! ## Usage
//!
//! ```sh
//! listing_watch -c config.yaml --push
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Profiles**: Load the site definitions
//! 2. **Crawl**: Fetch and extract every site, dropping repeats within the run
//! 3. **Dedup & persist**: Keep only records missing from history, merge, save
//! 4. **Output**: Deliver new records and rebuild the HTML report

use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod error;
mod extractor;
mod fetcher;
mod models;
mod notify;
mod outputs;
mod pipeline;
mod profiles;
mod settings;
mod store;
mod utils;

use cli::Cli;
use fetcher::{HttpFetcher, RetryFetch};
use notify::ServerChan;
use outputs::html;
use pipeline::Pipeline;
use settings::{Settings, level_directive};
use store::RecordStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let start_time = std::time::Instant::now();

    let args = Cli::parse();
    let loaded = Settings::load(&args.config)?;
    let settings_found = loaded.is_some();
    let mut settings = loaded.unwrap_or_default();
    args.apply(&mut settings);

    init_tracing(settings.log_level.as_deref(), settings.log_file.as_deref())?;
    info!("listing_watch starting up");
    if !settings_found {
        warn!(path = %args.config.display(), "Settings file not found; using defaults");
    }

    // ---- Profiles ----
    let profiles = match profiles::load(&settings.websites) {
        Ok(profiles) => profiles,
        Err(e) => {
            error!(error = %e, "Cannot load site profiles; aborting run");
            return Err(e.into());
        }
    };

    // ---- Crawl, dedupe, persist ----
    let mut store = RecordStore::open(&settings.history);
    let http = HttpFetcher::new(Duration::from_secs(settings.timeout_secs))?;
    let pipeline = Pipeline::new(
        RetryFetch::new(http, settings.retry.policy()),
        settings.concurrency,
    );
    let report = pipeline.run(&profiles, &mut store).await;
    info!(
        sites = report.sites_total,
        failed = report.sites_failed.len(),
        candidates = report.candidates,
        new = report.new_records.len(),
        persisted = report.persisted,
        "Crawl finished"
    );
    if !report.sites_failed.is_empty() {
        warn!(sites = ?report.sites_failed, "Some sites were skipped this run");
    }

    // ---- Deliver ----
    let client = reqwest::Client::new();
    let channels: Vec<ServerChan> = settings
        .serverchan
        .iter()
        .map(|account| ServerChan::new(account, client.clone()))
        .collect();
    notify::deliver(&report.new_records, &channels, args.push).await;

    // ---- Report ----
    if let Err(e) = html::write_report(store.records(), &settings.template, &settings.output).await
    {
        error!(path = %settings.output.display(), error = %e, "Failed to write HTML report");
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Run once"
    );
    Ok(())
}

/// Install the global subscriber.
///
/// `level` is a level name from the command line or settings; without one
/// `RUST_LOG` decides, falling back to `info`. With `log_file` set, logs are
/// appended there instead of going to stderr.
fn init_tracing(level: Option<&str>, log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let filter = match level {
        Some(name) => EnvFilter::new(level_directive(name)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let builder = tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339());

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}
