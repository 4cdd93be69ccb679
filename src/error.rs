//! Error types for each stage of a run.
//!
//! Only [`ProfileFileError`] and [`SettingsError`] abort a run. Everything else
//! is contained where it happens: a bad profile entry is skipped, an
//! unreachable site is skipped, and a failed save still returns the run's
//! results.

use std::path::PathBuf;
use thiserror::Error;

/// A single malformed entry in the profile file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("profile #{index}: {source}")]
    Malformed {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("profile #{index} ({name}): missing required field `{field}`")]
    MissingField {
        index: usize,
        name: String,
        field: &'static str,
    },

    #[error("profile #{index} ({name}): no extraction directives")]
    NoDirectives { index: usize, name: String },

    #[error("profile #{index} ({name}): both selector and container directives given")]
    ConflictingDirectives { index: usize, name: String },

    #[error("profile #{index} ({name}): invalid url `{url}`: {source}")]
    InvalidUrl {
        index: usize,
        name: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("profile #{index} ({name}): invalid selector `{selector}`: {reason}")]
    InvalidSelector {
        index: usize,
        name: String,
        selector: String,
        reason: String,
    },
}

/// The profile file as a whole could not be used.
#[derive(Debug, Error)]
pub enum ProfileFileError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a JSON array of profiles: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A listing page could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
}

/// The history could not be written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serializing history: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("replacing {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
}

/// The settings file could not be used.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A push notification was not accepted.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("push rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}
