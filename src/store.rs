//! The persisted history of every record ever accepted.
//!
//! The history is a pretty-printed JSON array, rewritten whole on each
//! successful merge. Writes go to a temporary file next to the history and
//! are then renamed over it, so a crash leaves either the old file or the new
//! one, never a mix.
//!
//! Records are ordered newest first by their raw `published_time` string,
//! and no two share a `(link, title)` pair.
//!
//! Only one run may use a given history file at a time; nothing here guards
//! against concurrent writers from other processes.

use crate::error::StoreError;
use crate::models::{Identity, Record};
use serde::Serialize;
use std::collections::HashSet;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

/// The loaded history plus where it lives on disk.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    history: Vec<Record>,
}

impl RecordStore {
    /// Open the history at `path`. Never fails; see [`load_history`].
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let history = load_history(&path);
        Self { path, history }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The history as currently held, newest first.
    pub fn records(&self) -> &[Record] {
        &self.history
    }

    /// The candidates not already in the history, newest first.
    ///
    /// Repeats within `candidates` collapse to their first occurrence. The
    /// store itself is not touched, so calling this twice gives the same answer.
    pub fn dedupe(&self, candidates: &[Record]) -> Vec<Record> {
        let mut seen: HashSet<Identity> = self.history.iter().map(Record::identity).collect();
        let mut fresh: Vec<Record> = candidates
            .iter()
            .filter(|record| seen.insert(record.identity()))
            .cloned()
            .collect();
        sort_newest_first(&mut fresh);
        fresh
    }

    /// Add `new_records` to the history, re-sort, and write it out.
    ///
    /// Records already in the history are dropped first, so the stored
    /// identities stay unique. Returns how many records were added.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file could not be replaced. The in-memory
    /// history is left as it was in that case.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub fn merge(&mut self, new_records: &[Record]) -> Result<usize, StoreError> {
        let fresh = self.dedupe(new_records);
        let added = fresh.len();

        let mut merged = Vec::with_capacity(self.history.len() + added);
        merged.extend(self.history.iter().cloned());
        merged.extend(fresh);
        sort_newest_first(&mut merged);

        write_atomic(&self.path, &merged)?;
        self.history = merged;

        if added > 0 {
            info!(added, total = self.history.len(), "Added new records to history");
        } else {
            debug!(total = self.history.len(), "No new records added to history");
        }
        Ok(added)
    }
}

/// Read the history at `path`.
///
/// A missing, empty, or unparseable file is treated as an empty history and
/// logged as a warning; a corrupt history never stops a run.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub fn load_history(path: &Path) -> Vec<Record> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("History file not found; starting empty");
            return Vec::new();
        }
        Err(e) => {
            warn!(error = %e, "History file unreadable; starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<Record>>(&content) {
        Ok(records) => {
            debug!(count = records.len(), "Loaded history");
            records
        }
        Err(e) => {
            warn!(error = %e, "History file empty or invalid; starting empty");
            Vec::new()
        }
    }
}

/// Stable sort by raw time, descending. Equal times keep their order.
pub fn sort_newest_first(records: &mut [Record]) {
    records.sort_by(|a, b| b.published_time.cmp(&a.published_time));
}

fn write_atomic(path: &Path, records: &[Record]) -> Result<(), StoreError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records.serialize(&mut ser)?;
    buf.push(b'\n');

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(&buf).map_err(write_err)?;
    if let Ok(existing) = std::fs::metadata(path) {
        tmp.as_file()
            .set_permissions(existing.permissions())
            .map_err(write_err)?;
    }
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|source| StoreError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
