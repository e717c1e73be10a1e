// batch_transfer.rs
// Working view over an in-progress multi-file send
//
// The batch tracker is transient, UI-scoped bookkeeping, distinct from the
// permanent transfer ledger: an explicit file-selection list plus status and
// progress maps keyed by the composite `fileName-fileSize` key. Two files
// sharing a name but differing in size are independent batch entries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Composite key identifying one selected file within a batch.
pub fn file_key(file_name: &str, file_size: u64) -> String {
    format!("{}-{}", file_name, file_size)
}

/// Per-file status within a batch send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Sending,
    Completed,
    Failed,
}

/// One file in the batch selection list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFile {
    pub file_name: String,
    pub file_size: u64,
}

impl BatchFile {
    pub fn new(file_name: &str, file_size: u64) -> Self {
        Self {
            file_name: file_name.to_string(),
            file_size,
        }
    }

    pub fn key(&self) -> String {
        file_key(&self.file_name, self.file_size)
    }
}

/// Status tally across the current selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounts {
    pub pending: usize,
    pub sending: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Tracks aggregate progress and status for the files selected for one
/// multi-file send. Sole owner of the selection list and both maps.
#[derive(Debug, Default)]
pub struct BatchTracker {
    files: Vec<BatchFile>,
    status: HashMap<String, BatchStatus>,
    progress: HashMap<String, u8>,
}

impl BatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file to the selection. Re-adding the same name+size pair is a
    /// no-op; the selection list holds each composite key once.
    pub fn add_file(&mut self, file: BatchFile) {
        if self.files.iter().any(|f| f.key() == file.key()) {
            return;
        }
        self.files.push(file);
    }

    pub fn set_status(&mut self, key: &str, status: BatchStatus) {
        self.status.insert(key.to_string(), status);
    }

    pub fn set_progress(&mut self, key: &str, progress: u8) {
        self.progress.insert(key.to_string(), progress.min(100));
    }

    /// Status for a key; files with no entry yet are pending.
    pub fn status_of(&self, key: &str) -> BatchStatus {
        self.status.get(key).copied().unwrap_or(BatchStatus::Pending)
    }

    /// Progress for a key; files with no entry yet are at 0.
    pub fn progress_of(&self, key: &str) -> u8 {
        self.progress.get(key).copied().unwrap_or(0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.files.iter().any(|f| f.key() == key)
    }

    pub fn files(&self) -> &[BatchFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Mean progress over the selected files. An empty selection is 0, not
    /// NaN; files without a progress entry count as 0.
    pub fn overall_progress(&self) -> f64 {
        if self.files.is_empty() {
            return 0.0;
        }
        let sum: u64 = self
            .files
            .iter()
            .map(|f| self.progress_of(&f.key()) as u64)
            .sum();
        sum as f64 / self.files.len() as f64
    }

    /// Status tally over the selected files.
    pub fn counts(&self) -> BatchCounts {
        let mut counts = BatchCounts::default();
        for file in &self.files {
            match self.status_of(&file.key()) {
                BatchStatus::Pending => counts.pending += 1,
                BatchStatus::Sending => counts.sending += 1,
                BatchStatus::Completed => counts.completed += 1,
                BatchStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Remove a still-pending file from tracking. Cancellation is local
    /// bookkeeping only: it neither signals the peer nor aborts a send the
    /// transport has already accepted. Returns whether the file was removed.
    pub fn cancel(&mut self, key: &str) -> bool {
        if !self.contains(key) {
            return false;
        }
        if self.status_of(key) != BatchStatus::Pending {
            debug!("Batch: cancel ignored for non-pending file {}", key);
            return false;
        }
        self.files.retain(|f| f.key() != key);
        self.status.remove(key);
        self.progress.remove(key);
        true
    }

    /// Reset the selection list and both maps together. Partial clears are
    /// not supported.
    pub fn clear(&mut self) {
        self.files.clear();
        self.status.clear();
        self.progress.clear();
    }
}
