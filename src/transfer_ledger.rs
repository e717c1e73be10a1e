// transfer_ledger.rs
// Append/update/delete log of file-transfer records
//
// The ledger is the single owner of transfer records. Records move through a
// forward-only status lifecycle and are never resurrected after deletion:
//
//   (none)  -> pending     file staged for send, or inbound file frame received
//   pending -> sending     local send begins transmission
//   sending -> completed   transport accepted the payload (sender side)
//   pending -> completed   full frame decoded (receiver side)
//   pending/sending -> failed      transport rejected the send, or packaging error
//   pending -> cancelled   user cancellation before the send starts
//
// All ledger operations are synchronous and total: updating or deleting an
// unknown id is a silent no-op.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Lifecycle status of one transfer record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Created, transmission not yet begun
    Pending,

    /// Payload handed to the transport, acceptance not yet confirmed
    Sending,

    /// Transport accepted the payload (sender) or the frame fully decoded (receiver)
    Completed,

    /// Transport rejected the send, or a local packaging error occurred
    Failed,

    /// Cancelled by the user before the send started
    Cancelled,
}

impl TransferStatus {
    /// Terminal states are never re-entered into pending/sending.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }

    /// Whether moving to `next` is a status-preserving-or-forward transition.
    pub fn can_advance_to(&self, next: TransferStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            TransferStatus::Pending => matches!(
                next,
                TransferStatus::Sending
                    | TransferStatus::Completed
                    | TransferStatus::Failed
                    | TransferStatus::Cancelled
            ),
            TransferStatus::Sending => {
                matches!(next, TransferStatus::Completed | TransferStatus::Failed)
            }
            _ => false,
        }
    }
}

/// Direction of a transfer relative to the local session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Sent,
    Received,
}

/// One file transfer's lifecycle, owned exclusively by the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    /// Unique record id
    pub id: String,
    pub file_name: String,
    /// Size in bytes
    pub file_size: u64,
    /// MIME type
    pub file_type: String,
    pub direction: TransferDirection,
    /// Remote peer on the other end of the transfer
    pub peer_id: String,
    pub status: TransferStatus,
    /// Creation time, Unix epoch milliseconds
    pub timestamp: i64,
    /// 0..=100, monotone while sending, never reset
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// SHA-256 hex of the payload, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Local path for received files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl TransferRecord {
    /// Create a fresh pending record with a random id and the current time.
    pub fn new(
        file_name: &str,
        file_size: u64,
        file_type: &str,
        direction: TransferDirection,
        peer_id: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            file_size,
            file_type: file_type.to_string(),
            direction,
            peer_id: peer_id.to_string(),
            status: TransferStatus::Pending,
            timestamp: Utc::now().timestamp_millis(),
            progress: 0,
            error: None,
            checksum: None,
            path: None,
        }
    }
}

/// Partial update merged into an existing record. Unspecified fields are
/// left untouched.
#[derive(Debug, Clone, Default)]
pub struct TransferUpdate {
    pub status: Option<TransferStatus>,
    pub progress: Option<u8>,
    pub error: Option<String>,
    pub checksum: Option<String>,
    pub path: Option<String>,
}

/// The transfer ledger, most-recent-first
#[derive(Debug, Default)]
pub struct TransferLedger {
    transfers: Vec<TransferRecord>,
}

impl TransferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a record; the newest transfer is always first.
    pub fn add(&mut self, record: TransferRecord) {
        debug!(
            "Ledger add: {} {} ({} bytes, {:?})",
            record.id, record.file_name, record.file_size, record.direction
        );
        self.transfers.insert(0, record);
    }

    /// Merge `update` into the record with `id`. Unknown ids are a silent
    /// no-op. Backward status transitions and non-monotone progress are
    /// dropped field-wise; the rest of the update still applies.
    pub fn update(&mut self, id: &str, update: TransferUpdate) {
        let Some(record) = self.transfers.iter_mut().find(|t| t.id == id) else {
            return;
        };

        if let Some(next) = update.status {
            if record.status.can_advance_to(next) {
                record.status = next;
            } else {
                debug!(
                    "Ledger: ignoring backward transition {:?} -> {:?} for {}",
                    record.status, next, id
                );
            }
        }
        if let Some(progress) = update.progress {
            if progress > record.progress {
                record.progress = progress.min(100);
            }
        }
        if let Some(error) = update.error {
            record.error = Some(error);
        }
        if let Some(checksum) = update.checksum {
            record.checksum = Some(checksum);
        }
        if let Some(path) = update.path {
            record.path = Some(path);
        }
    }

    /// Remove a record by id. Unknown ids are a silent no-op; a deleted
    /// record is never resurrected.
    pub fn delete(&mut self, id: &str) {
        self.transfers.retain(|t| t.id != id);
    }

    /// Empty the ledger.
    pub fn clear(&mut self) {
        self.transfers.clear();
    }

    pub fn get(&self, id: &str) -> Option<&TransferRecord> {
        self.transfers.iter().find(|t| t.id == id)
    }

    /// All records, most-recent-first.
    pub fn records(&self) -> &[TransferRecord] {
        &self.transfers
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    // Convenience transitions used by the send/receive flows.

    /// pending -> sending
    pub fn begin_sending(&mut self, id: &str) {
        self.update(
            id,
            TransferUpdate {
                status: Some(TransferStatus::Sending),
                ..Default::default()
            },
        );
    }

    /// Terminal success: progress pinned to 100.
    pub fn complete(&mut self, id: &str, checksum: Option<String>, path: Option<String>) {
        self.update(
            id,
            TransferUpdate {
                status: Some(TransferStatus::Completed),
                progress: Some(100),
                checksum,
                path,
                ..Default::default()
            },
        );
    }

    /// Terminal failure: error recorded, progress left at its last value.
    pub fn fail(&mut self, id: &str, error: &str) {
        self.update(
            id,
            TransferUpdate {
                status: Some(TransferStatus::Failed),
                error: Some(error.to_string()),
                ..Default::default()
            },
        );
    }

    /// Monotone progress while sending.
    pub fn set_progress(&mut self, id: &str, progress: u8) {
        self.update(
            id,
            TransferUpdate {
                progress: Some(progress),
                ..Default::default()
            },
        );
    }

    /// pending -> cancelled. Has no effect once the send has started.
    pub fn cancel(&mut self, id: &str) {
        let still_pending = self
            .get(id)
            .map(|t| t.status == TransferStatus::Pending)
            .unwrap_or(false);
        if !still_pending {
            debug!("Ledger: cancel ignored for non-pending transfer {}", id);
            return;
        }
        self.update(
            id,
            TransferUpdate {
                status: Some(TransferStatus::Cancelled),
                ..Default::default()
            },
        );
    }
}
