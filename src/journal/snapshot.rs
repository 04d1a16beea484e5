//! Periodic full-state dumps, keyed by journal sequence, wrapped in a
//! checksum-validated package.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::JournalError;
use crate::book::BookSnapshot;
use crate::hedge::HedgeBaseline;
use crate::position::Account;
use crate::types::{Price, TimestampMs};

/// Format version for checksum-enabled exchange snapshots.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// One persisted mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkEntry {
    /// Symbol.
    pub symbol: String,
    /// Mark in quote minor units.
    pub price: Price,
    /// Input timestamp behind the mark.
    pub ts_ms: TimestampMs,
}

/// A full capture of core state at a journal sequence point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeSnapshot {
    /// Journal sequence at capture time.
    pub seq: u64,
    /// Capture time.
    pub ts_ms: TimestampMs,
    /// Last order id handed out.
    pub last_order_id: u64,
    /// Last trade id handed out.
    pub last_trade_id: u64,
    /// Every book's resting state.
    pub books: Vec<BookSnapshot>,
    /// Every account, positions included.
    pub accounts: Vec<Account>,
    /// Hedge baselines per hedgeable symbol.
    pub hedge: Vec<HedgeBaseline>,
    /// Last-known marks.
    pub marks: Vec<MarkEntry>,
}

/// Wrapper providing checksum validation for [`ExchangeSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPackage {
    /// Version of the snapshot schema.
    pub version: u32,
    /// Snapshot payload.
    pub snapshot: ExchangeSnapshot,
    /// Hex-encoded SHA-256 of the serialized snapshot.
    pub checksum: String,
}

impl SnapshotPackage {
    /// Package a snapshot, computing its checksum.
    ///
    /// # Errors
    /// [`JournalError::SerializationError`].
    pub fn new(snapshot: ExchangeSnapshot) -> Result<Self, JournalError> {
        let checksum = Self::compute_checksum(&snapshot)?;
        Ok(Self {
            version: SNAPSHOT_FORMAT_VERSION,
            snapshot,
            checksum,
        })
    }

    /// Serialize the package to JSON.
    ///
    /// # Errors
    /// [`JournalError::SerializationError`].
    pub fn to_json(&self) -> Result<String, JournalError> {
        serde_json::to_string(self).map_err(|error| JournalError::SerializationError {
            message: error.to_string(),
        })
    }

    /// Deserialize a package from JSON.
    ///
    /// # Errors
    /// [`JournalError::DeserializationError`].
    pub fn from_json(data: &str) -> Result<Self, JournalError> {
        serde_json::from_str(data).map_err(|error| JournalError::DeserializationError {
            message: error.to_string(),
        })
    }

    /// Validate the version and checksum.
    ///
    /// # Errors
    /// [`JournalError::UnsupportedVersion`] or
    /// [`JournalError::ChecksumMismatch`].
    pub fn validate(&self) -> Result<(), JournalError> {
        if self.version != SNAPSHOT_FORMAT_VERSION {
            return Err(JournalError::UnsupportedVersion {
                found: self.version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }
        let computed = Self::compute_checksum(&self.snapshot)?;
        if computed != self.checksum {
            return Err(JournalError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual: computed,
            });
        }
        Ok(())
    }

    /// Consume the package, returning the validated snapshot.
    ///
    /// # Errors
    /// Propagates [`SnapshotPackage::validate`].
    pub fn into_snapshot(self) -> Result<ExchangeSnapshot, JournalError> {
        self.validate()?;
        Ok(self.snapshot)
    }

    fn compute_checksum(snapshot: &ExchangeSnapshot) -> Result<String, JournalError> {
        let payload =
            serde_json::to_vec(snapshot).map_err(|error| JournalError::SerializationError {
                message: error.to_string(),
            })?;
        let mut hasher = Sha256::new();
        hasher.update(payload);
        let checksum_bytes = hasher.finalize();
        Ok(checksum_bytes
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>())
    }
}
