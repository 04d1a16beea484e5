//! Error types for the journal subsystem.

use std::fmt;

/// Errors that can occur within the journal subsystem.
#[derive(Debug)]
#[non_exhaustive]
pub enum JournalError {
    /// The in-memory ring is full: the external writer has fallen behind.
    /// Surfaces to submitters as retryable backpressure.
    RingFull {
        /// Configured ring capacity.
        capacity: usize,
    },

    /// The event payload could not be serialized.
    SerializationError {
        /// Underlying serialization error message.
        message: String,
    },

    /// The snapshot payload could not be deserialized.
    DeserializationError {
        /// Underlying deserialization error message.
        message: String,
    },

    /// Snapshot integrity check failed.
    ChecksumMismatch {
        /// Expected checksum value.
        expected: String,
        /// Actual checksum value computed from the payload.
        actual: String,
    },

    /// The snapshot format version is not supported.
    UnsupportedVersion {
        /// Version found in the package.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalError::RingFull { capacity } => {
                write!(f, "journal ring full (capacity {capacity})")
            }
            JournalError::SerializationError { message } => {
                write!(f, "journal serialization error: {message}")
            }
            JournalError::DeserializationError { message } => {
                write!(f, "journal deserialization error: {message}")
            }
            JournalError::ChecksumMismatch { expected, actual } => {
                write!(
                    f,
                    "snapshot checksum mismatch: expected {expected}, computed {actual}"
                )
            }
            JournalError::UnsupportedVersion { found, expected } => {
                write!(
                    f,
                    "unsupported snapshot version {found} (expected {expected})"
                )
            }
        }
    }
}

impl std::error::Error for JournalError {}
