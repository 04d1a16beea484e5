//! Snapshot/journal hook: the write-ahead contract the external
//! persistence adapter satisfies, in-memory implementations, and the
//! checksummed full-state snapshot format.

mod error;
mod ring;
mod snapshot;
mod types;

pub use error::JournalError;
pub use ring::{Journal, MemoryJournal, RingJournal};
pub use snapshot::{ExchangeSnapshot, MarkEntry, SNAPSHOT_FORMAT_VERSION, SnapshotPackage};
pub use types::{JournalEvent, JournaledEvent, TerminalReason};
