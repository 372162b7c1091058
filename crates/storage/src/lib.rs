//! Storage adaptor contract for logvault
//!
//! This crate defines the interface every storage backend must implement,
//! along with the shared data model, error type, and pagination helpers.
//! Backends live in sibling crates; only the factory knows concrete types.

pub mod adaptor;
pub mod coerce;
pub mod error;
pub mod model;

pub use adaptor::StorageAdaptor;
pub use error::{StoreError, StoreResult};
pub use model::{
    AppendedEntry, BatchAppendReceipt, DEFAULT_ENTRY_PAGE_LIMIT, DEFAULT_RAW_LIMIT, EncryptionInfo,
    EntryQuery, Log, LogEntry, LogPatch, LogSearchQuery, Page, PageRequest, PurgeOutcome,
    SearchHit,
};

use std::time::{SystemTime, UNIX_EPOCH};

/// Constant outermost key/document prefix shared by all backends.
pub const SERVER_NAMESPACE: &str = "logserver";

/// Current wall-clock time as epoch milliseconds.
///
/// This is the server-side creation instant recorded for retention purging.
/// It is kept separate from the logical entry `timestamp`, which clients may
/// supply pre-encrypted and which the server never orders by.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a new entry or log id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
