//! Storage adaptor trait implemented by every backend
//!
//! One adaptor instance is bound to a namespace and a default tenant at
//! construction. All backends implement every operation with identical
//! external semantics; ordering inside a page is stable per backend but not
//! specified across backends.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreResult;
use crate::model::{
    BatchAppendReceipt, EntryQuery, Log, LogEntry, LogPatch, LogSearchQuery, Page, PageRequest,
    PurgeOutcome, SearchHit,
};

/// Abstract interface over a log storage backend.
///
/// Capability groups:
/// - lifecycle (`initialize`/`close`)
/// - raw/legacy blob entries keyed directly by log name
/// - structured log metadata CRUD
/// - structured entries requiring a pre-existing log
/// - cross-log search
/// - retention purge by server-side creation instant
#[async_trait]
pub trait StorageAdaptor: Debug + Send + Sync + 'static {
    /// Idempotently create whatever the backend needs (directories, files,
    /// indexes, connections) before serving operations.
    async fn initialize(&self) -> StoreResult<()>;

    /// Release backend resources. Adaptors are permissive about use after
    /// close: the next operation reinitializes.
    async fn close(&self) -> StoreResult<()>;

    // --- raw/legacy entry storage ------------------------------------------

    /// Store a raw entry under `log_name`, generating an id when `entry_id`
    /// is absent. The payload goes through the legacy JSON coercion shim.
    /// Returns the entry id.
    async fn store_log_entry(
        &self,
        entry_id: Option<String>,
        log_name: &str,
        data: Value,
        search_tokens: Vec<String>,
    ) -> StoreResult<String>;

    /// Fetch one raw entry; `None` when the log or entry is missing.
    async fn get_log_entry_by_id(
        &self,
        log_name: &str,
        entry_id: &str,
    ) -> StoreResult<Option<LogEntry>>;

    /// Replace an entry's payload and refresh its timestamp. Returns whether
    /// the entry existed.
    async fn update_log_entry_by_id(
        &self,
        log_name: &str,
        entry_id: &str,
        data: Value,
    ) -> StoreResult<bool>;

    /// Delete one entry. Returns whether it existed.
    async fn delete_log_entry_by_id(&self, log_name: &str, entry_id: &str) -> StoreResult<bool>;

    /// List up to `limit` (default 100) entries of `log_name`.
    async fn get_logs_by_name(
        &self,
        log_name: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<LogEntry>>;

    /// List up to `limit` (default 100) log names with at least one entry.
    async fn get_log_names(&self, limit: Option<usize>) -> StoreResult<Vec<String>>;

    /// Remove every entry of `log_name`, returning how many were removed.
    /// Log metadata, if any, is left in place.
    async fn clear_log(&self, log_name: &str) -> StoreResult<u64>;

    // --- structured log CRUD -----------------------------------------------

    /// Create a log, defaulting `id`/`created_at`/`updated_at`/`tenant_id`
    /// when absent. Fails with `LogAlreadyExists` on a name collision within
    /// the tenant.
    async fn create_log(&self, log: Log) -> StoreResult<Log>;

    /// All logs of the bound tenant.
    async fn get_logs(&self) -> StoreResult<Vec<Log>>;

    /// One log by name, `None` when absent.
    async fn get_log(&self, name: &str) -> StoreResult<Option<Log>>;

    /// Partially update a log, refreshing `updated_at`. Fails with
    /// `LogNotFound` when the log does not exist.
    async fn update_log(&self, patch: LogPatch) -> StoreResult<Log>;

    /// Delete a log and cascade-delete all of its entries. Returns whether
    /// the log existed.
    async fn delete_log(&self, name: &str) -> StoreResult<bool>;

    // --- structured entry operations ---------------------------------------

    /// Append an entry to an existing log, returning the assigned id.
    /// Fails with `LogNotFound` when the log does not exist.
    async fn append_log_entry(&self, log_name: &str, entry: LogEntry) -> StoreResult<String>;

    /// Append several entries to an existing log in input order.
    async fn batch_append_log_entries(
        &self,
        log_name: &str,
        entries: Vec<LogEntry>,
    ) -> StoreResult<BatchAppendReceipt>;

    /// Page through an existing log's entries (default page size 10).
    async fn get_log_entries(
        &self,
        log_name: &str,
        page: PageRequest,
    ) -> StoreResult<Page<LogEntry>>;

    /// One entry of an existing log, `None` when the entry is absent.
    async fn get_log_entry(&self, log_name: &str, entry_id: &str)
    -> StoreResult<Option<LogEntry>>;

    /// Filtered, paginated search within an existing log.
    async fn search_log_entries(
        &self,
        log_name: &str,
        query: EntryQuery,
    ) -> StoreResult<Page<LogEntry>>;

    // --- cross-log search --------------------------------------------------

    /// Search entries across all logs of the namespace. Lenient: an unknown
    /// `log_name` filter simply yields no hits.
    async fn search_logs(&self, query: LogSearchQuery) -> StoreResult<Vec<SearchHit>>;

    // --- retention ---------------------------------------------------------

    /// Count entries whose server-side creation instant is at or before
    /// `cutoff_ms`.
    async fn count_expired_entries(&self, cutoff_ms: u64) -> StoreResult<u64>;

    /// Purge up to `batch_size` entries created at or before `cutoff_ms`,
    /// oldest first. Individual deletion failures are logged and skipped;
    /// the outcome counts successes only. Entries created after the cutoff
    /// snapshot are never purged.
    async fn purge_expired_entries(
        &self,
        cutoff_ms: u64,
        batch_size: usize,
    ) -> StoreResult<PurgeOutcome>;
}

#[async_trait]
impl<T: StorageAdaptor> StorageAdaptor for Arc<T> {
    async fn initialize(&self) -> StoreResult<()> {
        (**self).initialize().await
    }

    async fn close(&self) -> StoreResult<()> {
        (**self).close().await
    }

    async fn store_log_entry(
        &self,
        entry_id: Option<String>,
        log_name: &str,
        data: Value,
        search_tokens: Vec<String>,
    ) -> StoreResult<String> {
        (**self)
            .store_log_entry(entry_id, log_name, data, search_tokens)
            .await
    }

    async fn get_log_entry_by_id(
        &self,
        log_name: &str,
        entry_id: &str,
    ) -> StoreResult<Option<LogEntry>> {
        (**self).get_log_entry_by_id(log_name, entry_id).await
    }

    async fn update_log_entry_by_id(
        &self,
        log_name: &str,
        entry_id: &str,
        data: Value,
    ) -> StoreResult<bool> {
        (**self)
            .update_log_entry_by_id(log_name, entry_id, data)
            .await
    }

    async fn delete_log_entry_by_id(&self, log_name: &str, entry_id: &str) -> StoreResult<bool> {
        (**self).delete_log_entry_by_id(log_name, entry_id).await
    }

    async fn get_logs_by_name(
        &self,
        log_name: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<LogEntry>> {
        (**self).get_logs_by_name(log_name, limit).await
    }

    async fn get_log_names(&self, limit: Option<usize>) -> StoreResult<Vec<String>> {
        (**self).get_log_names(limit).await
    }

    async fn clear_log(&self, log_name: &str) -> StoreResult<u64> {
        (**self).clear_log(log_name).await
    }

    async fn create_log(&self, log: Log) -> StoreResult<Log> {
        (**self).create_log(log).await
    }

    async fn get_logs(&self) -> StoreResult<Vec<Log>> {
        (**self).get_logs().await
    }

    async fn get_log(&self, name: &str) -> StoreResult<Option<Log>> {
        (**self).get_log(name).await
    }

    async fn update_log(&self, patch: LogPatch) -> StoreResult<Log> {
        (**self).update_log(patch).await
    }

    async fn delete_log(&self, name: &str) -> StoreResult<bool> {
        (**self).delete_log(name).await
    }

    async fn append_log_entry(&self, log_name: &str, entry: LogEntry) -> StoreResult<String> {
        (**self).append_log_entry(log_name, entry).await
    }

    async fn batch_append_log_entries(
        &self,
        log_name: &str,
        entries: Vec<LogEntry>,
    ) -> StoreResult<BatchAppendReceipt> {
        (**self).batch_append_log_entries(log_name, entries).await
    }

    async fn get_log_entries(
        &self,
        log_name: &str,
        page: PageRequest,
    ) -> StoreResult<Page<LogEntry>> {
        (**self).get_log_entries(log_name, page).await
    }

    async fn get_log_entry(
        &self,
        log_name: &str,
        entry_id: &str,
    ) -> StoreResult<Option<LogEntry>> {
        (**self).get_log_entry(log_name, entry_id).await
    }

    async fn search_log_entries(
        &self,
        log_name: &str,
        query: EntryQuery,
    ) -> StoreResult<Page<LogEntry>> {
        (**self).search_log_entries(log_name, query).await
    }

    async fn search_logs(&self, query: LogSearchQuery) -> StoreResult<Vec<SearchHit>> {
        (**self).search_logs(query).await
    }

    async fn count_expired_entries(&self, cutoff_ms: u64) -> StoreResult<u64> {
        (**self).count_expired_entries(cutoff_ms).await
    }

    async fn purge_expired_entries(
        &self,
        cutoff_ms: u64,
        batch_size: usize,
    ) -> StoreResult<PurgeOutcome> {
        (**self).purge_expired_entries(cutoff_ms, batch_size).await
    }
}
