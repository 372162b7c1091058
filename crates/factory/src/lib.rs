//! Storage adaptor factory
//!
//! Selects and constructs a backend from configuration. This is the only
//! place that knows concrete backend types; everything above it holds a
//! [`Store`] (or anything else implementing [`StorageAdaptor`]) that it was
//! handed explicitly. There is deliberately no process-wide instance: the
//! caller owns the lifecycle and passes the store through constructors.

pub mod config;

pub use config::{BackendKind, RedisConfig, StoreConfig};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use logvault_storage::{
    BatchAppendReceipt, EntryQuery, Log, LogEntry, LogPatch, LogSearchQuery, Page, PageRequest,
    PurgeOutcome, SearchHit, StorageAdaptor, StoreResult,
};
use logvault_storage_fs::FsStore;
use logvault_storage_memory::MemoryStore;
use logvault_storage_redis::RedisStore;

/// A constructed storage backend.
///
/// Dispatches every [`StorageAdaptor`] operation to the concrete backend
/// chosen by [`build`].
#[derive(Clone, Debug)]
pub enum Store {
    /// Volatile in-memory backend.
    Memory(MemoryStore),
    /// Embedded JSON-lines file backend.
    File(FsStore),
    /// Remote key-value backend.
    Redis(RedisStore),
}

/// Construct the backend `config` resolves to, bound to a namespace and
/// default tenant.
///
/// Resolution order: Redis wins outright; a forced or requested in-memory
/// backend comes next; then the file backend when a usable `db_path` is
/// configured, falling back to in-memory when the directory cannot be
/// created; in-memory is the default. Construction is lazy: no file or
/// connection is touched until the first operation (or `initialize()`).
pub fn build(config: &StoreConfig, namespace: &str, tenant_id: &str) -> Store {
    if config.redis.is_some() || config.backend == Some(BackendKind::Redis) {
        let options = config
            .redis
            .as_ref()
            .map(RedisConfig::to_options)
            .unwrap_or_default();
        info!(%namespace, "using redis log storage");
        return Store::Redis(RedisStore::new(options, namespace, tenant_id));
    }

    if config.in_memory_only || config.backend == Some(BackendKind::Memory) {
        info!(%namespace, "using in-memory log storage");
        return Store::Memory(MemoryStore::new(namespace, tenant_id));
    }

    if config.backend == Some(BackendKind::File) {
        match &config.db_path {
            Some(db_path) => match std::fs::create_dir_all(db_path) {
                Ok(()) => {
                    info!(%namespace, path = %db_path.display(), "using file log storage");
                    return Store::File(FsStore::new(db_path.clone(), namespace, tenant_id));
                }
                Err(error) => {
                    warn!(
                        path = %db_path.display(),
                        %error,
                        "cannot create storage directory, falling back to in-memory"
                    );
                }
            },
            None => {
                warn!("file backend requested without db_path, falling back to in-memory");
            }
        }
    }

    info!(%namespace, "using in-memory log storage");
    Store::Memory(MemoryStore::new(namespace, tenant_id))
}

impl Store {
    fn adaptor(&self) -> &dyn StorageAdaptor {
        match self {
            Store::Memory(store) => store,
            Store::File(store) => store,
            Store::Redis(store) => store,
        }
    }
}

#[async_trait]
impl StorageAdaptor for Store {
    async fn initialize(&self) -> StoreResult<()> {
        self.adaptor().initialize().await
    }

    async fn close(&self) -> StoreResult<()> {
        self.adaptor().close().await
    }

    async fn store_log_entry(
        &self,
        entry_id: Option<String>,
        log_name: &str,
        data: Value,
        search_tokens: Vec<String>,
    ) -> StoreResult<String> {
        self.adaptor()
            .store_log_entry(entry_id, log_name, data, search_tokens)
            .await
    }

    async fn get_log_entry_by_id(
        &self,
        log_name: &str,
        entry_id: &str,
    ) -> StoreResult<Option<LogEntry>> {
        self.adaptor().get_log_entry_by_id(log_name, entry_id).await
    }

    async fn update_log_entry_by_id(
        &self,
        log_name: &str,
        entry_id: &str,
        data: Value,
    ) -> StoreResult<bool> {
        self.adaptor()
            .update_log_entry_by_id(log_name, entry_id, data)
            .await
    }

    async fn delete_log_entry_by_id(&self, log_name: &str, entry_id: &str) -> StoreResult<bool> {
        self.adaptor().delete_log_entry_by_id(log_name, entry_id).await
    }

    async fn get_logs_by_name(
        &self,
        log_name: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<LogEntry>> {
        self.adaptor().get_logs_by_name(log_name, limit).await
    }

    async fn get_log_names(&self, limit: Option<usize>) -> StoreResult<Vec<String>> {
        self.adaptor().get_log_names(limit).await
    }

    async fn clear_log(&self, log_name: &str) -> StoreResult<u64> {
        self.adaptor().clear_log(log_name).await
    }

    async fn create_log(&self, log: Log) -> StoreResult<Log> {
        self.adaptor().create_log(log).await
    }

    async fn get_logs(&self) -> StoreResult<Vec<Log>> {
        self.adaptor().get_logs().await
    }

    async fn get_log(&self, name: &str) -> StoreResult<Option<Log>> {
        self.adaptor().get_log(name).await
    }

    async fn update_log(&self, patch: LogPatch) -> StoreResult<Log> {
        self.adaptor().update_log(patch).await
    }

    async fn delete_log(&self, name: &str) -> StoreResult<bool> {
        self.adaptor().delete_log(name).await
    }

    async fn append_log_entry(&self, log_name: &str, entry: LogEntry) -> StoreResult<String> {
        self.adaptor().append_log_entry(log_name, entry).await
    }

    async fn batch_append_log_entries(
        &self,
        log_name: &str,
        entries: Vec<LogEntry>,
    ) -> StoreResult<BatchAppendReceipt> {
        self.adaptor().batch_append_log_entries(log_name, entries).await
    }

    async fn get_log_entries(
        &self,
        log_name: &str,
        page: PageRequest,
    ) -> StoreResult<Page<LogEntry>> {
        self.adaptor().get_log_entries(log_name, page).await
    }

    async fn get_log_entry(
        &self,
        log_name: &str,
        entry_id: &str,
    ) -> StoreResult<Option<LogEntry>> {
        self.adaptor().get_log_entry(log_name, entry_id).await
    }

    async fn search_log_entries(
        &self,
        log_name: &str,
        query: EntryQuery,
    ) -> StoreResult<Page<LogEntry>> {
        self.adaptor().search_log_entries(log_name, query).await
    }

    async fn search_logs(&self, query: LogSearchQuery) -> StoreResult<Vec<SearchHit>> {
        self.adaptor().search_logs(query).await
    }

    async fn count_expired_entries(&self, cutoff_ms: u64) -> StoreResult<u64> {
        self.adaptor().count_expired_entries(cutoff_ms).await
    }

    async fn purge_expired_entries(
        &self,
        cutoff_ms: u64,
        batch_size: usize,
    ) -> StoreResult<PurgeOutcome> {
        self.adaptor().purge_expired_entries(cutoff_ms, batch_size).await
    }
}
