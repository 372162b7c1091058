//! Embedded-file log storage backend
//!
//! Document store over two append-only JSON-lines collections per namespace:
//! one for entries (unique `id` index, non-unique log-name index) and one for
//! log metadata (unique `id` index, non-unique tenant+name index).
//! `initialize()` loads and compacts both files and builds the indexes; every
//! operation funnels through the same lazy-load guard, so a closed store
//! transparently reinitializes on next use.
//!
//! Structured listing fetches the full matching set and slices in memory.
//! That is a deliberate scalability ceiling inherited from the document
//! store's query model; logs are expected to stay bounded in practice.

mod collection;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use collection::{Collection, DocId};
use logvault_storage::{
    BatchAppendReceipt, DEFAULT_ENTRY_PAGE_LIMIT, DEFAULT_RAW_LIMIT, EntryQuery, Log, LogEntry,
    LogPatch, LogSearchQuery, Page, PageRequest, PurgeOutcome, SearchHit, StorageAdaptor,
    StoreError, StoreResult, coerce, new_id, now_millis,
};

/// Stored entry document: the entry itself plus the server-side creation
/// instant used for retention. The creation instant is deliberately not part
/// of [`LogEntry`]; clients never see or influence it.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct EntryDoc {
    #[serde(flatten)]
    entry: LogEntry,
    created_at: u64,
}

impl DocId for EntryDoc {
    fn doc_id(&self) -> &str {
        &self.entry.id
    }
}

impl DocId for Log {
    fn doc_id(&self) -> &str {
        &self.id
    }
}

struct FsState {
    entries: Collection<EntryDoc>,
    logs: Collection<Log>,
    /// Non-unique index: log name -> entry ids in insertion order.
    entry_ids_by_name: std::collections::HashMap<String, Vec<String>>,
    /// Non-unique index: (tenant, name) -> log doc id.
    log_id_by_tenant_name: std::collections::HashMap<(String, String), String>,
}

impl FsState {
    async fn load(dir: &PathBuf, namespace: &str) -> StoreResult<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let entries: Collection<EntryDoc> =
            Collection::load(dir.join(format!("{namespace}_entries.db"))).await?;
        let logs: Collection<Log> = Collection::load(dir.join(format!("{namespace}_logs.db"))).await?;

        let mut entry_ids_by_name: std::collections::HashMap<String, Vec<String>> =
            std::collections::HashMap::new();
        for doc in entries.iter() {
            entry_ids_by_name
                .entry(doc.entry.log_id.clone())
                .or_default()
                .push(doc.entry.id.clone());
        }

        let mut log_id_by_tenant_name = std::collections::HashMap::new();
        for log in logs.iter() {
            log_id_by_tenant_name
                .insert((log.tenant_id.clone(), log.name.clone()), log.id.clone());
        }

        debug!(
            dir = %dir.display(),
            entries = entries.iter().count(),
            logs = logs.iter().count(),
            "loaded file store"
        );

        Ok(Self {
            entries,
            logs,
            entry_ids_by_name,
            log_id_by_tenant_name,
        })
    }

    fn log_exists(&self, tenant: &str, name: &str) -> bool {
        self.log_id_by_tenant_name
            .contains_key(&(tenant.to_string(), name.to_string()))
    }

    fn log_by_name(&self, tenant: &str, name: &str) -> Option<&Log> {
        let id = self
            .log_id_by_tenant_name
            .get(&(tenant.to_string(), name.to_string()))?;
        self.logs.get(id)
    }

    /// Insert or replace an entry document, keeping the name index straight
    /// when a replacement moves the entry between logs.
    async fn upsert_entry(&mut self, doc: EntryDoc) -> StoreResult<()> {
        let id = doc.entry.id.clone();
        let name = doc.entry.log_id.clone();

        if let Some(previous) = self.entries.get(&id) {
            let previous_name = previous.entry.log_id.clone();
            if previous_name != name {
                if let Some(ids) = self.entry_ids_by_name.get_mut(&previous_name) {
                    ids.retain(|existing| existing != &id);
                    if ids.is_empty() {
                        self.entry_ids_by_name.remove(&previous_name);
                    }
                }
                self.entry_ids_by_name.entry(name).or_default().push(id);
            }
        } else {
            self.entry_ids_by_name.entry(name).or_default().push(id);
        }

        self.entries.upsert(doc).await
    }

    async fn remove_entry(&mut self, log_name: &str, entry_id: &str) -> StoreResult<bool> {
        let belongs = self
            .entries
            .get(entry_id)
            .is_some_and(|doc| doc.entry.log_id == log_name);
        if !belongs {
            return Ok(false);
        }
        self.entries.remove(entry_id).await?;
        if let Some(ids) = self.entry_ids_by_name.get_mut(log_name) {
            ids.retain(|existing| existing != entry_id);
            if ids.is_empty() {
                self.entry_ids_by_name.remove(log_name);
            }
        }
        Ok(true)
    }

    async fn remove_all_entries(&mut self, log_name: &str) -> StoreResult<u64> {
        let ids = self
            .entry_ids_by_name
            .remove(log_name)
            .unwrap_or_default();
        let mut removed = 0;
        for id in ids {
            if self.entries.remove(&id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn entries_of(&self, log_name: &str) -> Vec<LogEntry> {
        self.entry_ids_by_name
            .get(log_name)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.entries.get(id))
                    .map(|doc| doc.entry.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// File-backed storage adaptor.
#[derive(Clone)]
pub struct FsStore {
    dir: PathBuf,
    namespace: String,
    tenant_id: String,
    state: Arc<RwLock<Option<FsState>>>,
}

impl FsStore {
    /// Create an adaptor rooted at `dir`, bound to a namespace and default
    /// tenant. Nothing touches the disk until the first operation.
    pub fn new(
        dir: impl Into<PathBuf>,
        namespace: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            namespace: namespace.into(),
            tenant_id: tenant_id.into(),
            state: Arc::new(RwLock::new(None)),
        }
    }

    async fn ensure_loaded<'a>(
        &self,
        guard: &'a mut Option<FsState>,
    ) -> StoreResult<&'a mut FsState> {
        if guard.is_none() {
            *guard = Some(FsState::load(&self.dir, &self.namespace).await?);
        }
        match guard {
            Some(state) => Ok(state),
            None => Err(StoreError::Backend(
                "file store failed to initialize".to_string(),
            )),
        }
    }

    fn resolve_tenant<'a>(&'a self, explicit: &'a str) -> &'a str {
        if explicit.is_empty() {
            &self.tenant_id
        } else {
            explicit
        }
    }
}

#[async_trait]
impl StorageAdaptor for FsStore {
    async fn initialize(&self) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        self.ensure_loaded(&mut guard).await?;
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        let mut guard = self.state.write().await;
        if let Some(state) = guard.as_mut() {
            state.entries.flush().await?;
            state.logs.flush().await?;
        }
        *guard = None;
        Ok(())
    }

    async fn store_log_entry(
        &self,
        entry_id: Option<String>,
        log_name: &str,
        data: Value,
        search_tokens: Vec<String>,
    ) -> StoreResult<String> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;

        let id = entry_id.filter(|id| !id.is_empty()).unwrap_or_else(new_id);
        let doc = EntryDoc {
            entry: LogEntry {
                id: id.clone(),
                log_id: log_name.to_string(),
                timestamp: json!(now_millis()),
                data: coerce::ensure_json_value(data),
                search_tokens,
                encryption_info: None,
            },
            created_at: now_millis(),
        };
        state.upsert_entry(doc).await?;
        Ok(id)
    }

    async fn get_log_entry_by_id(
        &self,
        log_name: &str,
        entry_id: &str,
    ) -> StoreResult<Option<LogEntry>> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;
        Ok(state
            .entries
            .get(entry_id)
            .filter(|doc| doc.entry.log_id == log_name)
            .map(|doc| doc.entry.clone()))
    }

    async fn update_log_entry_by_id(
        &self,
        log_name: &str,
        entry_id: &str,
        data: Value,
    ) -> StoreResult<bool> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;

        let Some(existing) = state
            .entries
            .get(entry_id)
            .filter(|doc| doc.entry.log_id == log_name)
            .cloned()
        else {
            return Ok(false);
        };
        let updated = EntryDoc {
            entry: LogEntry {
                data: coerce::ensure_json_value(data),
                timestamp: json!(now_millis()),
                ..existing.entry
            },
            // The retention clock keeps ticking from the original insert.
            created_at: existing.created_at,
        };
        state.upsert_entry(updated).await?;
        Ok(true)
    }

    async fn delete_log_entry_by_id(&self, log_name: &str, entry_id: &str) -> StoreResult<bool> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;
        state.remove_entry(log_name, entry_id).await
    }

    async fn get_logs_by_name(
        &self,
        log_name: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<LogEntry>> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;
        let mut entries = state.entries_of(log_name);
        entries.truncate(limit.unwrap_or(DEFAULT_RAW_LIMIT));
        Ok(entries)
    }

    async fn get_log_names(&self, limit: Option<usize>) -> StoreResult<Vec<String>> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;
        let mut names: Vec<String> = state.entry_ids_by_name.keys().cloned().collect();
        names.sort();
        names.truncate(limit.unwrap_or(DEFAULT_RAW_LIMIT));
        Ok(names)
    }

    async fn clear_log(&self, log_name: &str) -> StoreResult<u64> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;
        state.remove_all_entries(log_name).await
    }

    async fn create_log(&self, mut log: Log) -> StoreResult<Log> {
        let tenant = self.resolve_tenant(&log.tenant_id).to_string();
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;

        if state.log_exists(&tenant, &log.name) {
            return Err(StoreError::LogAlreadyExists(log.name));
        }
        if log.id.is_empty() {
            log.id = new_id();
        }
        log.tenant_id = tenant.clone();
        let now = now_millis();
        if log.created_at == 0 {
            log.created_at = now;
        }
        if log.updated_at == 0 {
            log.updated_at = now;
        }

        state
            .log_id_by_tenant_name
            .insert((tenant, log.name.clone()), log.id.clone());
        state.logs.upsert(log.clone()).await?;
        Ok(log)
    }

    async fn get_logs(&self) -> StoreResult<Vec<Log>> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;
        let mut logs: Vec<Log> = state
            .logs
            .iter()
            .filter(|log| log.tenant_id == self.tenant_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(logs)
    }

    async fn get_log(&self, name: &str) -> StoreResult<Option<Log>> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;
        Ok(state.log_by_name(&self.tenant_id, name).cloned())
    }

    async fn update_log(&self, patch: LogPatch) -> StoreResult<Log> {
        let tenant = self
            .resolve_tenant(patch.tenant_id.as_deref().unwrap_or(""))
            .to_string();
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;

        let mut log = state
            .log_by_name(&tenant, &patch.name)
            .cloned()
            .ok_or_else(|| StoreError::LogNotFound(patch.name.clone()))?;
        patch.apply_to(&mut log);
        log.updated_at = now_millis();
        state.logs.upsert(log.clone()).await?;
        Ok(log)
    }

    async fn delete_log(&self, name: &str) -> StoreResult<bool> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;

        let Some(log_id) = state
            .log_id_by_tenant_name
            .remove(&(self.tenant_id.clone(), name.to_string()))
        else {
            return Ok(false);
        };
        state.logs.remove(&log_id).await?;
        state.remove_all_entries(name).await?;
        Ok(true)
    }

    async fn append_log_entry(&self, log_name: &str, entry: LogEntry) -> StoreResult<String> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;

        if !state.log_exists(&self.tenant_id, log_name) {
            return Err(StoreError::LogNotFound(log_name.to_string()));
        }
        let doc = EntryDoc {
            entry: prepare_entry(log_name, entry),
            created_at: now_millis(),
        };
        let id = doc.entry.id.clone();
        state.upsert_entry(doc).await?;
        Ok(id)
    }

    async fn batch_append_log_entries(
        &self,
        log_name: &str,
        entries: Vec<LogEntry>,
    ) -> StoreResult<BatchAppendReceipt> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;

        if !state.log_exists(&self.tenant_id, log_name) {
            return Err(StoreError::LogNotFound(log_name.to_string()));
        }
        let mut receipts = Vec::with_capacity(entries.len());
        for entry in entries {
            let doc = EntryDoc {
                entry: prepare_entry(log_name, entry),
                created_at: now_millis(),
            };
            receipts.push(logvault_storage::AppendedEntry {
                id: doc.entry.id.clone(),
                timestamp: doc.entry.timestamp.clone(),
            });
            state.upsert_entry(doc).await?;
        }
        Ok(BatchAppendReceipt { entries: receipts })
    }

    async fn get_log_entries(
        &self,
        log_name: &str,
        page: PageRequest,
    ) -> StoreResult<Page<LogEntry>> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;

        if !state.log_exists(&self.tenant_id, log_name) {
            return Err(StoreError::LogNotFound(log_name.to_string()));
        }
        Ok(Page::from_full(
            state.entries_of(log_name),
            &page,
            DEFAULT_ENTRY_PAGE_LIMIT,
        ))
    }

    async fn get_log_entry(
        &self,
        log_name: &str,
        entry_id: &str,
    ) -> StoreResult<Option<LogEntry>> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;

        if !state.log_exists(&self.tenant_id, log_name) {
            return Err(StoreError::LogNotFound(log_name.to_string()));
        }
        Ok(state
            .entries
            .get(entry_id)
            .filter(|doc| doc.entry.log_id == log_name)
            .map(|doc| doc.entry.clone()))
    }

    async fn search_log_entries(
        &self,
        log_name: &str,
        query: EntryQuery,
    ) -> StoreResult<Page<LogEntry>> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;

        if !state.log_exists(&self.tenant_id, log_name) {
            return Err(StoreError::LogNotFound(log_name.to_string()));
        }
        let matching: Vec<LogEntry> = state
            .entries_of(log_name)
            .into_iter()
            .filter(|entry| query.matches(entry))
            .collect();
        Ok(Page::from_full(matching, &query.page, DEFAULT_ENTRY_PAGE_LIMIT))
    }

    async fn search_logs(&self, query: LogSearchQuery) -> StoreResult<Vec<SearchHit>> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;

        let limit = query.limit.unwrap_or(DEFAULT_RAW_LIMIT);
        let mut names: Vec<String> = state.entry_ids_by_name.keys().cloned().collect();
        names.sort();

        let mut hits = Vec::new();
        'outer: for name in names {
            if let Some(filter) = &query.log_name {
                if filter != &name {
                    continue;
                }
            }
            for entry in state.entries_of(&name) {
                if query.matches(&entry) {
                    hits.push(SearchHit {
                        log_name: name.clone(),
                        entry,
                    });
                    if hits.len() >= limit {
                        break 'outer;
                    }
                }
            }
        }
        Ok(hits)
    }

    async fn count_expired_entries(&self, cutoff_ms: u64) -> StoreResult<u64> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;
        Ok(state
            .entries
            .iter()
            .filter(|doc| doc.created_at <= cutoff_ms)
            .count() as u64)
    }

    async fn purge_expired_entries(
        &self,
        cutoff_ms: u64,
        batch_size: usize,
    ) -> StoreResult<PurgeOutcome> {
        let mut guard = self.state.write().await;
        let state = self.ensure_loaded(&mut guard).await?;

        let mut expired: Vec<(String, String, u64)> = state
            .entries
            .iter()
            .filter(|doc| doc.created_at <= cutoff_ms)
            .map(|doc| {
                (
                    doc.entry.log_id.clone(),
                    doc.entry.id.clone(),
                    doc.created_at,
                )
            })
            .collect();
        expired.sort_by_key(|(_, _, created)| *created);
        expired.truncate(batch_size);

        let mut purged = 0;
        for (log_name, entry_id, _) in expired {
            match state.remove_entry(&log_name, &entry_id).await {
                Ok(true) => purged += 1,
                Ok(false) => {}
                Err(error) => {
                    warn!(%log_name, %entry_id, %error, "failed to purge entry, skipping");
                }
            }
        }
        Ok(PurgeOutcome {
            purged_count: purged,
        })
    }
}

/// Default id and timestamp for a structured append.
fn prepare_entry(log_name: &str, mut entry: LogEntry) -> LogEntry {
    if entry.id.is_empty() {
        entry.id = new_id();
    }
    entry.log_id = log_name.to_string();
    if entry.timestamp.is_null() {
        entry.timestamp = json!(now_millis());
    }
    entry
}

impl std::fmt::Debug for FsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsStore")
            .field("dir", &self.dir)
            .field("namespace", &self.namespace)
            .field("tenant_id", &self.tenant_id)
            .field("state", &"<locked>")
            .finish()
    }
}
