//! In-memory log storage backend
//!
//! Reference implementation over native maps. Entirely volatile: `close()`
//! is a no-op and a process restart loses everything. This backend defines
//! the ground-truth ordering and filtering behavior the other backends must
//! match: listings come back in insertion order, and nothing is ever sorted
//! by the logical entry timestamp.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::RwLock;

use logvault_storage::{
    BatchAppendReceipt, EntryQuery, Log, LogEntry, LogPatch, LogSearchQuery, Page, PageRequest,
    PurgeOutcome, SearchHit, StorageAdaptor, StoreError, StoreResult, coerce, new_id, now_millis,
    DEFAULT_RAW_LIMIT,
};

#[derive(Default)]
struct MemoryState {
    /// Log name -> entries in insertion order. Shared by the raw and
    /// structured paths; their indexes differ, their values do not.
    entries: HashMap<String, Vec<LogEntry>>,
    /// Tenant -> (log name -> metadata).
    tenant_logs: HashMap<String, HashMap<String, Log>>,
    /// `"<log>:<entry>"` -> server-side creation epoch-ms, for retention.
    created_at: HashMap<String, u64>,
}

/// In-memory storage adaptor.
#[derive(Clone)]
pub struct MemoryStore {
    namespace: String,
    tenant_id: String,
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Create an adaptor bound to a namespace and default tenant.
    pub fn new(namespace: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            tenant_id: tenant_id.into(),
            state: Arc::new(RwLock::new(MemoryState::default())),
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

fn retention_key(log_name: &str, entry_id: &str) -> String {
    format!("{log_name}:{entry_id}")
}

fn split_retention_key(key: &str) -> Option<(&str, &str)> {
    // Entry ids are generated without ':'; log names may contain it.
    key.rsplit_once(':')
}

impl MemoryState {
    fn log_exists(&self, tenant: &str, name: &str) -> bool {
        self.tenant_logs
            .get(tenant)
            .is_some_and(|logs| logs.contains_key(name))
    }

    /// Insert or replace an entry, recording its creation instant.
    fn upsert_entry(&mut self, log_name: &str, entry: LogEntry) {
        let slot = self.entries.entry(log_name.to_string()).or_default();
        match slot.iter_mut().find(|existing| existing.id == entry.id) {
            Some(existing) => *existing = entry.clone(),
            None => slot.push(entry.clone()),
        }
        self.created_at
            .insert(retention_key(log_name, &entry.id), now_millis());
    }

    /// Remove one entry and its retention record.
    fn remove_entry(&mut self, log_name: &str, entry_id: &str) -> bool {
        let Some(slot) = self.entries.get_mut(log_name) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|entry| entry.id != entry_id);
        let removed = slot.len() < before;
        if slot.is_empty() {
            self.entries.remove(log_name);
        }
        self.created_at.remove(&retention_key(log_name, entry_id));
        removed
    }

    fn remove_all_entries(&mut self, log_name: &str) -> u64 {
        let removed = self
            .entries
            .remove(log_name)
            .map(|entries| entries.len() as u64)
            .unwrap_or(0);
        let prefix = format!("{log_name}:");
        self.created_at.retain(|key, _| !key.starts_with(&prefix));
        removed
    }
}

#[async_trait]
impl StorageAdaptor for MemoryStore {
    async fn initialize(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn store_log_entry(
        &self,
        entry_id: Option<String>,
        log_name: &str,
        data: Value,
        search_tokens: Vec<String>,
    ) -> StoreResult<String> {
        let id = entry_id.filter(|id| !id.is_empty()).unwrap_or_else(new_id);
        let entry = LogEntry {
            id: id.clone(),
            log_id: log_name.to_string(),
            timestamp: json!(now_millis()),
            data: coerce::ensure_json_value(data),
            search_tokens,
            encryption_info: None,
        };
        self.state.write().await.upsert_entry(log_name, entry);
        Ok(id)
    }

    async fn get_log_entry_by_id(
        &self,
        log_name: &str,
        entry_id: &str,
    ) -> StoreResult<Option<LogEntry>> {
        let state = self.state.read().await;
        Ok(state.entries.get(log_name).and_then(|entries| {
            entries.iter().find(|entry| entry.id == entry_id).cloned()
        }))
    }

    async fn update_log_entry_by_id(
        &self,
        log_name: &str,
        entry_id: &str,
        data: Value,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let Some(entries) = state.entries.get_mut(log_name) else {
            return Ok(false);
        };
        match entries.iter_mut().find(|entry| entry.id == entry_id) {
            Some(entry) => {
                entry.data = coerce::ensure_json_value(data);
                entry.timestamp = json!(now_millis());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_log_entry_by_id(&self, log_name: &str, entry_id: &str) -> StoreResult<bool> {
        Ok(self.state.write().await.remove_entry(log_name, entry_id))
    }

    async fn get_logs_by_name(
        &self,
        log_name: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<LogEntry>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .get(log_name)
            .map(|entries| {
                entries
                    .iter()
                    .take(limit.unwrap_or(DEFAULT_RAW_LIMIT))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_log_names(&self, limit: Option<usize>) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state.entries.keys().cloned().collect();
        names.sort();
        names.truncate(limit.unwrap_or(DEFAULT_RAW_LIMIT));
        Ok(names)
    }

    async fn clear_log(&self, log_name: &str) -> StoreResult<u64> {
        Ok(self.state.write().await.remove_all_entries(log_name))
    }

    async fn create_log(&self, mut log: Log) -> StoreResult<Log> {
        let tenant = self.resolve_tenant(&log.tenant_id).to_string();
        let mut state = self.state.write().await;
        let logs = state.tenant_logs.entry(tenant.clone()).or_default();
        if logs.contains_key(&log.name) {
            return Err(StoreError::LogAlreadyExists(log.name));
        }
        if log.id.is_empty() {
            log.id = new_id();
        }
        log.tenant_id = tenant;
        let now = now_millis();
        if log.created_at == 0 {
            log.created_at = now;
        }
        if log.updated_at == 0 {
            log.updated_at = now;
        }
        logs.insert(log.name.clone(), log.clone());
        Ok(log)
    }

    async fn get_logs(&self) -> StoreResult<Vec<Log>> {
        let state = self.state.read().await;
        let mut logs: Vec<Log> = state
            .tenant_logs
            .get(&self.tenant_id)
            .map(|logs| logs.values().cloned().collect())
            .unwrap_or_default();
        logs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(logs)
    }

    async fn get_log(&self, name: &str) -> StoreResult<Option<Log>> {
        let state = self.state.read().await;
        Ok(state
            .tenant_logs
            .get(&self.tenant_id)
            .and_then(|logs| logs.get(name))
            .cloned())
    }

    async fn update_log(&self, patch: LogPatch) -> StoreResult<Log> {
        let tenant = self
            .resolve_tenant(patch.tenant_id.as_deref().unwrap_or(""))
            .to_string();
        let mut state = self.state.write().await;
        let log = state
            .tenant_logs
            .get_mut(&tenant)
            .and_then(|logs| logs.get_mut(&patch.name))
            .ok_or_else(|| StoreError::LogNotFound(patch.name.clone()))?;
        patch.apply_to(log);
        log.updated_at = now_millis();
        Ok(log.clone())
    }

    async fn delete_log(&self, name: &str) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let existed = state
            .tenant_logs
            .get_mut(&self.tenant_id)
            .and_then(|logs| logs.remove(name))
            .is_some();
        if existed {
            state.remove_all_entries(name);
        }
        Ok(existed)
    }

    async fn append_log_entry(&self, log_name: &str, entry: LogEntry) -> StoreResult<String> {
        let mut state = self.state.write().await;
        if !state.log_exists(&self.tenant_id, log_name) {
            return Err(StoreError::LogNotFound(log_name.to_string()));
        }
        let prepared = prepare_entry(log_name, entry);
        let id = prepared.id.clone();
        state.upsert_entry(log_name, prepared);
        Ok(id)
    }

    async fn batch_append_log_entries(
        &self,
        log_name: &str,
        entries: Vec<LogEntry>,
    ) -> StoreResult<BatchAppendReceipt> {
        let mut state = self.state.write().await;
        if !state.log_exists(&self.tenant_id, log_name) {
            return Err(StoreError::LogNotFound(log_name.to_string()));
        }
        let mut receipts = Vec::with_capacity(entries.len());
        for entry in entries {
            let prepared = prepare_entry(log_name, entry);
            receipts.push(logvault_storage::AppendedEntry {
                id: prepared.id.clone(),
                timestamp: prepared.timestamp.clone(),
            });
            state.upsert_entry(log_name, prepared);
        }
        Ok(BatchAppendReceipt { entries: receipts })
    }

    async fn get_log_entries(
        &self,
        log_name: &str,
        page: PageRequest,
    ) -> StoreResult<Page<LogEntry>> {
        let state = self.state.read().await;
        if !state.log_exists(&self.tenant_id, log_name) {
            return Err(StoreError::LogNotFound(log_name.to_string()));
        }
        let all = state.entries.get(log_name).cloned().unwrap_or_default();
        Ok(Page::from_full(
            all,
            &page,
            logvault_storage::DEFAULT_ENTRY_PAGE_LIMIT,
        ))
    }

    async fn get_log_entry(
        &self,
        log_name: &str,
        entry_id: &str,
    ) -> StoreResult<Option<LogEntry>> {
        let state = self.state.read().await;
        if !state.log_exists(&self.tenant_id, log_name) {
            return Err(StoreError::LogNotFound(log_name.to_string()));
        }
        Ok(state.entries.get(log_name).and_then(|entries| {
            entries.iter().find(|entry| entry.id == entry_id).cloned()
        }))
    }

    async fn search_log_entries(
        &self,
        log_name: &str,
        query: EntryQuery,
    ) -> StoreResult<Page<LogEntry>> {
        let state = self.state.read().await;
        if !state.log_exists(&self.tenant_id, log_name) {
            return Err(StoreError::LogNotFound(log_name.to_string()));
        }
        let matching: Vec<LogEntry> = state
            .entries
            .get(log_name)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| query.matches(entry))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(Page::from_full(
            matching,
            &query.page,
            logvault_storage::DEFAULT_ENTRY_PAGE_LIMIT,
        ))
    }

    async fn search_logs(&self, query: LogSearchQuery) -> StoreResult<Vec<SearchHit>> {
        let state = self.state.read().await;
        let limit = query.limit.unwrap_or(DEFAULT_RAW_LIMIT);
        let mut names: Vec<&String> = state.entries.keys().collect();
        names.sort();

        let mut hits = Vec::new();
        'outer: for name in names {
            if let Some(filter) = &query.log_name {
                if filter != name {
                    continue;
                }
            }
            for entry in &state.entries[name] {
                if query.matches(entry) {
                    hits.push(SearchHit {
                        log_name: name.clone(),
                        entry: entry.clone(),
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
        let state = self.state.read().await;
        Ok(state
            .created_at
            .values()
            .filter(|&&created| created <= cutoff_ms)
            .count() as u64)
    }

    async fn purge_expired_entries(
        &self,
        cutoff_ms: u64,
        batch_size: usize,
    ) -> StoreResult<PurgeOutcome> {
        let mut state = self.state.write().await;
        let mut expired: Vec<(String, u64)> = state
            .created_at
            .iter()
            .filter(|&(_, &created)| created <= cutoff_ms)
            .map(|(key, &created)| (key.clone(), created))
            .collect();
        expired.sort_by_key(|(_, created)| *created);
        expired.truncate(batch_size);

        let mut purged = 0;
        for (key, _) in expired {
            let Some((log_name, entry_id)) = split_retention_key(&key) else {
                state.created_at.remove(&key);
                continue;
            };
            let (log_name, entry_id) = (log_name.to_string(), entry_id.to_string());
            if state.remove_entry(&log_name, &entry_id) {
                purged += 1;
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

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("namespace", &self.namespace)
            .field("tenant_id", &self.tenant_id)
            .field("state", &"<locked>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new("test", "tenant-1")
    }

    #[tokio::test]
    async fn raw_store_and_get_round_trip() {
        let store = store();
        let id = store
            .store_log_entry(None, "audit", json!({"event": "login"}), vec![])
            .await
            .unwrap();

        let entry = store.get_log_entry_by_id("audit", &id).await.unwrap().unwrap();
        assert_eq!(entry.data, json!({"event": "login"}));
        assert_eq!(entry.log_id, "audit");
        assert!(entry.timestamp.is_u64());
    }

    #[tokio::test]
    async fn raw_store_coerces_stringly_payloads() {
        let store = store();
        let id = store
            .store_log_entry(None, "audit", json!(r#"{"n": 1}"#), vec![])
            .await
            .unwrap();
        let entry = store.get_log_entry_by_id("audit", &id).await.unwrap().unwrap();
        assert_eq!(entry.data, json!({"n": 1}));
    }

    #[tokio::test]
    async fn raw_update_replaces_data_and_refreshes_timestamp() {
        let store = store();
        let id = store
            .store_log_entry(Some("e1".into()), "audit", json!(1), vec![])
            .await
            .unwrap();
        assert!(store
            .update_log_entry_by_id("audit", &id, json!(2))
            .await
            .unwrap());
        let entry = store.get_log_entry_by_id("audit", &id).await.unwrap().unwrap();
        assert_eq!(entry.data, json!(2));

        assert!(!store
            .update_log_entry_by_id("audit", "missing", json!(3))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn raw_delete_and_clear() {
        let store = store();
        store
            .store_log_entry(Some("e1".into()), "audit", json!(1), vec![])
            .await
            .unwrap();
        store
            .store_log_entry(Some("e2".into()), "audit", json!(2), vec![])
            .await
            .unwrap();

        assert!(store.delete_log_entry_by_id("audit", "e1").await.unwrap());
        assert!(!store.delete_log_entry_by_id("audit", "e1").await.unwrap());
        assert_eq!(store.clear_log("audit").await.unwrap(), 1);
        assert_eq!(store.clear_log("audit").await.unwrap(), 0);
        assert!(store.get_log_names(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn log_names_reflect_logs_with_entries() {
        let store = store();
        store
            .store_log_entry(None, "b", json!(1), vec![])
            .await
            .unwrap();
        store
            .store_log_entry(None, "a", json!(1), vec![])
            .await
            .unwrap();
        assert_eq!(store.get_log_names(None).await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.get_log_names(Some(1)).await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn create_log_defaults_and_round_trips() {
        let store = store();
        let created = store.create_log(Log::named("orders")).await.unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(created.tenant_id, "tenant-1");
        assert!(created.created_at > 0);

        let fetched = store.get_log("orders").await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn create_log_rejects_duplicate_names() {
        let store = store();
        store.create_log(Log::named("orders")).await.unwrap();
        let err = store.create_log(Log::named("orders")).await.unwrap_err();
        assert!(matches!(err, StoreError::LogAlreadyExists(name) if name == "orders"));
    }

    #[tokio::test]
    async fn update_log_merges_and_requires_existence() {
        let store = store();
        store.create_log(Log::named("orders")).await.unwrap();

        let mut patch = LogPatch::named("orders");
        patch.description = Some("order events".into());
        patch.retention_days = Some(30);
        let updated = store.update_log(patch).await.unwrap();
        assert_eq!(updated.description, "order events");
        assert_eq!(updated.retention_days, Some(30));

        let err = store.update_log(LogPatch::named("missing")).await.unwrap_err();
        assert!(matches!(err, StoreError::LogNotFound(_)));
    }

    #[tokio::test]
    async fn delete_log_cascades_to_entries() {
        let store = store();
        store.create_log(Log::named("orders")).await.unwrap();
        store
            .append_log_entry("orders", LogEntry::with_data(json!({"amount": 10})))
            .await
            .unwrap();

        assert!(store.delete_log("orders").await.unwrap());
        assert!(store.get_log("orders").await.unwrap().is_none());
        assert!(matches!(
            store.get_log_entries("orders", PageRequest::default()).await,
            Err(StoreError::LogNotFound(_))
        ));
        assert_eq!(store.count_expired_entries(u64::MAX).await.unwrap(), 0);
        assert!(!store.delete_log("orders").await.unwrap());
    }

    #[tokio::test]
    async fn structured_ops_require_existing_log() {
        let store = store();
        assert!(matches!(
            store
                .append_log_entry("nope", LogEntry::with_data(json!(1)))
                .await,
            Err(StoreError::LogNotFound(_))
        ));
        assert!(matches!(
            store.get_log_entries("nope", PageRequest::default()).await,
            Err(StoreError::LogNotFound(_))
        ));
        assert!(matches!(
            store.search_log_entries("nope", EntryQuery::default()).await,
            Err(StoreError::LogNotFound(_))
        ));
    }

    #[tokio::test]
    async fn entry_isolation_between_logs() {
        let store = store();
        store.create_log(Log::named("a")).await.unwrap();
        store.create_log(Log::named("b")).await.unwrap();
        store
            .append_log_entry("a", LogEntry::with_data(json!("only-in-a")))
            .await
            .unwrap();

        let page = store.get_log_entries("b", PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn pagination_matches_contract_scenario() {
        let store = store();
        store.create_log(Log::named("orders")).await.unwrap();
        store
            .append_log_entry("orders", LogEntry::with_data(json!({"amount": 10})))
            .await
            .unwrap();
        store
            .append_log_entry("orders", LogEntry::with_data(json!({"amount": 20})))
            .await
            .unwrap();

        let first = store
            .get_log_entries("orders", PageRequest::new(1, 0))
            .await
            .unwrap();
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.total, 2);
        assert!(first.has_more);

        let all = store
            .get_log_entries("orders", PageRequest::new(10, 0))
            .await
            .unwrap();
        assert_eq!(all.total, 2);
        assert!(!all.has_more);
    }

    #[tokio::test]
    async fn pagination_walks_all_entries_exactly_once() {
        let store = store();
        store.create_log(Log::named("walk")).await.unwrap();
        for i in 0..23 {
            store
                .append_log_entry("walk", LogEntry::with_data(json!({"i": i})))
                .await
                .unwrap();
        }

        for limit in [1, 3, 7, 10, 23, 40] {
            let mut seen = Vec::new();
            let mut offset = 0;
            loop {
                let page = store
                    .get_log_entries("walk", PageRequest::new(limit, offset))
                    .await
                    .unwrap();
                let done = !page.has_more;
                seen.extend(page.items.into_iter().map(|e| e.id));
                if done {
                    break;
                }
                offset += limit;
            }
            assert_eq!(seen.len(), 23, "limit {limit}");
            let mut dedup = seen.clone();
            dedup.sort();
            dedup.dedup();
            assert_eq!(dedup.len(), 23, "limit {limit}");
        }
    }

    #[tokio::test]
    async fn batch_append_assigns_distinct_retrievable_ids() {
        let store = store();
        store.create_log(Log::named("orders")).await.unwrap();
        let receipt = store
            .batch_append_log_entries(
                "orders",
                vec![
                    LogEntry::with_data(json!(1)),
                    LogEntry::with_data(json!(2)),
                    LogEntry::with_data(json!(3)),
                ],
            )
            .await
            .unwrap();

        assert_eq!(receipt.entries.len(), 3);
        let mut ids: Vec<&String> = receipt.entries.iter().map(|r| &r.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);

        for appended in &receipt.entries {
            let entry = store
                .get_log_entry("orders", &appended.id)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(entry.timestamp, appended.timestamp);
        }
    }

    #[tokio::test]
    async fn append_preserves_client_timestamp() {
        let store = store();
        store.create_log(Log::named("orders")).await.unwrap();
        let mut entry = LogEntry::with_data(json!({}));
        entry.timestamp = json!("opaque-ciphertext");
        let id = store.append_log_entry("orders", entry).await.unwrap();
        let stored = store.get_log_entry("orders", &id).await.unwrap().unwrap();
        assert_eq!(stored.timestamp, json!("opaque-ciphertext"));
    }

    #[tokio::test]
    async fn search_entries_by_token_and_time() {
        let store = store();
        store.create_log(Log::named("orders")).await.unwrap();

        let mut tokened = LogEntry::with_data(json!("c1"));
        tokened.search_tokens = vec!["tok-a".into(), "tok-b".into()];
        tokened.timestamp = json!(1_000);
        store.append_log_entry("orders", tokened).await.unwrap();

        let mut plain = LogEntry::with_data(json!("c2"));
        plain.timestamp = json!(5_000);
        store.append_log_entry("orders", plain).await.unwrap();

        let by_token = store
            .search_log_entries(
                "orders",
                EntryQuery {
                    search_tokens: vec!["tok-a".into()],
                    ..EntryQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_token.total, 1);
        assert_eq!(by_token.items[0].data, json!("c1"));

        let by_time = store
            .search_log_entries(
                "orders",
                EntryQuery {
                    start_time: Some(2_000),
                    ..EntryQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_time.total, 1);
        assert_eq!(by_time.items[0].data, json!("c2"));
    }

    #[tokio::test]
    async fn search_logs_field_filter_scenario() {
        let store = store();
        store.create_log(Log::named("orders")).await.unwrap();
        store
            .append_log_entry("orders", LogEntry::with_data(json!({"amount": 10})))
            .await
            .unwrap();
        store
            .append_log_entry("orders", LogEntry::with_data(json!({"amount": 20})))
            .await
            .unwrap();

        let hits = store
            .search_logs(LogSearchQuery {
                log_name: Some("orders".into()),
                field_filters: [("data.amount".to_string(), json!(10))].into_iter().collect(),
                ..LogSearchQuery::default()
            })
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].log_name, "orders");
        assert_eq!(hits[0].entry.data, json!({"amount": 10}));
    }

    #[tokio::test]
    async fn retention_purge_is_bounded_monotonic_and_idempotent() {
        let store = store();
        for i in 0..5 {
            store
                .store_log_entry(Some(format!("e{i}")), "audit", json!(i), vec![])
                .await
                .unwrap();
        }

        let cutoff = now_millis() + 1_000;
        assert_eq!(store.count_expired_entries(cutoff).await.unwrap(), 5);
        // Earlier cutoffs can only count fewer entries.
        assert!(store.count_expired_entries(0).await.unwrap() <= 5);

        let first = store.purge_expired_entries(cutoff, 2).await.unwrap();
        assert_eq!(first.purged_count, 2);
        assert_eq!(store.count_expired_entries(cutoff).await.unwrap(), 3);

        let rest = store.purge_expired_entries(cutoff, 100).await.unwrap();
        assert_eq!(rest.purged_count, 3);
        assert_eq!(store.count_expired_entries(cutoff).await.unwrap(), 0);

        let again = store.purge_expired_entries(cutoff, 100).await.unwrap();
        assert_eq!(again.purged_count, 0);
    }

    #[tokio::test]
    async fn purge_spares_entries_created_after_cutoff() {
        let store = store();
        store
            .store_log_entry(Some("old".into()), "audit", json!(1), vec![])
            .await
            .unwrap();
        let cutoff = now_millis() + 1_000;

        // Simulate an entry whose creation instant postdates the cutoff.
        store
            .store_log_entry(Some("fresh".into()), "audit", json!(2), vec![])
            .await
            .unwrap();
        store
            .state
            .write()
            .await
            .created_at
            .insert(retention_key("audit", "fresh"), cutoff + 1_000);

        store.purge_expired_entries(cutoff, 100).await.unwrap();
        assert!(store.get_log_entry_by_id("audit", "old").await.unwrap().is_none());
        assert!(store.get_log_entry_by_id("audit", "fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn structured_appends_are_purge_eligible() {
        let store = store();
        store.create_log(Log::named("orders")).await.unwrap();
        store
            .append_log_entry("orders", LogEntry::with_data(json!(1)))
            .await
            .unwrap();

        let cutoff = now_millis() + 1_000;
        assert_eq!(store.count_expired_entries(cutoff).await.unwrap(), 1);
        let outcome = store.purge_expired_entries(cutoff, 10).await.unwrap();
        assert_eq!(outcome.purged_count, 1);
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let store = store();
        store.create_log(Log::named("orders")).await.unwrap();

        let mut foreign = Log::named("orders");
        foreign.tenant_id = "tenant-2".to_string();
        // Same name, different tenant: no collision.
        store.create_log(foreign).await.unwrap();

        let logs = store.get_logs().await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].tenant_id, "tenant-1");
    }
}
