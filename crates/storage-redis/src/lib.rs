//! Redis log storage backend
//!
//! Maps every contract operation onto plain key, set, and sorted-set
//! commands over one multiplexed connection. Multi-key writes go out as a
//! single non-atomic pipeline to bound round-trips; a crash mid-pipeline can
//! leave an entry without some of its index memberships. That at-least-once
//! tradeoff is accepted; nothing here is linearizable.
//!
//! The raw/legacy path indexes entry ids in an unordered set and slices in
//! process; the structured path indexes them in a sorted set scored by the
//! server-side creation instant and pages newest-first with `ZREVRANGE`.
//! The asymmetry is historical and intentional: each path only promises a
//! stable order within its own calling convention.

mod keys;

use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use keys::KeySpace;
use logvault_storage::{
    BatchAppendReceipt, DEFAULT_ENTRY_PAGE_LIMIT, DEFAULT_RAW_LIMIT, EntryQuery, Log, LogEntry,
    LogPatch, LogSearchQuery, Page, PageRequest, PurgeOutcome, SearchHit, StorageAdaptor,
    StoreError, StoreResult, coerce, new_id, now_millis,
};

/// Connection options for a [`RedisStore`].
#[derive(Clone, Debug)]
pub struct RedisStoreOptions {
    /// Full connection URL; when set it wins over the discrete fields.
    pub url: Option<String>,
    /// Server host, used when `url` is absent.
    pub host: String,
    /// Server port, used when `url` is absent.
    pub port: u16,
    /// Optional AUTH password.
    pub password: Option<String>,
    /// Logical database index.
    pub db: i64,
    /// Whether to connect with TLS (`rediss://`).
    pub tls: bool,
    /// Extra outermost key prefix in front of the server namespace.
    pub key_prefix: Option<String>,
}

impl Default for RedisStoreOptions {
    fn default() -> Self {
        Self {
            url: None,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
            tls: false,
            key_prefix: None,
        }
    }
}

impl RedisStoreOptions {
    /// The connection URL these options resolve to.
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let scheme = if self.tls { "rediss" } else { "redis" };
        let auth = self
            .password
            .as_deref()
            .map(|password| format!(":{password}@"))
            .unwrap_or_default();
        format!("{scheme}://{auth}{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Redis-backed storage adaptor.
#[derive(Clone)]
pub struct RedisStore {
    options: RedisStoreOptions,
    keys: KeySpace,
    tenant_id: String,
    conn: Arc<RwLock<Option<ConnectionManager>>>,
}

fn redis_err(error: redis::RedisError) -> StoreError {
    StoreError::Backend(error.to_string())
}

impl RedisStore {
    /// Create an adaptor bound to a namespace and default tenant. No
    /// connection is made until the first operation.
    pub fn new(
        options: RedisStoreOptions,
        namespace: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        let keys = KeySpace::new(options.key_prefix.clone(), namespace.into());
        Self {
            options,
            keys,
            tenant_id: tenant_id.into(),
            conn: Arc::new(RwLock::new(None)),
        }
    }

    /// Connection handle, dialing on first use and after `close()`.
    async fn connection(&self) -> StoreResult<ConnectionManager> {
        {
            let guard = self.conn.read().await;
            if let Some(manager) = guard.as_ref() {
                return Ok(manager.clone());
            }
        }
        let mut guard = self.conn.write().await;
        if let Some(manager) = guard.as_ref() {
            return Ok(manager.clone());
        }
        let client = redis::Client::open(self.options.connection_url()).map_err(redis_err)?;
        let manager = ConnectionManager::new(client).await.map_err(redis_err)?;
        debug!(namespace = %self.keys.namespace(), "connected redis store");
        *guard = Some(manager.clone());
        Ok(manager)
    }

    fn resolve_tenant<'a>(&'a self, explicit: &'a str) -> &'a str {
        if explicit.is_empty() {
            &self.tenant_id
        } else {
            explicit
        }
    }

    /// Write an entry and all of its index memberships in one pipeline.
    async fn write_entry(
        &self,
        conn: &mut ConnectionManager,
        entry: &LogEntry,
        structured: bool,
    ) -> StoreResult<()> {
        let log_name = &entry.log_id;
        let serialized = serde_json::to_string(entry)?;
        let created = now_millis();
        let member = self.keys.member(log_name, &entry.id);

        let mut pipe = redis::pipe();
        pipe.set(self.keys.entry(log_name, &entry.id), serialized)
            .ignore()
            .sadd(self.keys.lognames(), log_name)
            .ignore()
            .zadd(self.keys.timestamps(), &member, created)
            .ignore();
        if structured {
            pipe.zadd(self.keys.structured_ids(log_name), &entry.id, created)
                .ignore();
        } else {
            pipe.sadd(self.keys.raw_ids(log_name), &entry.id).ignore();
        }
        for token in &entry.search_tokens {
            pipe.sadd(self.keys.token(token), &member)
                .ignore()
                .sadd(self.keys.entry_tokens(log_name, &entry.id), token)
                .ignore();
        }
        pipe.query_async(conn).await.map_err(redis_err)
    }

    /// Delete an entry and every index membership it may hold, on either
    /// path. Returns whether the entry value existed.
    async fn delete_entry(
        &self,
        conn: &mut ConnectionManager,
        log_name: &str,
        entry_id: &str,
    ) -> StoreResult<bool> {
        let tokens: Vec<String> = conn
            .smembers(self.keys.entry_tokens(log_name, entry_id))
            .await
            .map_err(redis_err)?;
        let member = self.keys.member(log_name, entry_id);

        let mut pipe = redis::pipe();
        pipe.del(self.keys.entry(log_name, entry_id))
            .srem(self.keys.raw_ids(log_name), entry_id)
            .ignore()
            .zrem(self.keys.structured_ids(log_name), entry_id)
            .ignore()
            .zrem(self.keys.timestamps(), &member)
            .ignore()
            .del(self.keys.entry_tokens(log_name, entry_id))
            .ignore();
        for token in &tokens {
            pipe.srem(self.keys.token(token), &member).ignore();
        }
        let (removed,): (i64,) = pipe.query_async(conn).await.map_err(redis_err)?;

        let remaining_raw: i64 = conn
            .scard(self.keys.raw_ids(log_name))
            .await
            .map_err(redis_err)?;
        let remaining_structured: i64 = conn
            .zcard(self.keys.structured_ids(log_name))
            .await
            .map_err(redis_err)?;
        if remaining_raw == 0 && remaining_structured == 0 {
            let _: () = conn
                .srem(self.keys.lognames(), log_name)
                .await
                .map_err(redis_err)?;
        }

        Ok(removed > 0)
    }

    /// Fetch and parse entry values for `ids`, dropping nil slots: a missing
    /// value just means the entry vanished between index read and fetch.
    async fn fetch_entries(
        &self,
        conn: &mut ConnectionManager,
        log_name: &str,
        ids: &[String],
    ) -> StoreResult<Vec<LogEntry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| self.keys.entry(log_name, id)).collect();
        let values: Vec<Option<String>> = conn.mget(keys).await.map_err(redis_err)?;
        let mut entries = Vec::with_capacity(values.len());
        for value in values.into_iter().flatten() {
            entries.push(serde_json::from_str(&value)?);
        }
        Ok(entries)
    }

    /// All entry ids of a log: structured ids newest-first, then raw ids not
    /// already seen, in set order.
    async fn all_entry_ids(
        &self,
        conn: &mut ConnectionManager,
        log_name: &str,
    ) -> StoreResult<Vec<String>> {
        let structured: Vec<String> = conn
            .zrevrange(self.keys.structured_ids(log_name), 0, -1)
            .await
            .map_err(redis_err)?;
        let raw: Vec<String> = conn
            .smembers(self.keys.raw_ids(log_name))
            .await
            .map_err(redis_err)?;
        let mut ids = structured;
        for id in raw {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn log_exists(
        &self,
        conn: &mut ConnectionManager,
        tenant: &str,
        name: &str,
    ) -> StoreResult<bool> {
        conn.exists(self.keys.tenant_log(tenant, name))
            .await
            .map_err(redis_err)
    }

    async fn require_log(
        &self,
        conn: &mut ConnectionManager,
        name: &str,
    ) -> StoreResult<()> {
        if self.log_exists(conn, &self.tenant_id, name).await? {
            Ok(())
        } else {
            Err(StoreError::LogNotFound(name.to_string()))
        }
    }
}

#[async_trait]
impl StorageAdaptor for RedisStore {
    async fn initialize(&self) -> StoreResult<()> {
        self.connection().await?;
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        let mut guard = self.conn.write().await;
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
        let mut conn = self.connection().await?;
        let id = entry_id.filter(|id| !id.is_empty()).unwrap_or_else(new_id);
        let entry = LogEntry {
            id: id.clone(),
            log_id: log_name.to_string(),
            timestamp: json!(now_millis()),
            data: coerce::ensure_json_value(data),
            search_tokens,
            encryption_info: None,
        };
        self.write_entry(&mut conn, &entry, false).await?;
        Ok(id)
    }

    async fn get_log_entry_by_id(
        &self,
        log_name: &str,
        entry_id: &str,
    ) -> StoreResult<Option<LogEntry>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn
            .get(self.keys.entry(log_name, entry_id))
            .await
            .map_err(redis_err)?;
        value
            .map(|value| serde_json::from_str(&value).map_err(StoreError::from))
            .transpose()
    }

    async fn update_log_entry_by_id(
        &self,
        log_name: &str,
        entry_id: &str,
        data: Value,
    ) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let key = self.keys.entry(log_name, entry_id);
        let value: Option<String> = conn.get(&key).await.map_err(redis_err)?;
        let Some(value) = value else {
            return Ok(false);
        };
        let mut entry: LogEntry = serde_json::from_str(&value)?;
        entry.data = coerce::ensure_json_value(data);
        entry.timestamp = json!(now_millis());
        let _: () = conn
            .set(&key, serde_json::to_string(&entry)?)
            .await
            .map_err(redis_err)?;
        Ok(true)
    }

    async fn delete_log_entry_by_id(&self, log_name: &str, entry_id: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        self.delete_entry(&mut conn, log_name, entry_id).await
    }

    async fn get_logs_by_name(
        &self,
        log_name: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<LogEntry>> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn
            .smembers(self.keys.raw_ids(log_name))
            .await
            .map_err(redis_err)?;
        let mut entries = self.fetch_entries(&mut conn, log_name, &ids).await?;
        entries.truncate(limit.unwrap_or(DEFAULT_RAW_LIMIT));
        Ok(entries)
    }

    async fn get_log_names(&self, limit: Option<usize>) -> StoreResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let mut names: Vec<String> = conn
            .smembers(self.keys.lognames())
            .await
            .map_err(redis_err)?;
        names.sort();
        names.truncate(limit.unwrap_or(DEFAULT_RAW_LIMIT));
        Ok(names)
    }

    async fn clear_log(&self, log_name: &str) -> StoreResult<u64> {
        let mut conn = self.connection().await?;
        let ids = self.all_entry_ids(&mut conn, log_name).await?;
        let mut removed = 0;
        for id in ids {
            if self.delete_entry(&mut conn, log_name, &id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn create_log(&self, mut log: Log) -> StoreResult<Log> {
        let mut conn = self.connection().await?;
        let tenant = self.resolve_tenant(&log.tenant_id).to_string();
        if self.log_exists(&mut conn, &tenant, &log.name).await? {
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

        let mut pipe = redis::pipe();
        pipe.set(
            self.keys.tenant_log(&tenant, &log.name),
            serde_json::to_string(&log)?,
        )
        .ignore()
        .sadd(self.keys.tenant_logs(&tenant), &log.name)
        .ignore();
        let _: () = pipe.query_async(&mut conn).await.map_err(redis_err)?;
        Ok(log)
    }

    async fn get_logs(&self) -> StoreResult<Vec<Log>> {
        let mut conn = self.connection().await?;
        let mut names: Vec<String> = conn
            .smembers(self.keys.tenant_logs(&self.tenant_id))
            .await
            .map_err(redis_err)?;
        names.sort();
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = names
            .iter()
            .map(|name| self.keys.tenant_log(&self.tenant_id, name))
            .collect();
        let values: Vec<Option<String>> = conn.mget(keys).await.map_err(redis_err)?;
        let mut logs = Vec::with_capacity(values.len());
        for value in values.into_iter().flatten() {
            logs.push(serde_json::from_str(&value)?);
        }
        Ok(logs)
    }

    async fn get_log(&self, name: &str) -> StoreResult<Option<Log>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn
            .get(self.keys.tenant_log(&self.tenant_id, name))
            .await
            .map_err(redis_err)?;
        value
            .map(|value| serde_json::from_str(&value).map_err(StoreError::from))
            .transpose()
    }

    async fn update_log(&self, patch: LogPatch) -> StoreResult<Log> {
        let mut conn = self.connection().await?;
        let tenant = self
            .resolve_tenant(patch.tenant_id.as_deref().unwrap_or(""))
            .to_string();
        let key = self.keys.tenant_log(&tenant, &patch.name);
        let value: Option<String> = conn.get(&key).await.map_err(redis_err)?;
        let Some(value) = value else {
            return Err(StoreError::LogNotFound(patch.name));
        };
        let mut log: Log = serde_json::from_str(&value)?;
        patch.apply_to(&mut log);
        log.updated_at = now_millis();
        let _: () = conn
            .set(&key, serde_json::to_string(&log)?)
            .await
            .map_err(redis_err)?;
        Ok(log)
    }

    async fn delete_log(&self, name: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        if !self.log_exists(&mut conn, &self.tenant_id, name).await? {
            return Ok(false);
        }
        let mut pipe = redis::pipe();
        pipe.del(self.keys.tenant_log(&self.tenant_id, name))
            .ignore()
            .srem(self.keys.tenant_logs(&self.tenant_id), name)
            .ignore();
        let _: () = pipe.query_async(&mut conn).await.map_err(redis_err)?;

        // Cascade: no entry outlives its log.
        self.clear_log(name).await?;
        Ok(true)
    }

    async fn append_log_entry(&self, log_name: &str, entry: LogEntry) -> StoreResult<String> {
        let mut conn = self.connection().await?;
        self.require_log(&mut conn, log_name).await?;
        let prepared = prepare_entry(log_name, entry);
        self.write_entry(&mut conn, &prepared, true).await?;
        Ok(prepared.id)
    }

    async fn batch_append_log_entries(
        &self,
        log_name: &str,
        entries: Vec<LogEntry>,
    ) -> StoreResult<BatchAppendReceipt> {
        let mut conn = self.connection().await?;
        self.require_log(&mut conn, log_name).await?;
        let mut receipts = Vec::with_capacity(entries.len());
        for entry in entries {
            let prepared = prepare_entry(log_name, entry);
            receipts.push(logvault_storage::AppendedEntry {
                id: prepared.id.clone(),
                timestamp: prepared.timestamp.clone(),
            });
            self.write_entry(&mut conn, &prepared, true).await?;
        }
        Ok(BatchAppendReceipt { entries: receipts })
    }

    async fn get_log_entries(
        &self,
        log_name: &str,
        page: PageRequest,
    ) -> StoreResult<Page<LogEntry>> {
        let mut conn = self.connection().await?;
        self.require_log(&mut conn, log_name).await?;

        let (limit, offset) = page.resolve(DEFAULT_ENTRY_PAGE_LIMIT);
        let total: i64 = conn
            .zcard(self.keys.structured_ids(log_name))
            .await
            .map_err(redis_err)?;
        let ids: Vec<String> = if limit == 0 {
            Vec::new()
        } else {
            conn.zrevrange(
                self.keys.structured_ids(log_name),
                offset as isize,
                (offset + limit - 1) as isize,
            )
            .await
            .map_err(redis_err)?
        };
        let items = self.fetch_entries(&mut conn, log_name, &ids).await?;
        Ok(Page::from_parts(
            items,
            total as usize,
            &page,
            DEFAULT_ENTRY_PAGE_LIMIT,
        ))
    }

    async fn get_log_entry(
        &self,
        log_name: &str,
        entry_id: &str,
    ) -> StoreResult<Option<LogEntry>> {
        let mut conn = self.connection().await?;
        self.require_log(&mut conn, log_name).await?;
        let value: Option<String> = conn
            .get(self.keys.entry(log_name, entry_id))
            .await
            .map_err(redis_err)?;
        value
            .map(|value| serde_json::from_str(&value).map_err(StoreError::from))
            .transpose()
    }

    async fn search_log_entries(
        &self,
        log_name: &str,
        query: EntryQuery,
    ) -> StoreResult<Page<LogEntry>> {
        let mut conn = self.connection().await?;
        self.require_log(&mut conn, log_name).await?;

        let ids: Vec<String> = if query.search_tokens.is_empty() {
            self.all_entry_ids(&mut conn, log_name).await?
        } else {
            // Token sets intersect to entries carrying every token; members
            // of other logs are filtered out by prefix.
            let token_keys: Vec<String> = query
                .search_tokens
                .iter()
                .map(|token| self.keys.token(token))
                .collect();
            let members: Vec<String> = conn.sinter(token_keys).await.map_err(redis_err)?;
            let prefix = format!("{log_name}:");
            members
                .into_iter()
                .filter_map(|member| member.strip_prefix(&prefix).map(str::to_string))
                .collect()
        };

        let matching: Vec<LogEntry> = self
            .fetch_entries(&mut conn, log_name, &ids)
            .await?
            .into_iter()
            .filter(|entry| query.matches(entry))
            .collect();
        Ok(Page::from_full(matching, &query.page, DEFAULT_ENTRY_PAGE_LIMIT))
    }

    async fn search_logs(&self, query: LogSearchQuery) -> StoreResult<Vec<SearchHit>> {
        let mut conn = self.connection().await?;
        let limit = query.limit.unwrap_or(DEFAULT_RAW_LIMIT);
        let mut names: Vec<String> = conn
            .smembers(self.keys.lognames())
            .await
            .map_err(redis_err)?;
        names.sort();

        let mut hits = Vec::new();
        'outer: for name in names {
            if let Some(filter) = &query.log_name {
                if filter != &name {
                    continue;
                }
            }
            let ids = self.all_entry_ids(&mut conn, &name).await?;
            for entry in self.fetch_entries(&mut conn, &name, &ids).await? {
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
        let mut conn = self.connection().await?;
        let count: i64 = conn
            .zcount(self.keys.timestamps(), "-inf", cutoff_ms)
            .await
            .map_err(redis_err)?;
        Ok(count as u64)
    }

    async fn purge_expired_entries(
        &self,
        cutoff_ms: u64,
        batch_size: usize,
    ) -> StoreResult<PurgeOutcome> {
        let mut conn = self.connection().await?;
        let members: Vec<String> = conn
            .zrangebyscore_limit(
                self.keys.timestamps(),
                "-inf",
                cutoff_ms,
                0,
                batch_size as isize,
            )
            .await
            .map_err(redis_err)?;

        let mut purged = 0;
        for member in members {
            let Some((log_name, entry_id)) = keys::split_member(&member) else {
                // Unparseable member: drop it so it cannot wedge the scan.
                let _: () = conn
                    .zrem(self.keys.timestamps(), &member)
                    .await
                    .map_err(redis_err)?;
                continue;
            };
            let (log_name, entry_id) = (log_name.to_string(), entry_id.to_string());
            match self.delete_entry(&mut conn, &log_name, &entry_id).await {
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

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("namespace", &self.keys.namespace())
            .field("tenant_id", &self.tenant_id)
            .field("host", &self.options.host)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_url_from_parts() {
        let options = RedisStoreOptions {
            host: "cache.internal".to_string(),
            port: 6380,
            password: Some("hunter2".to_string()),
            db: 3,
            ..RedisStoreOptions::default()
        };
        assert_eq!(
            options.connection_url(),
            "redis://:hunter2@cache.internal:6380/3"
        );
    }

    #[test]
    fn connection_url_tls_and_explicit_url() {
        let tls = RedisStoreOptions {
            tls: true,
            ..RedisStoreOptions::default()
        };
        assert!(tls.connection_url().starts_with("rediss://"));

        let explicit = RedisStoreOptions {
            url: Some("redis://elsewhere:7000/1".to_string()),
            host: "ignored".to_string(),
            ..RedisStoreOptions::default()
        };
        assert_eq!(explicit.connection_url(), "redis://elsewhere:7000/1");
    }
}
