//! Shared data model for log storage
//!
//! Documents are serialized with `serde_json` in every backend. Entry
//! payloads (`data`) and logical timestamps are opaque: clients may send
//! ciphertext, so nothing here assumes a payload parses as anything in
//! particular, and nothing ever orders by the logical `timestamp`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default page size for raw/legacy listing operations.
pub const DEFAULT_RAW_LIMIT: usize = 100;

/// Default page size for structured entry listing.
pub const DEFAULT_ENTRY_PAGE_LIMIT: usize = 10;

/// How an entry payload was encrypted client-side, if at all.
///
/// Purely informational for the server; the payload is never decrypted here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionInfo {
    /// Client key version the payload was encrypted under.
    pub version: String,
    /// Cipher identifier, e.g. `"aes-256-gcm"`.
    pub algorithm: String,
}

/// Metadata record for a named log owned by a tenant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Log {
    /// Unique id, generated when absent on create.
    #[serde(default)]
    pub id: String,
    /// Log name, unique within its tenant and namespace.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Owning tenant. Empty means "use the adaptor's bound tenant".
    #[serde(default)]
    pub tenant_id: String,
    /// Epoch-ms creation instant, server-assigned.
    #[serde(default)]
    pub created_at: u64,
    /// Epoch-ms last-update instant, refreshed on update.
    #[serde(default)]
    pub updated_at: u64,
    /// Retention age in days; `None` means no per-log retention.
    #[serde(default)]
    pub retention_days: Option<u32>,
    /// Whether clients encrypt entries of this log.
    #[serde(default)]
    pub encryption_enabled: bool,
}

impl Log {
    /// Minimal log with just a name; remaining fields default.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            description: String::new(),
            tenant_id: String::new(),
            created_at: 0,
            updated_at: 0,
            retention_days: None,
            encryption_enabled: false,
        }
    }
}

/// Partial update for a log; `None` fields are left untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LogPatch {
    /// Name of the log to update.
    pub name: String,
    /// Replacement description.
    #[serde(default)]
    pub description: Option<String>,
    /// Replacement retention age in days.
    #[serde(default)]
    pub retention_days: Option<u32>,
    /// Replacement encryption flag.
    #[serde(default)]
    pub encryption_enabled: Option<bool>,
    /// Tenant override; empty/absent resolves to the adaptor's bound tenant.
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl LogPatch {
    /// Patch that only names the target log.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Merge this patch into `log`, leaving `updated_at` to the caller.
    pub fn apply_to(&self, log: &mut Log) {
        if let Some(description) = &self.description {
            log.description = description.clone();
        }
        if let Some(days) = self.retention_days {
            log.retention_days = Some(days);
        }
        if let Some(enabled) = self.encryption_enabled {
            log.encryption_enabled = enabled;
        }
    }
}

/// A single log entry, raw or structured.
///
/// `log_id` carries the owning log's name. `timestamp` is the logical client
/// timestamp: an epoch-ms number when the server assigned it, but possibly an
/// opaque ciphertext string when the client supplied its own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique id, generated when absent on append/store.
    #[serde(default)]
    pub id: String,
    /// Name of the owning log.
    #[serde(default)]
    pub log_id: String,
    /// Logical timestamp; server-assigned only when the client sent none.
    #[serde(default)]
    pub timestamp: Value,
    /// Opaque payload; may be ciphertext.
    pub data: Value,
    /// Client-derived opaque tokens for searchable encryption.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_tokens: Vec<String>,
    /// Client-reported encryption parameters, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_info: Option<EncryptionInfo>,
}

impl LogEntry {
    /// Entry with just a payload; remaining fields default.
    pub fn with_data(data: Value) -> Self {
        Self {
            id: String::new(),
            log_id: String::new(),
            timestamp: Value::Null,
            data,
            search_tokens: Vec::new(),
            encryption_info: None,
        }
    }

    /// The logical timestamp as epoch milliseconds, when it is numeric.
    ///
    /// Ciphertext or otherwise non-numeric timestamps yield `None` and are
    /// excluded from time-range filtering rather than coerced.
    pub fn timestamp_millis(&self) -> Option<u64> {
        self.timestamp.as_u64()
    }
}

/// Limit/offset pair for paginated listings.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct PageRequest {
    /// Maximum items to return; backend-group default when absent.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Items to skip; defaults to zero.
    #[serde(default)]
    pub offset: Option<usize>,
}

impl PageRequest {
    /// Request with explicit limit and offset.
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    /// Resolve to a concrete `(limit, offset)` pair.
    pub fn resolve(&self, default_limit: usize) -> (usize, usize) {
        (
            self.limit.unwrap_or(default_limit),
            self.offset.unwrap_or(0),
        )
    }
}

/// One page of a listing or search result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// The items of this page, at most `limit` of them.
    pub items: Vec<T>,
    /// Total matches ignoring pagination.
    pub total: usize,
    /// Whether `offset + limit` still falls short of `total`.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Slice an already-materialized full result set into one page.
    ///
    /// Every backend that filters in process funnels through this so the
    /// `total`/`has_more` arithmetic cannot drift between them.
    pub fn from_full(all: Vec<T>, request: &PageRequest, default_limit: usize) -> Self {
        let (limit, offset) = request.resolve(default_limit);
        let total = all.len();
        let items: Vec<T> = all.into_iter().skip(offset).take(limit).collect();
        Self {
            items,
            total,
            has_more: offset + limit < total,
        }
    }

    /// Page assembled from an externally paginated fetch.
    pub fn from_parts(items: Vec<T>, total: usize, request: &PageRequest, default_limit: usize) -> Self {
        let (limit, offset) = request.resolve(default_limit);
        Self {
            items,
            total,
            has_more: offset + limit < total,
        }
    }
}

/// Filter options for searching within one log's entries.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntryQuery {
    /// Substring match over the serialized entry.
    #[serde(default)]
    pub query: Option<String>,
    /// Entry must carry every listed token.
    #[serde(default)]
    pub search_tokens: Vec<String>,
    /// Inclusive lower bound on the numeric logical timestamp.
    #[serde(default)]
    pub start_time: Option<u64>,
    /// Inclusive upper bound on the numeric logical timestamp.
    #[serde(default)]
    pub end_time: Option<u64>,
    /// Pagination of the filtered result.
    #[serde(flatten)]
    pub page: PageRequest,
}

impl EntryQuery {
    /// Whether `entry` satisfies every filter of this query.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(query) = &self.query {
            let serialized = serde_json::to_string(entry).unwrap_or_default();
            if !serialized.contains(query.as_str()) {
                return false;
            }
        }
        if !self.search_tokens.is_empty()
            && !self
                .search_tokens
                .iter()
                .all(|token| entry.search_tokens.contains(token))
        {
            return false;
        }
        if self.start_time.is_some() || self.end_time.is_some() {
            let Some(ts) = entry.timestamp_millis() else {
                return false;
            };
            if self.start_time.is_some_and(|start| ts < start) {
                return false;
            }
            if self.end_time.is_some_and(|end| ts > end) {
                return false;
            }
        }
        true
    }
}

/// Filter options for searching across logs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LogSearchQuery {
    /// Substring match over the serialized entry.
    #[serde(default)]
    pub query: Option<String>,
    /// Restrict the search to a single log.
    #[serde(default)]
    pub log_name: Option<String>,
    /// Exact-match filters keyed by dot path into the entry document,
    /// e.g. `"data.level"`.
    #[serde(default)]
    pub field_filters: BTreeMap<String, Value>,
    /// Cap on returned hits.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl LogSearchQuery {
    /// Whether `entry` satisfies the query text and every field filter.
    ///
    /// The two filter kinds AND together; an empty query matches everything.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        let document = match serde_json::to_value(entry) {
            Ok(document) => document,
            Err(_) => return false,
        };
        if let Some(query) = &self.query {
            let serialized = document.to_string();
            if !serialized.contains(query.as_str()) {
                return false;
            }
        }
        self.field_filters
            .iter()
            .all(|(path, expected)| dot_lookup(&document, path) == Some(expected))
    }
}

/// Resolve a dot path like `"data.level"` against a JSON document.
fn dot_lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// One cross-log search hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Name of the log the entry belongs to.
    pub log_name: String,
    /// The matching entry.
    pub entry: LogEntry,
}

/// Id and timestamp assigned to one entry of a batch append.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppendedEntry {
    /// Assigned entry id.
    pub id: String,
    /// Logical timestamp the entry was stored with.
    pub timestamp: Value,
}

/// Receipt for a batch append.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchAppendReceipt {
    /// One receipt per appended entry, in input order.
    pub entries: Vec<AppendedEntry>,
}

/// Result of one bounded retention purge pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeOutcome {
    /// Entries actually removed; failed deletions are skipped, not counted.
    pub purged_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(data: Value) -> LogEntry {
        LogEntry::with_data(data)
    }

    #[test]
    fn page_from_full_slices_and_counts() {
        let page = Page::from_full(vec![1, 2, 3, 4, 5], &PageRequest::new(2, 1), 10);
        assert_eq!(page.items, vec![2, 3]);
        assert_eq!(page.total, 5);
        assert!(page.has_more);

        let last = Page::from_full(vec![1, 2, 3, 4, 5], &PageRequest::new(2, 4), 10);
        assert_eq!(last.items, vec![5]);
        assert!(!last.has_more);
    }

    #[test]
    fn page_defaults_apply_when_unset() {
        let page = Page::from_full((0..30).collect::<Vec<_>>(), &PageRequest::default(), 10);
        assert_eq!(page.items.len(), 10);
        assert_eq!(page.total, 30);
        assert!(page.has_more);
    }

    #[test]
    fn page_offset_past_end_is_empty() {
        let page = Page::from_full(vec![1, 2], &PageRequest::new(10, 5), 10);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 2);
        assert!(!page.has_more);
    }

    #[test]
    fn entry_query_substring_match() {
        let query = EntryQuery {
            query: Some("needle".to_string()),
            ..EntryQuery::default()
        };
        assert!(query.matches(&entry(json!({"message": "a needle here"}))));
        assert!(!query.matches(&entry(json!({"message": "nothing"}))));
    }

    #[test]
    fn entry_query_requires_all_tokens() {
        let query = EntryQuery {
            search_tokens: vec!["t1".to_string(), "t2".to_string()],
            ..EntryQuery::default()
        };
        let mut e = entry(json!({}));
        e.search_tokens = vec!["t1".to_string(), "t2".to_string(), "t3".to_string()];
        assert!(query.matches(&e));
        e.search_tokens = vec!["t1".to_string()];
        assert!(!query.matches(&e));
    }

    #[test]
    fn entry_query_time_range_skips_non_numeric_timestamps() {
        let query = EntryQuery {
            start_time: Some(100),
            end_time: Some(200),
            ..EntryQuery::default()
        };
        let mut e = entry(json!({}));
        e.timestamp = json!(150);
        assert!(query.matches(&e));
        e.timestamp = json!(250);
        assert!(!query.matches(&e));
        // Ciphertext timestamp: excluded, never coerced.
        e.timestamp = json!("0xdeadbeef");
        assert!(!query.matches(&e));
    }

    #[test]
    fn log_search_field_filter_dot_path() {
        let query = LogSearchQuery {
            field_filters: [("data.amount".to_string(), json!(10))].into_iter().collect(),
            ..LogSearchQuery::default()
        };
        assert!(query.matches(&entry(json!({"amount": 10}))));
        assert!(!query.matches(&entry(json!({"amount": 20}))));
        assert!(!query.matches(&entry(json!("opaque"))));
    }

    proptest::proptest! {
        // Stepping the offset by the limit must walk the full set exactly
        // once, regardless of limit/offset geometry.
        #[test]
        fn paging_covers_everything_once(total in 0usize..200, limit in 1usize..40) {
            let all: Vec<usize> = (0..total).collect();
            let mut seen = Vec::new();
            let mut offset = 0;
            loop {
                let page = Page::from_full(all.clone(), &PageRequest::new(limit, offset), 10);
                proptest::prop_assert_eq!(page.total, total);
                let done = !page.has_more;
                seen.extend(page.items);
                if done {
                    break;
                }
                offset += limit;
            }
            proptest::prop_assert_eq!(seen, all);
        }
    }

    #[test]
    fn log_patch_merges_only_present_fields() {
        let mut log = Log::named("audit");
        log.description = "old".to_string();
        log.retention_days = Some(7);

        let patch = LogPatch {
            name: "audit".to_string(),
            description: Some("new".to_string()),
            ..LogPatch::default()
        };
        patch.apply_to(&mut log);

        assert_eq!(log.description, "new");
        assert_eq!(log.retention_days, Some(7));
    }
}
