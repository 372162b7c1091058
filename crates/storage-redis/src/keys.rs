//! Key scheme for the Redis backend
//!
//! All keys live under `logserver:<namespace>:`, optionally behind a
//! configured outer prefix. Retention-scan members are `"<log>:<entry>"`;
//! generated entry ids never contain `:`, so members split at the last
//! colon even when log names contain one.

use logvault_storage::SERVER_NAMESPACE;

#[derive(Clone, Debug)]
pub(crate) struct KeySpace {
    base: String,
    namespace: String,
}

impl KeySpace {
    pub(crate) fn new(key_prefix: Option<String>, namespace: String) -> Self {
        let base = match key_prefix {
            Some(prefix) if !prefix.is_empty() => {
                format!("{prefix}:{SERVER_NAMESPACE}:{namespace}:")
            }
            _ => format!("{SERVER_NAMESPACE}:{namespace}:"),
        };
        Self { base, namespace }
    }

    pub(crate) fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Serialized entry value.
    pub(crate) fn entry(&self, log_name: &str, entry_id: &str) -> String {
        format!("{}logs:{log_name}:{entry_id}", self.base)
    }

    /// Set of log names with at least one entry.
    pub(crate) fn lognames(&self) -> String {
        format!("{}lognames", self.base)
    }

    /// Unordered set of raw-path entry ids.
    pub(crate) fn raw_ids(&self, log_name: &str) -> String {
        format!("{}logs:{log_name}:ids", self.base)
    }

    /// Sorted set of structured-path entry ids, scored by creation instant.
    pub(crate) fn structured_ids(&self, log_name: &str) -> String {
        format!("{}logs:{log_name}:entries", self.base)
    }

    /// Sorted set of `"<log>:<entry>"` members scored by creation instant,
    /// used only for retention scans.
    pub(crate) fn timestamps(&self) -> String {
        format!("{}timestamps", self.base)
    }

    /// Serialized structured log document.
    pub(crate) fn tenant_log(&self, tenant: &str, name: &str) -> String {
        format!("{}tenant:{tenant}:log:{name}", self.base)
    }

    /// Set of log names owned by a tenant.
    pub(crate) fn tenant_logs(&self, tenant: &str) -> String {
        format!("{}tenant:{tenant}:logs", self.base)
    }

    /// Set of `"<log>:<entry>"` members carrying a search token.
    pub(crate) fn token(&self, token: &str) -> String {
        format!("{}token:{token}", self.base)
    }

    /// Reverse index: tokens carried by one entry.
    pub(crate) fn entry_tokens(&self, log_name: &str, entry_id: &str) -> String {
        format!("{}log:{log_name}:{entry_id}:tokens", self.base)
    }

    /// Retention-scan member for an entry.
    pub(crate) fn member(&self, log_name: &str, entry_id: &str) -> String {
        format!("{log_name}:{entry_id}")
    }
}

/// Split a retention member back into `(log_name, entry_id)`.
pub(crate) fn split_member(member: &str) -> Option<(&str, &str)> {
    member.rsplit_once(':')
}
