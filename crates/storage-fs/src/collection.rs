//! Append-only JSON-lines document collection
//!
//! One document per line; a replacement line supersedes earlier lines with
//! the same id, and a `{"$$deleted": "<id>"}` tombstone removes one. Loading
//! replays the file in order and then compacts it, so the file never grows
//! past one line per live document plus the writes since the last load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use logvault_storage::StoreResult;

/// A document that knows its own primary key.
pub(crate) trait DocId {
    fn doc_id(&self) -> &str;
}

const TOMBSTONE_FIELD: &str = "$$deleted";

pub(crate) struct Collection<T> {
    file: File,
    /// id -> document.
    docs: HashMap<String, T>,
    /// Ids in insertion order; replacements keep their slot.
    order: Vec<String>,
}

impl<T> Collection<T>
where
    T: Clone + Serialize + DeserializeOwned + DocId,
{
    /// Load a collection, replaying and compacting its backing file.
    pub(crate) async fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut docs: HashMap<String, T> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        match fs::read_to_string(&path).await {
            Ok(contents) => {
                for line in contents.lines() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let value: Value = match serde_json::from_str(line) {
                        Ok(value) => value,
                        Err(error) => {
                            // A torn final line from a crash mid-write is
                            // expected; anything else is still skipped so one
                            // bad line cannot take the whole collection down.
                            tracing::warn!(path = %path.display(), %error, "skipping unreadable line");
                            continue;
                        }
                    };
                    if let Some(id) = value.get(TOMBSTONE_FIELD).and_then(Value::as_str) {
                        if docs.remove(id).is_some() {
                            order.retain(|existing| existing != id);
                        }
                        continue;
                    }
                    match serde_json::from_value::<T>(value) {
                        Ok(doc) => {
                            let id = doc.doc_id().to_string();
                            if docs.insert(id.clone(), doc).is_none() {
                                order.push(id);
                            }
                        }
                        Err(error) => {
                            tracing::warn!(path = %path.display(), %error, "skipping malformed document");
                        }
                    }
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }

        // Compact: rewrite one line per live document, in order.
        let mut compacted = String::new();
        for id in &order {
            if let Some(doc) = docs.get(id) {
                compacted.push_str(&serde_json::to_string(doc)?);
                compacted.push('\n');
            }
        }
        fs::write(&path, compacted).await?;

        let file = OpenOptions::new().append(true).open(&path).await?;

        Ok(Self { file, docs, order })
    }

    async fn append_line(&mut self, line: String) -> StoreResult<()> {
        self.file.write_all(line.as_bytes()).await?;
        self.file.write_all(b"\n").await?;
        self.file.flush().await?;
        Ok(())
    }

    /// Insert or replace a document, persisting before returning.
    pub(crate) async fn upsert(&mut self, doc: T) -> StoreResult<()> {
        let line = serde_json::to_string(&doc)?;
        self.append_line(line).await?;
        let id = doc.doc_id().to_string();
        if self.docs.insert(id.clone(), doc).is_none() {
            self.order.push(id);
        }
        Ok(())
    }

    /// Remove a document by id. Returns whether it existed.
    pub(crate) async fn remove(&mut self, id: &str) -> StoreResult<bool> {
        if !self.docs.contains_key(id) {
            return Ok(false);
        }
        let tombstone = serde_json::json!({ TOMBSTONE_FIELD: id });
        self.append_line(tombstone.to_string()).await?;
        self.docs.remove(id);
        self.order.retain(|existing| existing != id);
        Ok(true)
    }

    pub(crate) fn get(&self, id: &str) -> Option<&T> {
        self.docs.get(id)
    }

    /// Documents in insertion order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|id| self.docs.get(id))
    }

    /// Flush the append handle.
    pub(crate) async fn flush(&mut self) -> StoreResult<()> {
        self.file.flush().await?;
        Ok(())
    }
}
