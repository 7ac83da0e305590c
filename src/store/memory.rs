//! MemoryStore - document metadata held in a DashMap (v0.1)
//!
//! Lock-free in-process store. Used by tests and by hosts that keep their
//! documents in memory. Counts writes so callers can observe coalescing, and
//! can be told to fail writes to exercise the retry path. Non-note files
//! (images) are tracked by path only.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::{Map, Value};

use super::{normalise_folder, parent_folder, DocumentLookup, DocumentRef, DocumentStore};
use crate::error::{MetaBindError, Result};

/// Thread-safe in-memory document store
#[derive(Clone, Default)]
pub struct MemoryStore {
    /// Documents: ref → metadata tree
    documents: Arc<DashMap<DocumentRef, Value>>,
    /// Other files: vault-relative paths
    files: Arc<DashSet<String>>,
    writes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a document and return its ref
    pub fn insert(&self, path: &str, tree: Value) -> DocumentRef {
        let document = DocumentRef::new(path);
        self.documents.insert(document.clone(), tree);
        document
    }

    /// Add a document with no metadata
    pub fn insert_empty(&self, path: &str) -> DocumentRef {
        self.insert(path, Value::Object(Map::new()))
    }

    /// Add a non-note file such as an image
    pub fn insert_file(&self, path: &str) {
        self.files.insert(path.replace('\\', "/"));
    }

    /// Current stored tree for a document
    pub fn tree(&self, document: &DocumentRef) -> Option<Value> {
        self.documents.get(document).map(|t| t.value().clone())
    }

    /// Replace a stored tree behind the engine's back (simulates an external edit)
    pub fn edit_externally(&self, document: &DocumentRef, tree: Value) {
        self.documents.insert(document.clone(), tree);
    }

    /// Number of successful `write_metadata` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following write fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl DocumentLookup for MemoryStore {
    fn find_documents_by_name(&self, name: &str) -> Vec<DocumentRef> {
        let mut found: Vec<DocumentRef> = self
            .documents
            .iter()
            .filter(|entry| entry.key().matches_name(name))
            .map(|entry| entry.key().clone())
            .collect();
        found.sort();
        found
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read_metadata(&self, document: &DocumentRef) -> Result<Value> {
        self.tree(document)
            .ok_or_else(|| MetaBindError::DocumentNotFound {
                document: document.to_string(),
            })
    }

    async fn write_metadata(&self, document: &DocumentRef, tree: &Value) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MetaBindError::Storage {
                document: document.to_string(),
                reason: "writes are disabled".to_string(),
            });
        }
        self.documents.insert(document.clone(), tree.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_folder(&self, folder: &str) -> Result<Vec<String>> {
        let folder = normalise_folder(folder);
        let paths: Vec<String> = self
            .documents
            .iter()
            .map(|entry| entry.key().as_str().to_string())
            .chain(self.files.iter().map(|entry| entry.key().clone()))
            .collect();

        let prefix = format!("{folder}/");
        if !folder.is_empty() && !paths.iter().any(|p| p.starts_with(&prefix)) {
            return Err(MetaBindError::Storage {
                document: folder,
                reason: "folder not found".to_string(),
            });
        }

        let mut found: Vec<String> = paths.into_iter().filter(|p| parent_folder(p) == folder).collect();
        found.sort();
        Ok(found)
    }
}
