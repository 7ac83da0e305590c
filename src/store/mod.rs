//! Store Module - document lookup and persistence (v0.1)
//!
//! The binding engine never touches files directly. It consumes two seams:
//! - `DocumentLookup`: resolve a name to zero, one or many documents
//! - `DocumentStore`: read/write a document's metadata tree
//!
//! Key types:
//! - `DocumentRef`: cheap-clone identity of one document (vault-relative path)
//! - `MemoryStore`: in-process store backed by DashMap
//! - `VaultStore`: directory of markdown notes with YAML front-matter
//! - `VaultWatcher`: notify-based feed of out-of-band edits

mod front_matter;
mod memory;
mod vault;
mod watcher;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use front_matter::{compose_front_matter, split_front_matter, FrontMatter};
pub use memory::MemoryStore;
pub use vault::VaultStore;
pub use watcher::{forward_changes, DocumentChange, VaultWatcher};

/// File extension of bindable documents
pub const DOCUMENT_EXTENSION: &str = "md";

/// Identity of one concrete document
///
/// Uses Arc<str> for zero-cost cloning: the same ref is held by caches,
/// bound fields and bind targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentRef(Arc<str>);

impl DocumentRef {
    /// Create a ref from a vault-relative path (backslashes normalised to '/')
    pub fn new(path: impl AsRef<str>) -> Self {
        let normalised = path.as_ref().replace('\\', "/");
        Self(Arc::from(normalised.trim_start_matches("./")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name without folder and extension ("notes/Task.md" → "Task")
    pub fn name(&self) -> &str {
        let file = self.0.rsplit('/').next().unwrap_or(&self.0);
        strip_extension(file)
    }

    /// True if `name` designates this document
    ///
    /// Accepts the full relative path, the path without extension, or the
    /// bare file name.
    pub fn matches_name(&self, name: &str) -> bool {
        let name = name.trim().replace('\\', "/");
        let name = name.trim_start_matches("./");
        name == self.as_str() || name == strip_extension(self.as_str()) || name == self.name()
    }
}

fn strip_extension(path: &str) -> &str {
    path.strip_suffix(".md").unwrap_or(path)
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name → document resolution
pub trait DocumentLookup: Send + Sync {
    /// All documents matching `name`; may be empty or ambiguous
    fn find_documents_by_name(&self, name: &str) -> Vec<DocumentRef>;
}

/// Metadata persistence for documents
///
/// Enables dependency injection: `VaultStore` in production, `MemoryStore`
/// in tests.
#[async_trait]
pub trait DocumentStore: DocumentLookup {
    /// Read the document's metadata tree (an empty map if it has none)
    async fn read_metadata(&self, document: &DocumentRef) -> Result<Value>;

    /// Replace the document's metadata tree
    async fn write_metadata(&self, document: &DocumentRef, tree: &Value) -> Result<()>;

    /// Vault-relative paths of the files directly inside `folder`, sorted
    ///
    /// Fails if the folder does not exist.
    async fn list_folder(&self, folder: &str) -> Result<Vec<String>>;
}

/// Folder part of a vault-relative path ("" at the root)
pub(crate) fn parent_folder(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(folder, _)| folder)
}

/// Folder text as written by users: no surrounding quotes or slashes
pub(crate) fn normalise_folder(folder: &str) -> String {
    folder
        .trim()
        .trim_matches('"')
        .replace('\\', "/")
        .trim_matches('/')
        .to_string()
}
