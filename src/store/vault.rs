//! VaultStore - markdown notes on disk
//!
//! A vault is a directory tree of `.md` notes. Each note's metadata is its
//! YAML front-matter; writing metadata rewrites only that block and keeps
//! the body as-is.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use walkdir::WalkDir;

use super::front_matter::{compose_front_matter, split_front_matter};
use super::{normalise_folder, DocumentLookup, DocumentRef, DocumentStore, DOCUMENT_EXTENSION};
use crate::error::{MetaBindError, Result};

/// Directory-backed document store
#[derive(Debug, Clone)]
pub struct VaultStore {
    root: PathBuf,
}

impl VaultStore {
    /// Open a vault rooted at `root` (must be an existing directory)
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(MetaBindError::Config {
                reason: format!("vault root '{}' is not a directory", root.display()),
            });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute file path of a document
    pub fn file_path(&self, document: &DocumentRef) -> PathBuf {
        self.root.join(document.as_str())
    }

    /// Vault-relative ref for an absolute path, if it is a note inside the vault
    pub fn document_for(&self, path: &Path) -> Option<DocumentRef> {
        if !path.extension().is_some_and(|ext| ext == DOCUMENT_EXTENSION) {
            return None;
        }
        self.relative_path(path).map(DocumentRef::new)
    }

    /// `/`-separated path relative to the vault root
    fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Every note in the vault, sorted by path
    pub fn documents(&self) -> Vec<DocumentRef> {
        let mut documents: Vec<DocumentRef> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.document_for(entry.path()))
            .collect();
        documents.sort();
        documents
    }

    async fn read_note(&self, document: &DocumentRef) -> Result<String> {
        let path = self.file_path(document);
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MetaBindError::DocumentNotFound {
                    document: document.to_string(),
                }
            } else {
                MetaBindError::Storage {
                    document: document.to_string(),
                    reason: e.to_string(),
                }
            }
        })
    }
}

impl DocumentLookup for VaultStore {
    fn find_documents_by_name(&self, name: &str) -> Vec<DocumentRef> {
        self.documents()
            .into_iter()
            .filter(|doc| doc.matches_name(name))
            .collect()
    }
}

#[async_trait]
impl DocumentStore for VaultStore {
    async fn read_metadata(&self, document: &DocumentRef) -> Result<Value> {
        let content = self.read_note(document).await?;
        split_front_matter(&content).parse_tree(document.as_str())
    }

    async fn write_metadata(&self, document: &DocumentRef, tree: &Value) -> Result<()> {
        let content = self.read_note(document).await?;
        let note = compose_front_matter(tree, split_front_matter(&content).body)?;

        tokio::fs::write(self.file_path(document), note)
            .await
            .map_err(|e| MetaBindError::Storage {
                document: document.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(document = %document, "front-matter written");
        Ok(())
    }

    async fn list_folder(&self, folder: &str) -> Result<Vec<String>> {
        let folder = normalise_folder(folder);
        let dir = self.root.join(&folder);
        if !dir.is_dir() {
            return Err(MetaBindError::Storage {
                document: folder,
                reason: "folder not found in the vault".to_string(),
            });
        }

        let mut files: Vec<String> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.relative_path(entry.path()))
            .collect();
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn vault() -> (TempDir, VaultStore) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("projects")).unwrap();
        fs::write(
            dir.path().join("projects/Task.md"),
            "---\nstatus: draft\n---\n# Task\n",
        )
        .unwrap();
        fs::write(dir.path().join("Task.md"), "no metadata here\n").unwrap();
        fs::write(dir.path().join("image.png"), [0u8; 4]).unwrap();
        let store = VaultStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn open_rejects_missing_root() {
        let err = VaultStore::open("/definitely/not/a/vault").unwrap_err();
        assert_eq!(err.code(), "MB-050");
    }

    #[test]
    fn documents_lists_only_notes() {
        let (_dir, store) = vault();
        assert_eq!(
            store.documents(),
            vec![DocumentRef::new("Task.md"), DocumentRef::new("projects/Task.md")]
        );
    }

    #[test]
    fn lookup_can_be_ambiguous() {
        let (_dir, store) = vault();
        assert_eq!(store.find_documents_by_name("Task").len(), 2);
        assert_eq!(store.find_documents_by_name("projects/Task").len(), 1);
    }

    #[tokio::test]
    async fn read_front_matter_and_missing_front_matter() {
        let (_dir, store) = vault();
        let task = DocumentRef::new("projects/Task.md");
        assert_eq!(store.read_metadata(&task).await.unwrap(), json!({"status": "draft"}));

        let bare = DocumentRef::new("Task.md");
        assert_eq!(store.read_metadata(&bare).await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn write_keeps_body() {
        let (dir, store) = vault();
        let bare = DocumentRef::new("Task.md");
        store
            .write_metadata(&bare, &json!({"done": true}))
            .await
            .unwrap();

        let content = fs::read_to_string(dir.path().join("Task.md")).unwrap();
        assert_eq!(content, "---\ndone: true\n---\nno metadata here\n");
        assert_eq!(store.read_metadata(&bare).await.unwrap(), json!({"done": true}));
    }

    #[tokio::test]
    async fn list_folder_returns_direct_children() {
        let (dir, store) = vault();
        fs::create_dir_all(dir.path().join("projects/old")).unwrap();
        fs::write(dir.path().join("projects/cover.jpg"), [0u8; 4]).unwrap();
        fs::write(dir.path().join("projects/old/stale.png"), [0u8; 4]).unwrap();

        assert_eq!(
            store.list_folder("projects").await.unwrap(),
            vec!["projects/Task.md".to_string(), "projects/cover.jpg".to_string()]
        );
        assert_eq!(
            store.list_folder("/").await.unwrap(),
            vec!["Task.md".to_string(), "image.png".to_string()]
        );
        assert_eq!(store.list_folder("nope").await.unwrap_err().code(), "MB-040");
    }

    #[tokio::test]
    async fn read_missing_note_is_not_found() {
        let (_dir, store) = vault();
        let err = store
            .read_metadata(&DocumentRef::new("Gone.md"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MB-042");
    }
}
