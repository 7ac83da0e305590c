//! Vault Watcher - turns filesystem events into document changes
//!
//! ```text
//! notify::RecommendedWatcher ──callback──▶ filter .md ──try_send──▶ mpsc
//!                                                               │
//!                  forward_changes ◀──────────── recv ──────────┘
//!                        │
//!                        └──▶ MetadataManager::invalidate_and_reload
//! ```
//!
//! The flush of our own edits also produces events. The reread tree then
//! equals what the cache last flushed, so the reload is skipped and edits
//! made since the flush survive.

use std::sync::Arc;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{DocumentRef, VaultStore};
use crate::cache::MetadataManager;
use crate::error::Result;

/// Bounded so a burst of edits cannot grow memory without limit
const CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentChange {
    /// Created or modified
    Modified(DocumentRef),
    Removed(DocumentRef),
}

impl DocumentChange {
    pub fn document(&self) -> &DocumentRef {
        match self {
            DocumentChange::Modified(d) | DocumentChange::Removed(d) => d,
        }
    }
}

/// Recursive watcher over a vault directory
pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
    events: mpsc::Receiver<DocumentChange>,
    vault: VaultStore,
}

impl VaultWatcher {
    pub fn new(store: &VaultStore) -> Result<Self> {
        // Event paths come back absolute and canonical
        let vault = VaultStore::open(std::fs::canonicalize(store.root())?)?;
        let (tx, events) = mpsc::channel(CHANNEL_CAPACITY);

        let filter = vault.clone();
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    for change in convert_event(&filter, &event) {
                        if let Err(e) = tx.try_send(change) {
                            tracing::warn!(error = %e, "document change dropped");
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "vault watch error"),
            },
            Config::default(),
        )?;
        watcher.watch(vault.root(), RecursiveMode::Recursive)?;

        tracing::info!(root = %vault.root().display(), "watching vault");
        Ok(Self {
            _watcher: watcher,
            events,
            vault,
        })
    }

    pub fn root(&self) -> &std::path::Path {
        self.vault.root()
    }

    /// Next change; None once the watcher is gone
    pub async fn recv(&mut self) -> Option<DocumentChange> {
        self.events.recv().await
    }

    /// Non-blocking poll
    pub fn try_recv(&mut self) -> Option<DocumentChange> {
        self.events.try_recv().ok()
    }
}

fn convert_event(vault: &VaultStore, event: &Event) -> Vec<DocumentChange> {
    let removed = match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => false,
        EventKind::Remove(_) => true,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter_map(|path| {
            let document = vault.document_for(path)?;
            // Renames report both ends as Modify
            if removed || !path.exists() {
                Some(DocumentChange::Removed(document))
            } else {
                Some(DocumentChange::Modified(document))
            }
        })
        .collect()
}

/// Reload cached documents as their files change, until `cancel` fires
pub async fn forward_changes(
    mut watcher: VaultWatcher,
    manager: Arc<MetadataManager>,
    cancel: CancellationToken,
) {
    loop {
        let change = tokio::select! {
            _ = cancel.cancelled() => break,
            change = watcher.recv() => match change {
                Some(change) => change,
                None => break,
            },
        };

        match change {
            DocumentChange::Modified(document) => {
                if let Err(e) = manager.invalidate_and_reload(&document).await {
                    tracing::warn!(document = %document, error = %e, "reload after change failed");
                }
            }
            DocumentChange::Removed(document) => {
                if manager.is_cached(&document) {
                    tracing::warn!(document = %document, "bound note removed; keeping cached metadata");
                }
            }
        }
    }
    tracing::debug!("change forwarding stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::fs;
    use tempfile::TempDir;

    fn vault() -> (TempDir, VaultStore) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Note.md"), "---\na: 1\n---\n").unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        (dir, VaultStore::open(root).unwrap())
    }

    #[test]
    fn modify_of_note_is_a_change() {
        let (_dir, vault) = vault();
        let event = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(vault.root().join("Note.md"));
        assert_eq!(
            convert_event(&vault, &event),
            vec![DocumentChange::Modified(DocumentRef::new("Note.md"))]
        );
    }

    #[test]
    fn non_notes_and_access_events_are_ignored() {
        let (_dir, vault) = vault();
        let png = Event::new(EventKind::Create(CreateKind::File)).add_path(vault.root().join("a.png"));
        assert!(convert_event(&vault, &png).is_empty());

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(vault.root().join("Note.md"));
        assert!(convert_event(&vault, &access).is_empty());
    }

    #[test]
    fn remove_and_vanished_paths_are_removals() {
        let (_dir, vault) = vault();
        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path(vault.root().join("Note.md"));
        assert_eq!(
            convert_event(&vault, &remove),
            vec![DocumentChange::Removed(DocumentRef::new("Note.md"))]
        );

        let renamed = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(vault.root().join("Old.md"));
        assert_eq!(
            convert_event(&vault, &renamed)[0].document(),
            &DocumentRef::new("Old.md")
        );
    }
}
