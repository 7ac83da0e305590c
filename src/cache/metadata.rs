//! MetadataCache - shared in-memory mirror of one document's metadata
//!
//! Every widget bound into a document reads and writes through the same
//! cache instance, so widgets bound to overlapping paths always converge.
//!
//! ```text
//!   widget A ──update()──▶ ┌──────────────┐ ──sink.set()──▶ widget B
//!                          │ tree + subs  │ ──sink.set()──▶ widget C
//!   external edit ─reload─▶└──────────────┘      (A is never echoed)
//! ```
//!
//! Updates and reloads go through a FIFO work queue. The first caller drains
//! it; an `update()` issued by a listener during fan-out is queued and applied
//! after the current fan-out completes. Cascades therefore run iteratively,
//! in arrival order, with no interleaving of two fan-outs.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{MetaBindError, Result};
use crate::path::PropertyPath;
use crate::signal::ValueSignal;
use crate::store::DocumentRef;

/// Identity of one binding instance inside a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscriber {
    id: SubscriberId,
    path: PropertyPath,
    sink: ValueSignal,
}

struct CacheState {
    tree: Value,
    /// Tree as last read from or written to storage
    persisted: Value,
    /// Registration order is notification order
    subscribers: Vec<Subscriber>,
    dirty: bool,
    idle_cycles: u32,
}

impl CacheState {
    fn is_registered(&self, id: SubscriberId) -> bool {
        self.subscribers.iter().any(|s| s.id == id)
    }
}

enum PendingOp {
    Update {
        origin: SubscriberId,
        path: PropertyPath,
        value: Value,
    },
    Reload {
        tree: Value,
    },
}

/// Per-document metadata cache
pub struct MetadataCache {
    document: DocumentRef,
    state: Mutex<CacheState>,
    queue: Mutex<VecDeque<PendingOp>>,
    draining: AtomicBool,
}

impl MetadataCache {
    /// Create a cache around a freshly read tree
    pub fn new(document: DocumentRef, tree: Value) -> Self {
        Self {
            document,
            state: Mutex::new(CacheState {
                persisted: tree.clone(),
                tree,
                subscribers: Vec::new(),
                dirty: false,
                idle_cycles: 0,
            }),
            queue: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    pub fn document(&self) -> &DocumentRef {
        &self.document
    }

    /// Add a subscriber and push the current value at `path` into `sink`
    ///
    /// Returns a snapshot of the whole tree for callers that need fallback
    /// logic. Registering an id twice replaces its path and sink. An empty
    /// path is rejected; whole-tree observers use
    /// [`register_whole_tree`](Self::register_whole_tree).
    pub fn register(&self, id: SubscriberId, path: PropertyPath, sink: ValueSignal) -> Result<Value> {
        if path.is_empty() {
            return Err(self.consistency_error(&format!("register of {id} with an empty path")));
        }
        Ok(self.insert_subscriber(id, path, sink))
    }

    /// Subscribe to the whole tree: `sink` receives the full tree on every
    /// change, whatever path changed
    pub fn register_whole_tree(&self, id: SubscriberId, sink: ValueSignal) -> Value {
        self.insert_subscriber(id, PropertyPath::default(), sink)
    }

    fn insert_subscriber(&self, id: SubscriberId, path: PropertyPath, sink: ValueSignal) -> Value {
        let (initial, snapshot) = {
            let mut state = self.state.lock();
            if let Some(pos) = state.subscribers.iter().position(|s| s.id == id) {
                tracing::warn!(document = %self.document, subscriber = %id, "subscriber registered twice, replacing");
                state.subscribers.remove(pos);
            }
            state.subscribers.push(Subscriber {
                id,
                path: path.clone(),
                sink: sink.clone(),
            });
            state.idle_cycles = 0;
            (path.read(&state.tree), state.tree.clone())
        };

        tracing::debug!(document = %self.document, subscriber = %id, path = %path, "subscriber registered");
        sink.set(initial);
        snapshot
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut state = self.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| s.id != id);
        let removed = state.subscribers.len() != before;
        if removed {
            tracing::debug!(
                document = %self.document,
                subscriber = %id,
                remaining = state.subscribers.len(),
                "subscriber unregistered"
            );
        }
        removed
    }

    /// Write `value` at `path` on behalf of subscriber `origin`
    ///
    /// Every other subscriber on an overlapping path receives the value at
    /// its own path; `origin` is not echoed. The write is marked for the next
    /// coalesced flush.
    pub fn update(&self, origin: SubscriberId, path: &PropertyPath, value: Value) -> Result<()> {
        if path.is_empty() {
            return Err(self.consistency_error("update with an empty path"));
        }
        if !self.state.lock().is_registered(origin) {
            return Err(self.consistency_error(&format!("update from unregistered subscriber {origin}")));
        }

        self.enqueue(PendingOp::Update {
            origin,
            path: path.clone(),
            value,
        });
        Ok(())
    }

    /// Replace the tree with freshly read content and notify every subscriber
    pub fn reload(&self, tree: Value) {
        self.enqueue(PendingOp::Reload { tree });
    }

    /// Current value at `path`
    pub fn get(&self, path: &PropertyPath) -> Option<Value> {
        path.read(&self.state.lock().tree)
    }

    /// Clone of the whole tree
    pub fn snapshot(&self) -> Value {
        self.state.lock().tree.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// True if the tree has changes not yet persisted
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Clear the dirty flag and hand out the tree to persist, if dirty
    pub fn take_dirty_snapshot(&self) -> Option<Value> {
        let mut state = self.state.lock();
        if !state.dirty {
            return None;
        }
        state.dirty = false;
        Some(state.tree.clone())
    }

    /// Flag the tree for the next flush (used after a failed write)
    pub fn mark_dirty(&self) {
        self.state.lock().dirty = true;
    }

    /// Record `tree` as what storage now holds (after a successful flush)
    pub fn mark_persisted(&self, tree: Value) {
        self.state.lock().persisted = tree;
    }

    /// True if `tree` is what this cache last read or wrote
    ///
    /// A reread that matches is our own write coming back, not a new edit.
    pub fn is_persisted(&self, tree: &Value) -> bool {
        self.state.lock().persisted == *tree
    }

    /// Count one sync cycle; returns how many consecutive cycles the cache
    /// has spent without subscribers.
    pub fn tick_idle(&self) -> u32 {
        let mut state = self.state.lock();
        if state.subscribers.is_empty() {
            state.idle_cycles = state.idle_cycles.saturating_add(1);
        } else {
            state.idle_cycles = 0;
        }
        state.idle_cycles
    }

    fn consistency_error(&self, reason: &str) -> MetaBindError {
        tracing::error!(document = %self.document, reason, "metadata cache invariant violated");
        MetaBindError::internal(format!("{reason} (document '{}')", self.document))
    }

    fn enqueue(&self, op: PendingOp) {
        self.queue.lock().push_back(op);

        loop {
            if self.draining.swap(true, Ordering::AcqRel) {
                // Outer caller is draining and will pick this op up
                return;
            }
            {
                let _drain = DrainGuard(&self.draining);
                while let Some(op) = self.queue.lock().pop_front() {
                    self.apply(op);
                }
            }
            // An op may have landed between the last pop and the flag reset
            if self.queue.lock().is_empty() {
                return;
            }
        }
    }

    fn apply(&self, op: PendingOp) {
        let deliveries: Vec<(SubscriberId, ValueSignal, Option<Value>)> = {
            let mut state = self.state.lock();
            match op {
                PendingOp::Update {
                    origin,
                    path,
                    value,
                } => {
                    path.write(&mut state.tree, value);
                    state.dirty = true;
                    let tree = &state.tree;
                    state
                        .subscribers
                        .iter()
                        .filter(|s| s.id != origin && s.path.overlaps(&path))
                        .map(|s| (s.id, s.sink.clone(), s.path.read(tree)))
                        .collect()
                }
                PendingOp::Reload { tree } => {
                    state.persisted = tree.clone();
                    state.tree = tree;
                    state.dirty = false;
                    let tree = &state.tree;
                    state
                        .subscribers
                        .iter()
                        .map(|s| (s.id, s.sink.clone(), s.path.read(tree)))
                        .collect()
                }
            }
        };

        for (id, sink, value) in deliveries {
            // A listener earlier in this fan-out may have torn this one down
            if self.state.lock().is_registered(id) {
                sink.set(value);
            }
        }
    }
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MetadataCache")
            .field("document", &self.document)
            .field("subscribers", &state.subscribers.len())
            .field("dirty", &state.dirty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;
    use serde_json::json;
    use std::sync::Arc;

    fn path(p: &str) -> PropertyPath {
        PropertyPath::parse(p).unwrap()
    }

    /// Subscribe a recording sink; returns (id, sink, received values)
    fn subscriber(
        cache: &MetadataCache,
        p: &str,
    ) -> (SubscriberId, ValueSignal, Arc<Mutex<Vec<Option<Value>>>>) {
        let id = SubscriberId::new();
        let sink: ValueSignal = Signal::new(None);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        sink.register_listener(move |v: &Option<Value>| record.lock().push(v.clone()));
        cache.register(id, path(p), sink.clone()).unwrap();
        (id, sink, seen)
    }

    fn cache(tree: Value) -> MetadataCache {
        MetadataCache::new(DocumentRef::new("D.md"), tree)
    }

    #[test]
    fn register_pushes_current_value() {
        let cache = cache(json!({"count": 3}));
        let (_, sink, seen) = subscriber(&cache, "count");
        assert_eq!(sink.get(), Some(json!(3)));
        assert_eq!(*seen.lock(), vec![Some(json!(3))]);
    }

    #[test]
    fn register_missing_path_pushes_absent() {
        let cache = cache(json!({}));
        let id = SubscriberId::new();
        let snapshot = cache
            .register(id, path("status"), Signal::new(Some(json!("stale"))))
            .unwrap();
        assert_eq!(snapshot, json!({}));
        assert_eq!(cache.get(&path("status")), None);
    }

    #[test]
    fn update_notifies_others_but_not_origin() {
        let cache = cache(json!({"count": 0}));
        let (a, _, seen_a) = subscriber(&cache, "count");
        let (_, _, seen_b) = subscriber(&cache, "count");

        cache.update(a, &path("count"), json!(5)).unwrap();

        assert_eq!(*seen_a.lock(), vec![Some(json!(0))]);
        assert_eq!(*seen_b.lock(), vec![Some(json!(0)), Some(json!(5))]);
        assert_eq!(cache.get(&path("count")), Some(json!(5)));
        assert!(cache.is_dirty());
    }

    #[test]
    fn overlapping_paths_receive_their_own_subtree() {
        let cache = cache(json!({"meta": {"tags": ["a"]}, "other": 1}));
        let (writer, _, _) = subscriber(&cache, "meta.tags[0]");
        let (_, parent, _) = subscriber(&cache, "meta");
        let (_, child, _) = subscriber(&cache, "meta.tags");
        let (_, unrelated, seen_unrelated) = subscriber(&cache, "other");

        cache.update(writer, &path("meta.tags[0]"), json!("z")).unwrap();

        assert_eq!(parent.get(), Some(json!({"tags": ["z"]})));
        assert_eq!(child.get(), Some(json!(["z"])));
        assert_eq!(unrelated.get(), Some(json!(1)));
        assert_eq!(seen_unrelated.lock().len(), 1);
    }

    #[test]
    fn each_update_delivered_exactly_once() {
        let cache = cache(json!({}));
        let (a, _, _) = subscriber(&cache, "n");
        let (_, _, seen_b) = subscriber(&cache, "n");

        for i in 1..=3 {
            cache.update(a, &path("n"), json!(i)).unwrap();
        }
        assert_eq!(
            *seen_b.lock(),
            vec![None, Some(json!(1)), Some(json!(2)), Some(json!(3))]
        );
    }

    #[test]
    fn update_from_unregistered_subscriber_is_rejected_without_mutation() {
        let cache = cache(json!({"a": 1}));
        let err = cache
            .update(SubscriberId::new(), &path("a"), json!(2))
            .unwrap_err();
        assert_eq!(err.code(), "MB-020");
        assert_eq!(cache.snapshot(), json!({"a": 1}));
        assert!(!cache.is_dirty());
    }

    #[test]
    fn update_with_empty_path_is_rejected() {
        let cache = cache(json!({"a": 1}));
        let (id, _, _) = subscriber(&cache, "a");
        let err = cache
            .update(id, &PropertyPath::default(), json!(2))
            .unwrap_err();
        assert_eq!(err.code(), "MB-020");
        assert_eq!(cache.snapshot(), json!({"a": 1}));
    }

    #[test]
    fn register_rejects_empty_path() {
        let cache = cache(json!({"a": 1}));
        let err = cache
            .register(SubscriberId::new(), PropertyPath::default(), Signal::new(None))
            .unwrap_err();
        assert_eq!(err.code(), "MB-020");
        assert_eq!(cache.subscriber_count(), 0);
    }

    #[test]
    fn whole_tree_subscriber_sees_every_change() {
        let cache = cache(json!({"a": 1}));
        let (writer, _, _) = subscriber(&cache, "b.c");
        let observer: ValueSignal = Signal::new(None);
        cache.register_whole_tree(SubscriberId::new(), observer.clone());
        assert_eq!(observer.get(), Some(json!({"a": 1})));

        cache.update(writer, &path("b.c"), json!(2)).unwrap();
        assert_eq!(observer.get(), Some(json!({"a": 1, "b": {"c": 2}})));
    }

    #[test]
    fn unregister_is_idempotent() {
        let cache = cache(json!({}));
        let (id, _, _) = subscriber(&cache, "a");
        assert!(cache.unregister(id));
        assert!(!cache.unregister(id));
        assert_eq!(cache.subscriber_count(), 0);
    }

    #[test]
    fn reload_notifies_everyone_including_unchanged() {
        let cache = cache(json!({"a": 1, "b": 2}));
        let (_, _, seen_a) = subscriber(&cache, "a");
        let (_, _, seen_b) = subscriber(&cache, "b");

        cache.reload(json!({"a": 1, "b": 3}));

        assert_eq!(*seen_a.lock(), vec![Some(json!(1)), Some(json!(1))]);
        assert_eq!(*seen_b.lock(), vec![Some(json!(2)), Some(json!(3))]);
        assert!(!cache.is_dirty());
    }

    #[test]
    fn persisted_tree_follows_reads_flushes_and_reloads() {
        let cache = cache(json!({"n": 0}));
        let (id, _, _) = subscriber(&cache, "n");
        assert!(cache.is_persisted(&json!({"n": 0})));

        cache.update(id, &path("n"), json!(1)).unwrap();
        assert!(cache.is_persisted(&json!({"n": 0})));

        let flushed = cache.take_dirty_snapshot().unwrap();
        cache.mark_persisted(flushed);
        assert!(cache.is_persisted(&json!({"n": 1})));

        cache.reload(json!({"n": 5}));
        assert!(cache.is_persisted(&json!({"n": 5})));
        assert!(!cache.is_persisted(&json!({"n": 1})));
    }

    #[test]
    fn reentrant_updates_are_queued_not_interleaved() {
        let cache = Arc::new(cache(json!({})));
        let log = Arc::new(Mutex::new(Vec::<String>::new()));

        // "mirror" copies every change of `a` into `b`, from inside its listener
        let mirror_id = SubscriberId::new();
        let mirror_sink: ValueSignal = Signal::new(None);
        {
            let cache = Arc::clone(&cache);
            let log = Arc::clone(&log);
            mirror_sink.register_listener(move |v: &Option<Value>| {
                log.lock().push(format!("mirror got {v:?}"));
                if let Some(v) = v {
                    cache.update(mirror_id, &path("b"), v.clone()).unwrap();
                    log.lock().push("mirror update returned".to_string());
                }
            });
        }
        cache.register(mirror_id, path("a"), mirror_sink).unwrap();

        let (writer, _, _) = subscriber(&cache, "a");
        let watcher_sink: ValueSignal = Signal::new(None);
        {
            let log = Arc::clone(&log);
            watcher_sink.register_listener(move |v: &Option<Value>| {
                log.lock().push(format!("watcher got {v:?}"));
            });
        }
        cache.register(SubscriberId::new(), path("b"), watcher_sink.clone()).unwrap();
        log.lock().clear();

        cache.update(writer, &path("a"), json!(7)).unwrap();

        assert_eq!(watcher_sink.get(), Some(json!(7)));
        assert_eq!(cache.snapshot(), json!({"a": 7, "b": 7}));
        // the nested update is applied only after the outer fan-out finished
        assert_eq!(
            *log.lock(),
            vec![
                "mirror got Some(Number(7))".to_string(),
                "mirror update returned".to_string(),
                "watcher got Some(Number(7))".to_string(),
            ]
        );
    }

    #[test]
    fn long_cascade_does_not_grow_the_stack() {
        // Each link copies `n` + 1 into `n`; 10k queued updates must not overflow.
        let cache = Arc::new(cache(json!({"n": 0})));
        let id = SubscriberId::new();
        let sink: ValueSignal = Signal::new(None);
        let other = SubscriberId::new();
        {
            let cache = Arc::clone(&cache);
            sink.register_listener(move |v: &Option<Value>| {
                let n = v.as_ref().and_then(Value::as_u64).unwrap_or(0);
                if n > 0 && n < 10_000 {
                    cache.update(id, &path("n"), json!(n + 1)).unwrap();
                }
            });
        }
        cache.register(id, path("n"), sink).unwrap();

        let ping_sink: ValueSignal = Signal::new(None);
        {
            let cache = Arc::clone(&cache);
            ping_sink.register_listener(move |v: &Option<Value>| {
                let n = v.as_ref().and_then(Value::as_u64).unwrap_or(0);
                if n > 0 && n < 10_000 {
                    cache.update(other, &path("n"), json!(n + 1)).unwrap();
                }
            });
        }
        cache.register(other, path("n"), ping_sink).unwrap();

        cache.update(other, &path("n"), json!(1)).unwrap();
        assert_eq!(cache.get(&path("n")), Some(json!(10_000)));
    }

    #[test]
    fn take_dirty_snapshot_clears_flag() {
        let cache = cache(json!({}));
        let (id, _, _) = subscriber(&cache, "a");
        assert_eq!(cache.take_dirty_snapshot(), None);

        cache.update(id, &path("a"), json!(1)).unwrap();
        assert_eq!(cache.take_dirty_snapshot(), Some(json!({"a": 1})));
        assert!(!cache.is_dirty());

        cache.mark_dirty();
        assert!(cache.is_dirty());
    }

    #[test]
    fn tick_idle_counts_only_without_subscribers() {
        let cache = cache(json!({}));
        let (id, _, _) = subscriber(&cache, "a");
        assert_eq!(cache.tick_idle(), 0);
        cache.unregister(id);
        assert_eq!(cache.tick_idle(), 1);
        assert_eq!(cache.tick_idle(), 2);
        subscriber(&cache, "a");
        assert_eq!(cache.tick_idle(), 0);
    }
}
