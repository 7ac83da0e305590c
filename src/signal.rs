//! Signal - single-slot publish/subscribe (v0.1)
//!
//! Holds the latest value and broadcasts every `set` to all registered
//! listeners, in registration order. There is no history: only the last
//! value is retained.
//!
//! Listeners are snapshotted before fan-out and invoked with no lock held,
//! so a listener may call `set` (on this or any other signal) while being
//! notified. Nested fan-out on the same signal is bounded by
//! [`MAX_NOTIFY_DEPTH`]; past that the value is stored but not broadcast.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Maximum nesting of `set` calls on one signal during its own fan-out
pub const MAX_NOTIFY_DEPTH: usize = 32;

/// Callback invoked with each new value
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Signal carrying an optional metadata value (`None` = absent)
pub type ValueSignal = Signal<Option<Value>>;

/// Opaque handle returned by [`Signal::register_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

struct SignalInner<T> {
    value: T,
    listeners: Vec<(ListenerHandle, Listener<T>)>,
}

/// Shared single-value broadcast channel. Clones share the same slot.
pub struct Signal<T> {
    inner: Arc<Mutex<SignalInner<T>>>,
    next_handle: Arc<AtomicU64>,
    depth: Arc<AtomicUsize>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            next_handle: Arc::clone(&self.next_handle),
            depth: Arc::clone(&self.depth),
        }
    }
}

impl<T: Clone + Send + 'static> Signal<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SignalInner {
                value: initial,
                listeners: Vec::new(),
            })),
            next_handle: Arc::new(AtomicU64::new(0)),
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Last value set
    pub fn get(&self) -> T {
        self.inner.lock().value.clone()
    }

    /// Store `value` and notify every registered listener
    pub fn set(&self, value: T) {
        let snapshot: Vec<(ListenerHandle, Listener<T>)> = {
            let mut inner = self.inner.lock();
            inner.value = value.clone();
            inner
                .listeners
                .iter()
                .map(|(handle, listener)| (*handle, Arc::clone(listener)))
                .collect()
        };

        let guard = DepthGuard::enter(&self.depth);
        if guard.depth > MAX_NOTIFY_DEPTH {
            tracing::warn!(
                depth = guard.depth,
                "signal fan-out nested too deep, value stored without notifying"
            );
            return;
        }

        for (handle, listener) in snapshot {
            // Skip listeners removed by an earlier listener in this round
            if self.is_registered(handle) {
                listener(&value);
            }
        }
    }

    /// Register a callback; returns the handle used to remove it
    pub fn register_listener(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.inner.lock().listeners.push((handle, Arc::new(callback)));
        handle
    }

    /// Remove exactly one listener. Returns false if it was already gone.
    pub fn unregister_listener(&self, handle: ListenerHandle) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(h, _)| *h != handle);
        inner.listeners.len() != before
    }

    pub fn is_registered(&self, handle: ListenerHandle) -> bool {
        self.inner.lock().listeners.iter().any(|(h, _)| *h == handle)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Signal")
            .field("value", &inner.value)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

struct DepthGuard<'a> {
    counter: &'a AtomicUsize,
    depth: usize,
}

impl<'a> DepthGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let depth = counter.fetch_add(1, Ordering::AcqRel) + 1;
        Self { counter, depth }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_initial_then_latest() {
        let signal = Signal::new(1);
        assert_eq!(signal.get(), 1);
        signal.set(2);
        signal.set(3);
        assert_eq!(signal.get(), 3);
    }

    #[test]
    fn listeners_notified_in_registration_order() {
        let signal = Signal::new(0);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            signal.register_listener(move |v: &i32| seen.lock().push((tag, *v)));
        }

        signal.set(7);
        assert_eq!(
            *seen.lock(),
            vec![("first", 7), ("second", 7), ("third", 7)]
        );
    }

    #[test]
    fn unregister_removes_exactly_one_and_is_idempotent() {
        let signal = Signal::new(0);
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = {
            let hits = Arc::clone(&hits);
            signal.register_listener(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _h2 = {
            let hits = Arc::clone(&hits);
            signal.register_listener(move |_| {
                hits.fetch_add(10, Ordering::SeqCst);
            })
        };

        assert!(signal.unregister_listener(h1));
        assert!(!signal.unregister_listener(h1));
        assert_eq!(signal.listener_count(), 1);

        signal.set(1);
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn listener_may_set_reentrantly() {
        let signal = Signal::new(0);
        let echo = signal.clone();
        signal.register_listener(move |v: &i32| {
            if *v < 3 {
                echo.set(v + 1);
            }
        });

        signal.set(0);
        assert_eq!(signal.get(), 3);
    }

    #[test]
    fn unbounded_recursion_is_cut_off() {
        let signal = Signal::new(0u64);
        let echo = signal.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        signal.register_listener(move |v: &u64| {
            counter.fetch_add(1, Ordering::SeqCst);
            echo.set(v + 1);
        });

        signal.set(0);
        assert_eq!(calls.load(Ordering::SeqCst), MAX_NOTIFY_DEPTH);
        assert_eq!(signal.get(), MAX_NOTIFY_DEPTH as u64);
    }

    #[test]
    fn listener_removed_mid_fanout_is_skipped() {
        let signal = Signal::new(0);
        let late_hits = Arc::new(AtomicUsize::new(0));
        let late_handle = Arc::new(Mutex::new(None::<ListenerHandle>));

        {
            let signal_ref = signal.clone();
            let late_handle = Arc::clone(&late_handle);
            signal.register_listener(move |_| {
                if let Some(handle) = late_handle.lock().take() {
                    signal_ref.unregister_listener(handle);
                }
            });
        }
        let handle = {
            let late_hits = Arc::clone(&late_hits);
            signal.register_listener(move |_| {
                late_hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        *late_handle.lock() = Some(handle);

        signal.set(1);
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clones_share_the_slot() {
        let a: ValueSignal = Signal::new(None);
        let b = a.clone();
        b.set(Some(serde_json::json!("x")));
        assert_eq!(a.get(), Some(serde_json::json!("x")));
    }
}
