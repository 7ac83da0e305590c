//! BoundField - the binding between one widget and one metadata location
//!
//! A bound field owns two signals:
//!
//! ```text
//!   widget ──read_signal.set()──▶ [listener] ──▶ cache.update(id, path, v)
//!   widget ◀──write_signal──────── cache (register / fan-out / reload)
//! ```
//!
//! Lifecycle: `Unbound` (no target) or `Resolving → Bound | Errored`, then
//! `Bound → Unloaded`. `Errored` and `Unloaded` are terminal.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::binding::BindTarget;
use crate::cache::{MetadataCache, MetadataManager, SubscriberId};
use crate::error::{MetaBindError, Result};
use crate::signal::{ListenerHandle, Signal, ValueSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// No bind target; the widget keeps its value locally
    Unbound,
    /// Target resolved, cache not yet attached
    Resolving,
    Bound,
    Errored,
    Unloaded,
}

impl BindingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BindingState::Errored | BindingState::Unloaded)
    }
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BindingState::Unbound => "unbound",
            BindingState::Resolving => "resolving",
            BindingState::Bound => "bound",
            BindingState::Errored => "errored",
            BindingState::Unloaded => "unloaded",
        };
        f.write_str(s)
    }
}

struct Attachment {
    state: BindingState,
    cache: Option<Arc<MetadataCache>>,
    read_listener: Option<ListenerHandle>,
}

pub struct BoundField {
    id: SubscriberId,
    target: Option<BindTarget>,
    read_signal: ValueSignal,
    write_signal: ValueSignal,
    attachment: Mutex<Attachment>,
}

impl BoundField {
    pub fn new(target: Option<BindTarget>) -> Self {
        let state = if target.is_some() {
            BindingState::Resolving
        } else {
            BindingState::Unbound
        };
        Self {
            id: SubscriberId::new(),
            target,
            read_signal: Signal::new(None),
            write_signal: Signal::new(None),
            attachment: Mutex::new(Attachment {
                state,
                cache: None,
                read_listener: None,
            }),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn target(&self) -> Option<&BindTarget> {
        self.target.as_ref()
    }

    /// Widget → cache. The widget sets this on every user edit.
    pub fn read_signal(&self) -> &ValueSignal {
        &self.read_signal
    }

    /// Cache → widget. The widget listens here.
    pub fn write_signal(&self) -> &ValueSignal {
        &self.write_signal
    }

    pub fn state(&self) -> BindingState {
        self.attachment.lock().state
    }

    /// Last value pushed by the cache (absent until loaded)
    pub fn initial_value(&self) -> Option<Value> {
        self.write_signal.get()
    }

    pub fn mark_errored(&self) {
        let mut attachment = self.attachment.lock();
        if attachment.state != BindingState::Unloaded {
            attachment.state = BindingState::Errored;
        }
    }

    /// Attach to the target document's cache
    ///
    /// Pushes the current value at the target path into `write_signal` before
    /// returning. A no-op for unbound fields and fields already bound.
    pub async fn load(&self, manager: &MetadataManager) -> Result<()> {
        let Some(target) = &self.target else {
            return Ok(());
        };
        match self.state() {
            BindingState::Resolving => {}
            BindingState::Bound | BindingState::Unbound => return Ok(()),
            state => {
                return Err(MetaBindError::internal(format!(
                    "load of {state} field bound to '{target}'"
                )))
            }
        }

        let cache = match manager.acquire(&target.document).await {
            Ok(cache) => cache,
            Err(e) => {
                self.mark_errored();
                return Err(e);
            }
        };

        let mut attachment = self.attachment.lock();
        if attachment.state != BindingState::Resolving {
            // Unloaded while the document was being read
            return Ok(());
        }

        let listener = {
            let cache = Arc::clone(&cache);
            let id = self.id;
            let path = target.path.clone();
            self.read_signal.register_listener(move |value: &Option<Value>| {
                let value = value.clone().unwrap_or(Value::Null);
                if let Err(e) = cache.update(id, &path, value) {
                    tracing::warn!(document = %cache.document(), path = %path, error = %e, "widget change not applied");
                }
            })
        };
        attachment.read_listener = Some(listener);
        attachment.cache = Some(Arc::clone(&cache));
        attachment.state = BindingState::Bound;
        drop(attachment);

        if let Err(e) = cache.register(self.id, target.path.clone(), self.write_signal.clone()) {
            self.unload();
            return Err(e);
        }
        tracing::debug!(field = %self.id, bind_target = %target, "field bound");
        Ok(())
    }

    /// Detach from the cache; safe to call any number of times, in any state
    pub fn unload(&self) {
        let (cache, listener) = {
            let mut attachment = self.attachment.lock();
            if attachment.state == BindingState::Unloaded {
                return;
            }
            attachment.state = BindingState::Unloaded;
            (attachment.cache.take(), attachment.read_listener.take())
        };

        if let Some(listener) = listener {
            self.read_signal.unregister_listener(listener);
        }
        if let Some(cache) = cache {
            cache.unregister(self.id);
        }
        tracing::debug!(field = %self.id, "field unloaded");
    }
}

impl fmt::Debug for BoundField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundField")
            .field("id", &self.id)
            .field("target", &self.target.as_ref().map(ToString::to_string))
            .field("state", &self.state())
            .finish()
    }
}
