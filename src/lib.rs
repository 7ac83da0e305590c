//! metabind - two-way binding between input fields and note metadata
//!
//! Input fields declared in markdown notes (`INPUT[toggle:done]`) are bound to
//! a location in a note's YAML front-matter. Every field bound to the same
//! note shares one in-memory cache, so edits propagate to all of them at
//! once; the cache is written back to disk on a coalescing sync loop, and
//! external edits to the file are pushed back into the fields.
//!
//! ```text
//!  FieldHost ─┬─ Widget (toggle, text, slider, ...)
//!             └─ BoundField ── read/write Signals
//!                     │
//!                MetadataCache (one per note) ◀── MetadataManager
//!                     │                              │
//!                DocumentStore (vault / memory) ◀────┘ sync loop, watcher
//! ```

// ═══════════════════════════════════════════
// CORE
// ═══════════════════════════════════════════
pub mod error;
pub mod path;
pub mod signal;

// ═══════════════════════════════════════════
// BINDING
// ═══════════════════════════════════════════
pub mod binding;
pub mod cache;
pub mod field;

// ═══════════════════════════════════════════
// INPUT FIELDS
// ═══════════════════════════════════════════
pub mod declaration;
pub mod widget;

// ═══════════════════════════════════════════
// STORAGE & CONFIG
// ═══════════════════════════════════════════
pub mod config;
pub mod store;

pub use binding::{resolve_bind_target, BindTarget};
pub use cache::{MetadataCache, MetadataManager, SubscriberId, SyncReport, SyncSettings};
pub use config::MetaBindConfig;
pub use declaration::{parse_declaration, InputFieldDeclaration};
pub use error::{FixSuggestion, MetaBindError, Result};
pub use field::{BindingState, BoundField, FieldContext, FieldHost, FieldRegistry, Placement};
pub use path::PropertyPath;
pub use signal::{Signal, ValueSignal};
pub use store::{DocumentChange, DocumentLookup, DocumentRef, DocumentStore, MemoryStore, VaultStore, VaultWatcher};
pub use widget::{InputField, Widget, WidgetKind};
