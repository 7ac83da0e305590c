//! Binding Module - bind targets (v0.1)
//!
//! A bind target names a document (defaulting to the one the widget lives
//! in) and a property path inside that document's metadata:
//!
//! ```text
//! status              → current note, path [status]
//! #status             → current note, path [status]
//! Other#meta.tags[0]  → note "Other", path [meta, tags, 0]
//! a#b#c               → error: ambiguous field separator
//! ```

mod resolve;

use std::fmt;

use crate::path::PropertyPath;
use crate::store::DocumentRef;

pub use resolve::{resolve_bind_target, FIELD_SEPARATOR};

/// A resolved (document, path) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindTarget {
    pub document: DocumentRef,
    pub path: PropertyPath,
}

impl BindTarget {
    pub fn new(document: DocumentRef, path: PropertyPath) -> Self {
        Self { document, path }
    }

    /// True if both targets live in the same document on overlapping paths
    pub fn overlaps(&self, other: &BindTarget) -> bool {
        self.document == other.document && self.path.overlaps(&other.path)
    }
}

impl fmt::Display for BindTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.document, FIELD_SEPARATOR, self.path)
    }
}
