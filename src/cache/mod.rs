//! Cache Module - shared per-document metadata (v0.1)
//!
//! - `MetadataCache`: one document's tree plus its subscribers
//! - `MetadataManager`: creates, flushes and evicts caches

mod manager;
mod metadata;

pub use manager::{MetadataManager, SyncReport, SyncSettings, DEFAULT_EVICT_AFTER_CYCLES};
pub use metadata::{MetadataCache, SubscriberId};
