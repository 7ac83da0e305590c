//! FieldRegistry - every live bound field, keyed by subscriber id

use std::sync::Arc;

use dashmap::DashMap;

use super::BoundField;
use crate::cache::SubscriberId;
use crate::path::PropertyPath;
use crate::store::DocumentRef;

/// Cheap to clone; clones share the same table
#[derive(Clone, Default)]
pub struct FieldRegistry {
    fields: Arc<DashMap<SubscriberId, Arc<BoundField>>>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, field: Arc<BoundField>) {
        self.fields.insert(field.id(), field);
    }

    pub fn remove(&self, id: SubscriberId) -> Option<Arc<BoundField>> {
        self.fields.remove(&id).map(|(_, field)| field)
    }

    pub fn get(&self, id: SubscriberId) -> Option<Arc<BoundField>> {
        self.fields.get(&id).map(|f| Arc::clone(f.value()))
    }

    pub fn get_all(&self) -> Vec<Arc<BoundField>> {
        self.fields.iter().map(|f| Arc::clone(f.value())).collect()
    }

    /// Fields bound into `document`, optionally only those overlapping `path`
    pub fn fields_bound_to(&self, document: &DocumentRef, path: Option<&PropertyPath>) -> Vec<Arc<BoundField>> {
        self.fields
            .iter()
            .filter(|entry| {
                entry.value().target().is_some_and(|target| {
                    &target.document == document && path.map_or(true, |p| target.path.overlaps(p))
                })
            })
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl std::fmt::Debug for FieldRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRegistry").field("fields", &self.fields.len()).finish()
    }
}
