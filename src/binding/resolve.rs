//! Bind target resolution - raw declaration text → BindTarget
//!
//! Performs no caching: callers resolve once per widget load and keep the
//! result. Name lookup is delegated to a `DocumentLookup`; anything other
//! than exactly one match is an error, never a guess.

use super::BindTarget;
use crate::error::{MetaBindError, Result};
use crate::path::PropertyPath;
use crate::store::{DocumentLookup, DocumentRef};

/// Separates the document name from the property path
pub const FIELD_SEPARATOR: char = '#';

/// Resolve `raw` (as written in a declaration) relative to `current`
pub fn resolve_bind_target<L>(raw: &str, current: &DocumentRef, lookup: &L) -> Result<BindTarget>
where
    L: DocumentLookup + ?Sized,
{
    let parts: Vec<&str> = raw.split(FIELD_SEPARATOR).collect();

    let (document_name, path_text) = match parts.as_slice() {
        [path] => (None, *path),
        [name, path] => (Some(name.trim()).filter(|n| !n.is_empty()), *path),
        _ => {
            return Err(MetaBindError::BindTargetSyntax {
                target: raw.to_string(),
                reason: format!("ambiguous field separator: only one '{FIELD_SEPARATOR}' is allowed"),
                cause: None,
            })
        }
    };

    let path = PropertyPath::parse(path_text).map_err(|e| MetaBindError::BindTargetSyntax {
        target: raw.to_string(),
        reason: "invalid property path".to_string(),
        cause: Some(Box::new(e)),
    })?;

    let document = match document_name {
        None => current.clone(),
        Some(name) => lookup_single(raw, name, lookup)?,
    };

    tracing::debug!(bind_target = raw, document = %document, path = %path, "bind target resolved");
    Ok(BindTarget::new(document, path))
}

fn lookup_single<L>(raw: &str, name: &str, lookup: &L) -> Result<DocumentRef>
where
    L: DocumentLookup + ?Sized,
{
    let mut matches = lookup.find_documents_by_name(name);
    match matches.len() {
        0 => Err(MetaBindError::BindTargetResolution {
            target: raw.to_string(),
            reason: format!("target not found: no note named '{name}'"),
        }),
        1 => Ok(matches.remove(0)),
        n => Err(MetaBindError::BindTargetResolution {
            target: raw.to_string(),
            reason: format!(
                "ambiguous target; qualify further ({n} notes named '{name}': {})",
                matches
                    .iter()
                    .map(|d| d.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }),
    }
}
