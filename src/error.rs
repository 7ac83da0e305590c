// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Meta Bind error types with error codes
//!
//! Error code ranges:
//! - MB-000-009: Property path errors
//! - MB-010-019: Bind target errors
//! - MB-020-029: Internal consistency errors
//! - MB-030-039: Declaration errors
//! - MB-040-049: Storage / front-matter errors
//! - MB-050-059: Configuration errors
//! - MB-060-069: File watcher / IO errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetaBindError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum MetaBindError {
    // ═══════════════════════════════════════════
    // PATH ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[MB-001] Invalid property path '{path}': {reason}")]
    PathSyntax { path: String, reason: String },

    // ═══════════════════════════════════════════
    // BIND TARGET ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[MB-010] Invalid bind target '{target}': {reason}")]
    BindTargetSyntax {
        target: String,
        reason: String,
        #[source]
        cause: Option<Box<MetaBindError>>,
    },

    #[error("[MB-011] Bind target '{target}' could not be resolved: {reason}")]
    BindTargetResolution { target: String, reason: String },

    // ═══════════════════════════════════════════
    // INTERNAL ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[MB-020] Internal consistency error: {reason}")]
    InternalConsistency { reason: String },

    // ═══════════════════════════════════════════
    // DECLARATION ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[MB-030] Invalid declaration '{declaration}': {reason}")]
    Declaration { declaration: String, reason: String },

    #[error("[MB-031] Invalid argument '{argument}': {reason}")]
    InvalidArgument { argument: String, reason: String },

    // ═══════════════════════════════════════════
    // STORAGE ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[MB-040] Storage error for '{document}': {reason}")]
    Storage { document: String, reason: String },

    #[error("[MB-041] Front-matter of '{document}' is invalid: {reason}")]
    FrontMatter { document: String, reason: String },

    #[error("[MB-042] Document '{document}' not found")]
    DocumentNotFound { document: String },

    // ═══════════════════════════════════════════
    // CONFIG ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[MB-050] Configuration error: {reason}")]
    Config { reason: String },

    // ═══════════════════════════════════════════
    // WATCHER / IO ERRORS (060-069)
    // ═══════════════════════════════════════════
    #[error("[MB-060] File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("[MB-061] IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[MB-062] YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MetaBindError {
    /// Get the error code (e.g., "MB-010")
    pub fn code(&self) -> &'static str {
        match self {
            Self::PathSyntax { .. } => "MB-001",
            Self::BindTargetSyntax { .. } => "MB-010",
            Self::BindTargetResolution { .. } => "MB-011",
            Self::InternalConsistency { .. } => "MB-020",
            Self::Declaration { .. } => "MB-030",
            Self::InvalidArgument { .. } => "MB-031",
            Self::Storage { .. } => "MB-040",
            Self::FrontMatter { .. } => "MB-041",
            Self::DocumentNotFound { .. } => "MB-042",
            Self::Config { .. } => "MB-050",
            Self::Watch(_) => "MB-060",
            Self::Io(_) => "MB-061",
            Self::Yaml(_) => "MB-062",
        }
    }

    /// Authoring mistakes the user can fix in the document itself.
    ///
    /// These are rendered in place of the widget instead of aborting.
    pub fn is_authoring_error(&self) -> bool {
        matches!(
            self,
            Self::PathSyntax { .. }
                | Self::BindTargetSyntax { .. }
                | Self::BindTargetResolution { .. }
                | Self::Declaration { .. }
                | Self::InvalidArgument { .. }
        )
    }

    /// Check if the failed operation may succeed on a later attempt
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Io(_) | Self::Watch(_) | Self::DocumentNotFound { .. }
        )
    }

    /// Shorthand used wherever an invariant is violated
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::InternalConsistency {
            reason: reason.into(),
        }
    }
}

impl FixSuggestion for MetaBindError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            Self::PathSyntax { .. } => Some("Use paths like field, field.sub or list[0].name"),
            Self::BindTargetSyntax { .. } => {
                Some("Use 'field' for the current note or 'Note#field' for another note (one '#' only)")
            }
            Self::BindTargetResolution { .. } => {
                Some("Check the note name, or qualify it with its folder (e.g. folder/Note#field)")
            }
            Self::InternalConsistency { .. } => Some("This is a bug; reload the view and report it"),
            Self::Declaration { .. } => Some("Use INPUT[type:target] or INPUT[type(argument(value)):target]"),
            Self::InvalidArgument { .. } => Some("Check the argument name and value for this input type"),
            Self::Storage { .. } => Some("Check file permissions; the write is retried on the next sync"),
            Self::FrontMatter { .. } => Some("Front-matter must be a YAML mapping between '---' fences"),
            Self::DocumentNotFound { .. } => Some("Check the note exists inside the vault"),
            Self::Config { .. } => Some("Check ~/.config/metabind/config.toml syntax"),
            Self::Watch(_) => Some("Check the vault directory exists and is readable"),
            Self::Io(_) => Some("Check file path and permissions"),
            Self::Yaml(_) => Some("Check YAML syntax: indentation and quoting"),
        }
    }
}
