//! Field Module - bound fields and their hosts (v0.1)
//!
//! - `BoundField`: signal pair + cache registration for one bind target
//! - `FieldRegistry`: every live field, for "show all fields bound to X"
//! - `FieldHost`: declaration + widget + bound field, as rendered in a note

mod bound;
mod host;
mod registry;

pub use bound::{BindingState, BoundField};
pub use host::{FieldContext, FieldHost, Placement};
pub use registry::FieldRegistry;
