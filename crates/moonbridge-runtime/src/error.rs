//! Error types for the moonbridge runtime layer.
//!
//! These cover embedder-facing failures only. Faults raised by guest code
//! during dispatch are contained at the boundary and routed through the
//! diagnostic side channel instead (see [`crate::diagnostics`]).

use thiserror::Error;

/// Errors surfaced to the embedder by runtime construction and setup.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A guest runtime already exists in this process. Exactly one may be
    /// live at a time; re-entrant creation is not supported.
    #[error("a guest runtime is already active in this process")]
    AlreadyActive,

    /// The underlying Lua state reported an error outside any protected
    /// dispatch (state creation, primitive installation, host bindings).
    #[error("guest runtime error: {0}")]
    Lua(#[from] mlua::Error),
}

/// Result type for runtime operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
