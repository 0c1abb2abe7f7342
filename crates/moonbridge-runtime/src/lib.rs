//! # moonbridge-runtime
//!
//! Guest-runtime layer of the moonbridge scripting bridge.
//!
//! This crate owns the single embedded Lua state and everything needed to
//! route host-initiated calls into guest code safely:
//!
//! - Runtime lifecycle: one process-wide [`GuestRuntime`], created once at
//!   plugin activation and finalized at most once at deactivation
//! - Callback registry: a fixed set of [`BridgeOp`] operations mapped to
//!   guest callables, populated by the bootstrap chunk and sealed afterwards
//! - Opaque-handle marshaling: [`ForeignHandle`] passes host-owned values
//!   across the boundary as raw addresses, never decoded here
//! - Error containment: every dispatch is a protected call; guest faults
//!   become diagnostics on a [`DiagnosticSink`], never an unwind into the
//!   host process
//! - Execution-context recycling: a [`ThreadPool`] of reusable coroutines
//!   for deferred guest callables
//!
//! ## Threading
//!
//! The bridge is single-threaded by contract. [`GuestRuntime`] is neither
//! `Send` nor `Sync`; the host serializes all entry points onto one thread.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod handle;
pub mod registry;
pub mod runtime;
pub mod threads;

pub use config::{BootstrapChunk, RuntimeConfig};
pub use diagnostics::{Diagnostic, DiagnosticSink, GuestFault, Severity, TracingSink};
pub use error::{BridgeError, BridgeResult};
pub use handle::{ForeignHandle, HostCapabilityTable};
pub use registry::BridgeOp;
pub use runtime::{CallOutcome, GuestRuntime};
pub use threads::ThreadPool;
