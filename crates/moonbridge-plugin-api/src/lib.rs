//! # moonbridge-plugin-api
//!
//! Host plugin-contract layer of the moonbridge scripting bridge.
//!
//! This crate maps the host's script-language plugin contract onto the
//! dispatch core in `moonbridge-runtime`:
//!
//! - [`LanguageBridge`] implements the language lifecycle hooks
//! - [`ScriptManifest`] is the per-script descriptor produced by
//!   `script_init`, with every host-visible field pre-initialized
//! - Instance lifecycle, property accessors and method dispatch follow the
//!   host's out-parameter conventions (recognized flags, pre-set call
//!   errors, non-null instance identity)
//! - [`LanguageDescriptor`] carries the static language metadata the host
//!   needs at registration time
//! - Editor hooks (template generation, validation, function stubs) ride
//!   the same dispatch protocol and exist only in editor context
//!
//! Host data stays opaque throughout: variants, strings and object
//! references cross the boundary as typed [`ForeignHandle`]s that this
//! layer forwards but never decodes.

pub mod editor;
pub mod host;
pub mod instance;
pub mod language;
pub mod manifest;
pub mod script;

pub use editor::ValidationReport;
pub use host::{
    HostObject, HostString, HostStringArray, HostStringName, HostVariant, ObjectHandle,
    StringArrayHandle, StringHandle, StringNameHandle, VariantHandle,
};
pub use instance::{MethodCallError, MethodCallStatus};
pub use language::{LanguageBridge, LanguageDescriptor};
pub use manifest::{ScriptData, ScriptManifest};
pub use script::{ScriptLoadResult, ScriptStatus};

pub use moonbridge_runtime::{
    BootstrapChunk, BridgeError, BridgeOp, BridgeResult, CallOutcome, Diagnostic, DiagnosticSink,
    ForeignHandle, GuestFault, GuestRuntime, HostCapabilityTable, RuntimeConfig, Severity,
};
