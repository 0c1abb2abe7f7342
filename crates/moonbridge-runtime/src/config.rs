//! Runtime construction configuration.
//!
//! The bootstrap argument list has changed shape across host revisions, so
//! it is modeled as configuration rather than a fixed signature: library
//! path and editor flag are always passed, followed by however many opaque
//! capability-table addresses the host supplies.

use std::sync::Arc;

use mlua::Lua;

use crate::diagnostics::DiagnosticSink;
use crate::handle::{ForeignHandle, HostCapabilityTable};

/// A guest program run once at runtime creation to populate the callback
/// registry.
#[derive(Debug, Clone)]
pub struct BootstrapChunk {
    pub name: String,
    pub source: String,
}

impl BootstrapChunk {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

type HostBindings = Box<dyn FnOnce(&Lua) -> mlua::Result<()>>;

/// Configuration consumed by [`crate::GuestRuntime::initialize`].
pub struct RuntimeConfig {
    pub(crate) library_path: String,
    pub(crate) editor_mode: bool,
    pub(crate) bootstrap: Option<BootstrapChunk>,
    pub(crate) capability_tables: Vec<ForeignHandle<HostCapabilityTable>>,
    pub(crate) host_bindings: Option<HostBindings>,
    pub(crate) sink: Option<Arc<dyn DiagnosticSink>>,
}

impl RuntimeConfig {
    /// `library_path` is the plugin's own file-system identity; the
    /// bootstrap uses it to locate sibling guest-side resources.
    pub fn new(library_path: impl Into<String>) -> Self {
        Self {
            library_path: library_path.into(),
            editor_mode: false,
            bootstrap: None,
            capability_tables: Vec::new(),
            host_bindings: None,
            sink: None,
        }
    }

    /// Whether the host is running in editor/tooling context. Gates the
    /// registration of editor-only callbacks.
    pub fn editor_mode(mut self, editor_mode: bool) -> Self {
        self.editor_mode = editor_mode;
        self
    }

    pub fn bootstrap(mut self, chunk: BootstrapChunk) -> Self {
        self.bootstrap = Some(chunk);
        self
    }

    /// Append an opaque host capability table to the bootstrap arguments.
    pub fn capability_table(mut self, table: ForeignHandle<HostCapabilityTable>) -> Self {
        self.capability_tables.push(table);
        self
    }

    /// Install host functions into the guest state before bootstrap runs.
    /// Stand-in for the host's dynamic-symbol-resolution facility.
    pub fn host_bindings(
        mut self,
        install: impl FnOnce(&Lua) -> mlua::Result<()> + 'static,
    ) -> Self {
        self.host_bindings = Some(Box::new(install));
        self
    }

    pub fn diagnostic_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}
