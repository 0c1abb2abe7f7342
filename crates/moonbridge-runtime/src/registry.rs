//! The callback registry.
//!
//! A fixed set of bridge operations maps to guest callables. The guest
//! bootstrap registers whichever subset it implements through the
//! `hostbridge.register` primitive while the bootstrap chunk runs; the
//! table is sealed afterwards and the host only ever triggers lookups.
//! Missing entries are legal and degrade every dispatch to its documented
//! safe default.

use std::collections::HashMap;
use std::fmt;

use mlua::{Function, Lua, RegistryKey};
use tracing::{debug, warn};

/// The fixed, enumerated set of operations a guest bootstrap may register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeOp {
    AddGlobalConstant,
    ScriptInit,
    ScriptFinish,
    InstanceInit,
    InstanceFinish,
    InstanceSetProp,
    InstanceGetProp,
    InstanceCallMethod,
    InstanceNotification,
    GetTemplateSourceCode,
    Validate,
    MakeFunction,
}

impl BridgeOp {
    pub const ALL: [BridgeOp; 12] = [
        BridgeOp::AddGlobalConstant,
        BridgeOp::ScriptInit,
        BridgeOp::ScriptFinish,
        BridgeOp::InstanceInit,
        BridgeOp::InstanceFinish,
        BridgeOp::InstanceSetProp,
        BridgeOp::InstanceGetProp,
        BridgeOp::InstanceCallMethod,
        BridgeOp::InstanceNotification,
        BridgeOp::GetTemplateSourceCode,
        BridgeOp::Validate,
        BridgeOp::MakeFunction,
    ];

    /// The wire name used by the guest bootstrap.
    pub fn name(self) -> &'static str {
        match self {
            BridgeOp::AddGlobalConstant => "language_add_global_constant",
            BridgeOp::ScriptInit => "script_init",
            BridgeOp::ScriptFinish => "script_finish",
            BridgeOp::InstanceInit => "instance_init",
            BridgeOp::InstanceFinish => "instance_finish",
            BridgeOp::InstanceSetProp => "instance_set_prop",
            BridgeOp::InstanceGetProp => "instance_get_prop",
            BridgeOp::InstanceCallMethod => "instance_call_method",
            BridgeOp::InstanceNotification => "instance_notification",
            BridgeOp::GetTemplateSourceCode => "get_template_source_code",
            BridgeOp::Validate => "validate",
            BridgeOp::MakeFunction => "make_function",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// Editor-only operations are registered only when the host reports it
    /// is running in editor/tooling context.
    pub fn editor_only(self) -> bool {
        matches!(
            self,
            BridgeOp::GetTemplateSourceCode | BridgeOp::Validate | BridgeOp::MakeFunction
        )
    }
}

impl fmt::Display for BridgeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Write-once mapping from operation to guest callable.
pub(crate) struct CallbackTable {
    entries: HashMap<BridgeOp, RegistryKey>,
    sealed: bool,
    editor_mode: bool,
}

impl CallbackTable {
    pub(crate) fn new(editor_mode: bool) -> Self {
        Self {
            entries: HashMap::new(),
            sealed: false,
            editor_mode,
        }
    }

    /// Register a guest callable under `name`.
    ///
    /// Unknown names raise a Lua error so a typo aborts bootstrap visibly.
    /// Duplicate, post-seal and out-of-context editor registrations are
    /// ignored with a log line; the registry stays write-once.
    pub(crate) fn register(
        &mut self,
        lua: &Lua,
        name: &str,
        callback: Function,
    ) -> mlua::Result<()> {
        let Some(op) = BridgeOp::from_name(name) else {
            return Err(mlua::Error::RuntimeError(format!(
                "unknown bridge operation '{name}'"
            )));
        };
        if self.sealed {
            warn!(op = op.name(), "callback registered after bootstrap, ignored");
            return Ok(());
        }
        if op.editor_only() && !self.editor_mode {
            debug!(op = op.name(), "editor-only callback outside editor, ignored");
            return Ok(());
        }
        if self.entries.contains_key(&op) {
            warn!(op = op.name(), "duplicate callback registration, keeping first");
            return Ok(());
        }
        let key = lua.create_registry_value(callback)?;
        debug!(op = op.name(), "registered guest callback");
        self.entries.insert(op, key);
        Ok(())
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    pub(crate) fn get(&self, op: BridgeOp) -> Option<&RegistryKey> {
        self.entries.get(&op)
    }

    pub(crate) fn contains(&self, op: BridgeOp) -> bool {
        self.entries.contains_key(&op)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
