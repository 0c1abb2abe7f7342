//! Script-level lifecycle: `script_init` and `script_finish`.

use mlua::{Table, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

use moonbridge_runtime::{BridgeOp, CallOutcome, GuestFault};

use crate::host::StringHandle;
use crate::language::LanguageBridge;
use crate::manifest::{ScriptData, ScriptManifest};

/// Load status reported back to the host alongside the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStatus {
    Ok,
    Failed,
    ParseError,
    CompilationFailed,
}

impl ScriptStatus {
    /// Decode the status code the guest returns from `script_init`.
    /// Unknown codes count as a plain failure.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::Failed,
            2 => Self::ParseError,
            3 => Self::CompilationFailed,
            _ => Self::Failed,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

/// Everything `script_init` hands back to the host. Both fields are valid
/// regardless of status; on any failure the manifest is the empty default.
#[derive(Debug, Default)]
pub struct ScriptLoadResult {
    pub manifest: ScriptManifest,
    pub status: ScriptStatus,
}

impl Default for ScriptStatus {
    fn default() -> Self {
        Self::Ok
    }
}

impl LanguageBridge {
    /// `script_init`: hand the script path and source to the guest and copy
    /// the resulting manifest into host-owned storage.
    ///
    /// The result is always fully initialized. When the guest has no
    /// `script_init` registered, or the call faults, the host sees the
    /// empty manifest with an `Ok` status; domain failures are reported
    /// only through the status code the guest itself returns.
    pub fn script_init(&self, path: StringHandle, source: StringHandle) -> ScriptLoadResult {
        let mut result = ScriptLoadResult::default();
        let outcome = self
            .runtime()
            .protected_call::<_, (i64, Option<Table>)>(BridgeOp::ScriptInit, (path, source));
        let CallOutcome::Completed((code, table)) = outcome else {
            return result;
        };
        result.status = ScriptStatus::from_code(code);
        if let (Some(table), Some(lua)) = (table, self.runtime().lua()) {
            if let Err(err) = result.manifest.fill_from_guest(lua, &table) {
                self.runtime()
                    .report_fault(BridgeOp::ScriptInit, GuestFault::from_lua_error(&err));
                result.manifest = ScriptManifest::default();
            }
        }
        debug!(status = ?result.status, name = %result.manifest.name, "script loaded");
        result
    }

    /// `script_finish`: release the script's guest-side state.
    pub fn script_finish(&self, data: Option<ScriptData>) {
        let Some(lua) = self.runtime().lua() else {
            return;
        };
        let value = match &data {
            Some(data) => match data.value(lua) {
                Ok(value) => value,
                Err(err) => {
                    self.runtime()
                        .report_fault(BridgeOp::ScriptFinish, GuestFault::from_lua_error(&err));
                    Value::Nil
                }
            },
            None => Value::Nil,
        };
        let _ = self
            .runtime()
            .protected_call::<_, ()>(BridgeOp::ScriptFinish, value);
        if let Some(data) = data {
            data.release(lua);
        }
        lua.expire_registry_values();
    }
}
