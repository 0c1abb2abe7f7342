//! Instance lifecycle, property accessors and method dispatch.

use mlua::Value;
use serde::{Deserialize, Serialize};

use moonbridge_runtime::{BridgeOp, CallOutcome, GuestFault};

use crate::host::{ObjectHandle, StringNameHandle, VariantHandle};
use crate::language::LanguageBridge;
use crate::manifest::ScriptData;

/// Method-call outcome codes shared with the host's object system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodCallStatus {
    Ok,
    InvalidMethod,
    InvalidArgument,
    TooManyArguments,
    TooFewArguments,
    InstanceIsNull,
}

impl MethodCallStatus {
    /// Decode the status code the guest returns from `instance_call_method`.
    /// Unknown codes degrade to the method-not-found outcome.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::InvalidMethod,
            2 => Self::InvalidArgument,
            3 => Self::TooManyArguments,
            4 => Self::TooFewArguments,
            5 => Self::InstanceIsNull,
            _ => Self::InvalidMethod,
        }
    }
}

/// The host's method-call error out-structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodCallError {
    pub status: MethodCallStatus,
    /// Index of the offending argument, when the status names one.
    pub argument: i32,
    /// Expected argument count or type tag, when the status names one.
    pub expected: i32,
}

impl MethodCallError {
    /// The safe pre-set value: treated by the host as "no such method",
    /// which routes the call to the base type instead of failing.
    pub fn invalid_method() -> Self {
        Self {
            status: MethodCallStatus::InvalidMethod,
            argument: -1,
            expected: -1,
        }
    }
}

impl Default for MethodCallError {
    fn default() -> Self {
        Self::invalid_method()
    }
}

impl LanguageBridge {
    /// `instance_init`: attach a script to a host object.
    ///
    /// Returns the instance identity the host will pass back on every later
    /// per-instance call. The owner handle itself serves as that identity;
    /// the guest keeps its own state keyed by it. `None` tells the host the
    /// attach failed.
    pub fn instance_init(
        &self,
        script: Option<&ScriptData>,
        owner: ObjectHandle,
    ) -> Option<ObjectHandle> {
        let script_value = match (script, self.runtime().lua()) {
            (Some(data), Some(lua)) => match data.value(lua) {
                Ok(value) => value,
                Err(err) => {
                    self.runtime()
                        .report_fault(BridgeOp::InstanceInit, GuestFault::from_lua_error(&err));
                    return None;
                }
            },
            _ => Value::Nil,
        };
        match self
            .runtime()
            .protected_call::<_, Value>(BridgeOp::InstanceInit, (script_value, owner))
        {
            CallOutcome::Completed(value) if !value.is_nil() => Some(owner),
            _ => None,
        }
    }

    /// `instance_finish`: drop the guest-side state for an instance.
    pub fn instance_finish(&self, owner: ObjectHandle) {
        let _ = self
            .runtime()
            .protected_call::<_, ()>(BridgeOp::InstanceFinish, owner);
    }

    /// `instance_set_prop`: offer a property write to the guest. The return
    /// flag says whether the guest recognized the property; `false` routes
    /// the write to the host's own property table.
    pub fn instance_set_prop(
        &self,
        owner: ObjectHandle,
        name: StringNameHandle,
        value: VariantHandle,
    ) -> bool {
        self.runtime()
            .protected_call::<_, bool>(BridgeOp::InstanceSetProp, (owner, name, value))
            .completed()
            .unwrap_or(false)
    }

    /// `instance_get_prop`: ask the guest for a property value. The guest
    /// writes the value through the host-owned `ret` handle; the return
    /// flag mirrors [`Self::instance_set_prop`].
    pub fn instance_get_prop(
        &self,
        owner: ObjectHandle,
        name: StringNameHandle,
        ret: VariantHandle,
    ) -> bool {
        self.runtime()
            .protected_call::<_, bool>(BridgeOp::InstanceGetProp, (owner, name, ret))
            .completed()
            .unwrap_or(false)
    }

    /// `instance_call_method`: dispatch a method call into the guest.
    ///
    /// `error` is pre-set to the safe "no such method" value before any
    /// guest code runs, so the host always reads a valid out-structure.
    /// The guest writes the return value through the host-owned `ret`
    /// handle and reports its status as `(code, argument, expected)`.
    pub fn instance_call_method(
        &self,
        owner: ObjectHandle,
        method: StringNameHandle,
        args: &[VariantHandle],
        ret: VariantHandle,
        error: &mut MethodCallError,
    ) {
        *error = MethodCallError::invalid_method();
        let Some(lua) = self.runtime().lua() else {
            return;
        };
        let arg_table = match lua.create_sequence_from(args.iter().map(|h| h.as_light())) {
            Ok(table) => table,
            Err(err) => {
                self.runtime()
                    .report_fault(BridgeOp::InstanceCallMethod, GuestFault::from_lua_error(&err));
                return;
            }
        };
        let outcome = self.runtime().protected_call::<_, (i64, Option<i64>, Option<i64>)>(
            BridgeOp::InstanceCallMethod,
            (owner, method, arg_table, ret),
        );
        if let CallOutcome::Completed((code, argument, expected)) = outcome {
            error.status = MethodCallStatus::from_code(code);
            // out-of-range guest codes degrade to the sentinel, not wrap
            error.argument = argument.and_then(|v| i32::try_from(v).ok()).unwrap_or(-1);
            error.expected = expected.and_then(|v| i32::try_from(v).ok()).unwrap_or(-1);
        }
    }

    /// `instance_notification`: forward a host notification code.
    pub fn instance_notification(&self, owner: ObjectHandle, what: i32) {
        let _ = self
            .runtime()
            .protected_call::<_, ()>(BridgeOp::InstanceNotification, (owner, what));
    }
}
