//! Editor-only hooks: templates, validation and function stubs.
//!
//! These operations only exist when the runtime was brought up in editor
//! context; outside it the callbacks were never registered and every hook
//! degrades to its safe default.

use mlua::Table;
use serde::{Deserialize, Serialize};

use moonbridge_runtime::{BridgeOp, CallOutcome, GuestFault};

use crate::host::{StringArrayHandle, StringHandle};
use crate::language::LanguageBridge;

/// The host's script-validation out-structure. Pre-initialized to the
/// "nothing wrong" state before the guest runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Line of the first error, or 0 when none.
    pub line_error: i32,
    /// Column of the first error, or 0 when none.
    pub col_error: i32,
    /// Human-readable error description.
    pub message: String,
    /// Function names found in the script, for editor outlines.
    pub functions: Vec<String>,
}

impl ValidationReport {
    fn fill_from_guest(&mut self, table: &Table) -> mlua::Result<()> {
        if let Some(line) = table.get::<Option<i32>>("line_error")? {
            self.line_error = line;
        }
        if let Some(col) = table.get::<Option<i32>>("col_error")? {
            self.col_error = col;
        }
        if let Some(message) = table.get::<Option<String>>("message")? {
            self.message = message;
        }
        if let Some(functions) = table.get::<Option<Table>>("functions")? {
            for name in functions.sequence_values::<String>() {
                self.functions.push(name?);
            }
        }
        Ok(())
    }
}

impl LanguageBridge {
    /// `get_template_source_code`: produce starter source for a new script.
    /// Leaves `out` untouched when the guest provides nothing.
    pub fn get_template_source_code(
        &self,
        class_name: StringHandle,
        base_class_name: StringHandle,
        out: &mut String,
    ) {
        let outcome = self.runtime().protected_call::<_, Option<String>>(
            BridgeOp::GetTemplateSourceCode,
            (class_name, base_class_name),
        );
        if let CallOutcome::Completed(Some(source)) = outcome {
            *out = source;
        }
    }

    /// `validate`: check script source without loading it. Returns whether
    /// the source is valid; the report carries the first error position and
    /// the function outline. Scripts pass by default when no validator is
    /// registered or the validator itself faults.
    pub fn validate(
        &self,
        script: StringHandle,
        path: StringHandle,
        report: &mut ValidationReport,
    ) -> bool {
        *report = ValidationReport::default();
        let outcome = self
            .runtime()
            .protected_call::<_, (bool, Option<Table>)>(BridgeOp::Validate, (script, path));
        let CallOutcome::Completed((valid, table)) = outcome else {
            return true;
        };
        if let Some(table) = table {
            if let Err(err) = report.fill_from_guest(&table) {
                self.runtime()
                    .report_fault(BridgeOp::Validate, GuestFault::from_lua_error(&err));
                *report = ValidationReport::default();
            }
        }
        valid
    }

    /// `make_function`: produce a function stub to append to a script.
    /// Leaves `out` untouched when the guest provides nothing.
    pub fn make_function(
        &self,
        class_name: StringHandle,
        name: StringHandle,
        args: StringArrayHandle,
        out: &mut String,
    ) {
        let outcome = self.runtime().protected_call::<_, Option<String>>(
            BridgeOp::MakeFunction,
            (class_name, name, args),
        );
        if let CallOutcome::Completed(Some(stub)) = outcome {
            *out = stub;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Lua;

    #[test]
    fn report_fill_copies_fields() {
        let lua = Lua::new();
        let table: Table = lua
            .load(
                r#"{
                    line_error = 7,
                    col_error = 12,
                    message = "unexpected symbol",
                    functions = { "ready", "process" },
                }"#,
            )
            .eval()
            .unwrap();
        let mut report = ValidationReport::default();
        report.fill_from_guest(&table).unwrap();
        assert_eq!(report.line_error, 7);
        assert_eq!(report.col_error, 12);
        assert_eq!(report.message, "unexpected symbol");
        assert_eq!(report.functions, vec!["ready", "process"]);
    }

    #[test]
    fn default_report_is_clean() {
        let report = ValidationReport::default();
        assert_eq!(report.line_error, 0);
        assert_eq!(report.col_error, 0);
        assert!(report.message.is_empty());
        assert!(report.functions.is_empty());
    }
}
