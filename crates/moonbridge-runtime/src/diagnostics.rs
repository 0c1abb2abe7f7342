//! The diagnostic side channel.
//!
//! Contained guest faults are never surfaced to the host as errors; they are
//! formatted here and handed to a [`DiagnosticSink`]. The default sink logs
//! through `tracing`. Embedders (and tests) can supply their own sink via
//! [`crate::RuntimeConfig::diagnostic_sink`].

use std::any::Any;

use tracing::error;

use crate::registry::BridgeOp;

/// How disruptive a contained fault was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A fault inside a protected call; the runtime remains usable.
    Error,
    /// A fault outside normal call protection (a panic crossing the
    /// boundary, a failed collection pass). The runtime is poisoned and
    /// every later dispatch degrades to its safe default.
    Fatal,
}

/// One report on the diagnostic side channel.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// The operation being dispatched, if the fault happened inside one.
    pub op: Option<BridgeOp>,
    pub message: String,
    pub traceback: Option<String>,
}

/// Receiver for diagnostic reports.
pub trait DiagnosticSink {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Default sink: structured `tracing` events.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        let op = diagnostic.op.map(BridgeOp::name).unwrap_or("runtime");
        let traceback = diagnostic.traceback.as_deref().unwrap_or("");
        match diagnostic.severity {
            Severity::Error => error!(op, traceback, "{}", diagnostic.message),
            Severity::Fatal => error!(op, traceback, fatal = true, "{}", diagnostic.message),
        }
    }
}

/// A structured fault description captured from the guest runtime.
#[derive(Debug, Clone)]
pub struct GuestFault {
    pub message: String,
    pub traceback: Option<String>,
}

impl GuestFault {
    /// Decompose an mlua error into message and traceback.
    pub fn from_lua_error(err: &mlua::Error) -> Self {
        match err {
            mlua::Error::CallbackError { traceback, cause } => Self {
                message: cause.to_string(),
                traceback: Some(traceback.clone()),
            },
            // Lua-level errors carry the traceback appended to the message.
            mlua::Error::RuntimeError(msg) => match msg.split_once("\nstack traceback:") {
                Some((head, tail)) => Self {
                    message: head.trim_end().to_string(),
                    traceback: Some(format!("stack traceback:{tail}")),
                },
                None => Self {
                    message: msg.clone(),
                    traceback: None,
                },
            },
            other => Self {
                message: other.to_string(),
                traceback: None,
            },
        }
    }

    /// Describe a panic payload caught at the boundary.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic in guest callback".to_string()
        };
        Self {
            message,
            traceback: None,
        }
    }

    pub fn into_diagnostic(self, severity: Severity, op: Option<BridgeOp>) -> Diagnostic {
        Diagnostic {
            severity,
            op,
            message: self.message,
            traceback: self.traceback,
        }
    }
}
