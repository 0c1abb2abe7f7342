//! The guest runtime lifecycle manager and dispatch core.
//!
//! One [`GuestRuntime`] exists per process. Construction installs the
//! primitive bridge functions, runs the guest bootstrap (which populates
//! the callback registry) and seals the registry. Every host-initiated
//! operation then goes through [`GuestRuntime::protected_call`], which
//! resolves the callback, contains any fault, and reports it on the
//! diagnostic side channel.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mlua::{
    Function, FromLuaMulti, IntoLuaMulti, LightUserData, Lua, MultiValue, Thread, Value,
};
use tracing::{debug, info, warn};

use crate::config::{BootstrapChunk, RuntimeConfig};
use crate::diagnostics::{Diagnostic, DiagnosticSink, GuestFault, Severity, TracingSink};
use crate::error::{BridgeError, BridgeResult};
use crate::handle::{ForeignHandle, HostCapabilityTable};
use crate::registry::{BridgeOp, CallbackTable};
use crate::threads::{self, ThreadPool};

static RUNTIME_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Construction guard: at most one guest runtime per process.
struct ActiveGuard;

impl ActiveGuard {
    fn acquire() -> BridgeResult<Self> {
        if RUNTIME_ACTIVE.swap(true, Ordering::AcqRel) {
            Err(BridgeError::AlreadyActive)
        } else {
            Ok(ActiveGuard)
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        RUNTIME_ACTIVE.store(false, Ordering::Release);
    }
}

/// Result of one dispatch through the callback registry.
pub enum CallOutcome<R> {
    /// No callback registered, or the runtime is finalized/poisoned.
    /// The caller substitutes the operation's documented default; no
    /// diagnostic is emitted.
    Skipped,
    /// The guest callable ran to completion and returned these values.
    Completed(R),
    /// The protected call faulted. Exactly one diagnostic has already been
    /// reported; the caller substitutes the operation's default.
    Faulted,
}

impl<R> CallOutcome<R> {
    pub fn completed(self) -> Option<R> {
        match self {
            CallOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CallOutcome::Skipped)
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, CallOutcome::Faulted)
    }
}

/// The single, long-lived handle to the guest execution environment.
pub struct GuestRuntime {
    lua: Option<Lua>,
    callbacks: Rc<RefCell<CallbackTable>>,
    threads: Rc<RefCell<ThreadPool>>,
    sink: Arc<dyn DiagnosticSink>,
    editor_mode: bool,
    poisoned: Cell<bool>,
    _guard: ActiveGuard,
}

impl GuestRuntime {
    /// Create the guest execution context, install the primitive bridge
    /// functions and run the bootstrap chunk.
    ///
    /// A failing bootstrap is reported on the diagnostic channel and still
    /// yields a usable runtime (so teardown is always possible) with an
    /// empty or partial callback registry.
    pub fn initialize(config: RuntimeConfig) -> BridgeResult<GuestRuntime> {
        let guard = ActiveGuard::acquire()?;
        let sink = config
            .sink
            .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn DiagnosticSink>);

        let lua = Lua::new();
        let callbacks = Rc::new(RefCell::new(CallbackTable::new(config.editor_mode)));
        let threads = Rc::new(RefCell::new(ThreadPool::default()));
        install_primitives(&lua, &callbacks, &threads)?;

        if let Some(install) = config.host_bindings {
            install(&lua)?;
        }

        if let Some(chunk) = &config.bootstrap {
            if let Err(err) = run_bootstrap(
                &lua,
                chunk,
                &config.library_path,
                config.editor_mode,
                &config.capability_tables,
            ) {
                let fault = GuestFault::from_lua_error(&err);
                sink.report(&Diagnostic {
                    severity: Severity::Error,
                    op: None,
                    message: format!("bootstrap '{}' failed: {}", chunk.name, fault.message),
                    traceback: fault.traceback,
                });
            }
        }
        callbacks.borrow_mut().seal();

        info!(
            editor_mode = config.editor_mode,
            callbacks = callbacks.borrow().len(),
            "guest runtime initialized"
        );
        Ok(GuestRuntime {
            lua: Some(lua),
            callbacks,
            threads,
            sink,
            editor_mode: config.editor_mode,
            poisoned: Cell::new(false),
            _guard: guard,
        })
    }

    /// Release the guest execution context.
    ///
    /// Runs a full collection pass first so pending guest finalizers
    /// execute while the state is still alive. Idempotent: later calls and
    /// later dispatches are no-ops.
    pub fn finalize(&mut self) {
        let Some(lua) = self.lua.take() else {
            debug!("finalize on an already-finalized runtime");
            return;
        };
        if !self.poisoned.get() {
            if let Err(err) = lua.gc_collect() {
                let fault = GuestFault::from_lua_error(&err);
                self.sink.report(&Diagnostic {
                    severity: Severity::Fatal,
                    op: None,
                    message: format!("collection pass failed during finalize: {}", fault.message),
                    traceback: fault.traceback,
                });
            }
        }
        self.callbacks.borrow_mut().clear();
        drop(lua);
        info!("guest runtime finalized");
    }

    /// Access the guest state, if the runtime is still usable.
    pub fn lua(&self) -> Option<&Lua> {
        if self.poisoned.get() {
            None
        } else {
            self.lua.as_ref()
        }
    }

    pub fn editor_mode(&self) -> bool {
        self.editor_mode
    }

    pub fn is_finalized(&self) -> bool {
        self.lua.is_none()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.get()
    }

    pub fn has_callback(&self, op: BridgeOp) -> bool {
        self.callbacks.borrow().contains(op)
    }

    /// Borrow the execution-context pool.
    pub fn thread_pool(&self) -> &Rc<RefCell<ThreadPool>> {
        &self.threads
    }

    /// Dispatch `op` to its registered guest callable under full error
    /// containment.
    ///
    /// Registry misses degrade silently to [`CallOutcome::Skipped`]. A Lua
    /// fault emits one [`Severity::Error`] diagnostic. A panic crossing the
    /// boundary (the fatal case: the guest state may be inconsistent)
    /// emits one [`Severity::Fatal`] diagnostic and poisons the runtime.
    pub fn protected_call<A, R>(&self, op: BridgeOp, args: A) -> CallOutcome<R>
    where
        A: IntoLuaMulti,
        R: FromLuaMulti,
    {
        let Some(lua) = self.lua() else {
            debug!(op = op.name(), "dispatch on inert runtime, skipped");
            return CallOutcome::Skipped;
        };
        let callback = {
            let table = self.callbacks.borrow();
            let Some(key) = table.get(op) else {
                return CallOutcome::Skipped;
            };
            match lua.registry_value::<Function>(key) {
                Ok(callback) => callback,
                Err(err) => {
                    self.report_fault(op, GuestFault::from_lua_error(&err));
                    return CallOutcome::Faulted;
                }
            }
        };

        match catch_unwind(AssertUnwindSafe(|| callback.call::<R>(args))) {
            Ok(Ok(values)) => CallOutcome::Completed(values),
            Ok(Err(err)) => {
                self.report_fault(op, GuestFault::from_lua_error(&err));
                CallOutcome::Faulted
            }
            Err(payload) => {
                self.poisoned.set(true);
                self.sink.report(
                    &GuestFault::from_panic(payload.as_ref())
                        .into_diagnostic(Severity::Fatal, Some(op)),
                );
                warn!(op = op.name(), "guest runtime poisoned by fatal fault");
                CallOutcome::Faulted
            }
        }
    }

    /// Report a contained, non-fatal guest fault attributed to `op`.
    pub fn report_fault(&self, op: BridgeOp, fault: GuestFault) {
        self.sink
            .report(&fault.into_diagnostic(Severity::Error, Some(op)));
    }
}

fn run_bootstrap(
    lua: &Lua,
    chunk: &BootstrapChunk,
    library_path: &str,
    editor_mode: bool,
    capability_tables: &[ForeignHandle<HostCapabilityTable>],
) -> mlua::Result<()> {
    let mut args: Vec<Value> = Vec::with_capacity(2 + capability_tables.len());
    args.push(Value::String(lua.create_string(library_path)?));
    args.push(Value::Boolean(editor_mode));
    for table in capability_tables {
        args.push(Value::LightUserData(table.as_light()));
    }
    lua.load(chunk.source.as_str())
        .set_name(chunk.name.as_str())
        .call::<()>(MultiValue::from_iter(args))
}

/// Install the `hostbridge` primitive table: callback registration,
/// opaque-address boxing, execution-context recycling and string helpers.
fn install_primitives(
    lua: &Lua,
    callbacks: &Rc<RefCell<CallbackTable>>,
    threads: &Rc<RefCell<ThreadPool>>,
) -> mlua::Result<()> {
    let bridge = lua.create_table()?;

    let table = Rc::clone(callbacks);
    bridge.set(
        "register",
        lua.create_function(move |lua, (name, callback): (String, Function)| {
            table.borrow_mut().register(lua, &name, callback)
        })?,
    )?;

    // The one boxing primitive the guest needs: the address of any
    // reference value as light userdata, storable and comparable.
    bridge.set(
        "topointer",
        lua.create_function(|_, value: Value| {
            Ok(LightUserData(value.to_pointer() as *mut c_void))
        })?,
    )?;

    let pool = Rc::clone(threads);
    bridge.set(
        "acquire_thread",
        lua.create_function(move |lua, callback: Function| {
            pool.borrow_mut().acquire(lua, callback)
        })?,
    )?;

    let pool = Rc::clone(threads);
    bridge.set(
        "release_thread",
        lua.create_function(move |_, thread: Thread| {
            pool.borrow_mut().release(thread);
            Ok(())
        })?,
    )?;

    bridge.set(
        "recycle_thread",
        lua.create_function(|lua, (callback, existing): (Function, Option<Thread>)| {
            threads::recycle(lua, callback, existing)
        })?,
    )?;

    bridge.set(
        "replace",
        lua.create_function(|_, (s, from, to): (String, String, String)| {
            Ok(s.replace(&from, &to))
        })?,
    )?;

    lua.globals().set("hostbridge", bridge)
}
