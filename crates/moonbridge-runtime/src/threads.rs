//! Execution-context recycling for deferred guest callables.
//!
//! Hosts tend to fire the same kinds of deferred callbacks (signal
//! handlers, notifications) over and over. Allocating a fresh coroutine
//! each time grows the guest heap without bound, so suspended contexts are
//! reset and rebound to the next callable instead.

use mlua::{Function, Lua, Thread};

const DEFAULT_CAPACITY: usize = 8;

/// A pool of reusable coroutines with explicit acquire/release ownership.
pub struct ThreadPool {
    free: Vec<Thread>,
    capacity: usize,
}

impl ThreadPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            capacity,
        }
    }

    /// Take a context from the pool, rebound to `callback`, or create a
    /// fresh one when the pool is empty. Contexts that can no longer be
    /// reset (e.g. errored) are discarded.
    pub fn acquire(&mut self, lua: &Lua, callback: Function) -> mlua::Result<Thread> {
        while let Some(thread) = self.free.pop() {
            if thread.reset(callback.clone()).is_ok() {
                return Ok(thread);
            }
        }
        lua.create_thread(callback)
    }

    /// Hand a context back for reuse. Beyond capacity it is dropped.
    pub fn release(&mut self, thread: Thread) {
        if self.free.len() < self.capacity {
            self.free.push(thread);
        }
    }

    pub fn idle(&self) -> usize {
        self.free.len()
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// One-shot variant of the same discipline: rebind `existing` if it is
/// still resettable, otherwise create a fresh context.
pub fn recycle(lua: &Lua, callback: Function, existing: Option<Thread>) -> mlua::Result<Thread> {
    if let Some(thread) = existing {
        if thread.reset(callback.clone()).is_ok() {
            return Ok(thread);
        }
    }
    lua.create_thread(callback)
}
