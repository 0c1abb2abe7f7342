//! Opaque-handle marshaling.
//!
//! Host-owned values (variants, strings, object references, arrays) cross
//! the boundary as raw addresses wrapped in a typed, non-owning
//! [`ForeignHandle`]. The bridge never decodes what a handle points at; the
//! operation being performed fixes the type contract, and the address is
//! only valid for the dynamic extent of the call that received it.

use std::ffi::c_void;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use mlua::{FromLua, IntoLua, LightUserData, Lua, Value};

/// Marker for an opaque host capability table handed to the guest bootstrap.
pub enum HostCapabilityTable {}

/// A non-owning reference to a host-resident value of (host) type `T`.
///
/// `T` is a zero-sized marker naming the host type the address refers to;
/// it is never materialized. Handles convert to and from Lua light userdata
/// and must not be stored by the guest beyond the call in which they were
/// received, unless the host API for that operation says otherwise.
pub struct ForeignHandle<T> {
    addr: *mut c_void,
    _host_type: PhantomData<*const T>,
}

impl<T> ForeignHandle<T> {
    /// Wrap a raw host address.
    pub fn from_addr(addr: *mut c_void) -> Self {
        Self {
            addr,
            _host_type: PhantomData,
        }
    }

    /// The null handle. Some operations use it as an explicit "no value"
    /// marker (e.g. absent script-level state).
    pub fn null() -> Self {
        Self::from_addr(std::ptr::null_mut())
    }

    pub fn is_null(&self) -> bool {
        self.addr.is_null()
    }

    pub fn as_addr(&self) -> *mut c_void {
        self.addr
    }

    pub fn as_light(&self) -> LightUserData {
        LightUserData(self.addr)
    }

    pub fn from_light(light: LightUserData) -> Self {
        Self::from_addr(light.0)
    }
}

impl<T> Clone for ForeignHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ForeignHandle<T> {}

impl<T> PartialEq for ForeignHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T> Eq for ForeignHandle<T> {}

impl<T> Hash for ForeignHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl<T> fmt::Debug for ForeignHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForeignHandle({:p})", self.addr)
    }
}

impl<T> IntoLua for ForeignHandle<T> {
    fn into_lua(self, _lua: &Lua) -> mlua::Result<Value> {
        Ok(Value::LightUserData(self.as_light()))
    }
}

impl<T> FromLua for ForeignHandle<T> {
    fn from_lua(value: Value, _lua: &Lua) -> mlua::Result<Self> {
        match value {
            Value::LightUserData(light) => Ok(Self::from_light(light)),
            Value::Nil => Ok(Self::null()),
            other => Err(mlua::Error::RuntimeError(format!(
                "expected an opaque handle, got {}",
                other.type_name()
            ))),
        }
    }
}
