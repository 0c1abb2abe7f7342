//! Marker types for the host's opaque value types.
//!
//! The bridge never interprets these; each marker only fixes which host
//! type a [`ForeignHandle`] refers to, so an object reference cannot be
//! passed where a variant is expected.

use moonbridge_runtime::ForeignHandle;

/// The host's string type.
pub enum HostString {}

/// The host's interned name type (method and property names).
pub enum HostStringName {}

/// The host's tagged variant type.
pub enum HostVariant {}

/// A reference to a host object.
pub enum HostObject {}

/// The host's string-array type (e.g. function argument lists).
pub enum HostStringArray {}

pub type StringHandle = ForeignHandle<HostString>;
pub type StringNameHandle = ForeignHandle<HostStringName>;
pub type VariantHandle = ForeignHandle<HostVariant>;
pub type ObjectHandle = ForeignHandle<HostObject>;
pub type StringArrayHandle = ForeignHandle<HostStringArray>;
