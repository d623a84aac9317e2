// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Error surface for the coordination layer.
//!
//! This layer never retries or swallows a failure; every error propagates to
//! the caller, and the only local recovery pattern is releasing a monitor
//! that was acquired earlier in the same call.

/// Errors raised by resources, views, state objects and the device.
#[derive(Debug, thiserror::Error)]
pub enum GraphicsError {
    /// An operation was issued against an object that was already disposed.
    #[error("{0} was already disposed")]
    Disposed(&'static str),

    /// A lock-requiring device operation was issued outside `Enter`/`Exit`.
    #[error("the device is not locked")]
    NotLocked,

    /// An operation that requires the device to be unlocked was issued
    /// while it is locked (e.g. disposing a device mid-frame).
    #[error("the device is locked")]
    Locked,

    /// `map` was called while a mapping transaction is already open.
    #[error("the resource is already mapped")]
    AlreadyMapped,

    /// An operation that requires an open mapping found none.
    #[error("the resource is not mapped")]
    NotMapped,

    /// A byte or element range falls outside the resource.
    #[error("range out of bounds: offset {offset} + count {count} exceeds size {size}")]
    OutOfRange { offset: u64, count: u64, size: u64 },

    /// A draw range falls outside what the bound geometry answers for.
    #[error("draw range out of bounds: offset {offset}, count {count}")]
    DrawOutOfRange { offset: u64, count: u64 },

    /// A state object must be interned before it can be bound or prepared.
    #[error("the state must be interned before it is set")]
    NotInterned,

    /// Interned state objects are immutable.
    #[error("cannot mutate an interned state")]
    Interned,

    /// Format, type or dimension mismatch, rejected before any mutation.
    #[error("incompatible: {0}")]
    Incompatible(String),

    /// The resource's locality forbids the requested residency change.
    #[error("locality violation: {0}")]
    Locality(&'static str),

    /// A feature the original design defers; not silently emulated.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl GraphicsError {
    pub(crate) fn incompatible(msg: impl Into<String>) -> Self {
        GraphicsError::Incompatible(msg.into())
    }
}
