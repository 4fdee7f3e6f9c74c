//! Callback interfaces: host-implemented objects invoked by the core.
//!
//! The host keeps the objects in a [`CallbackRegistry`] and registers one
//! `#[repr(C)]` vtable per interface with the core. Each vtable entry is a
//! static trampoline that resolves the handle and runs the method through the
//! usual call envelope, roles reversed. The core holds only handles, wrapped in
//! [`ForeignObject`] so the vtable's free slot runs exactly once.

mod foreign;
mod registry;

pub use foreign::{CallbackVTable, ForeignObject, VTableSlot};
pub use registry::CallbackRegistry;
