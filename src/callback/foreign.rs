//! Core side of callback interfaces: vtables and handles to host objects.

use std::fmt;

use once_cell::sync::OnceCell;

use crate::call::{CallError, CallStatus, Caller};
use crate::codec::Lift;
use crate::error::Error;
use crate::handle::Handle;
use crate::logging::{trace, warn};

/// A `#[repr(C)]` table of host function pointers for one interface.
///
/// Every vtable has a free slot the core calls when it drops a handle.
pub trait CallbackVTable: Send + Sync + 'static {
    fn free_slot(&self) -> extern "C" fn(handle: u64);
}

/// Where the host registers an interface's vtable, once.
pub struct VTableSlot<V: 'static> {
    interface: &'static str,
    vtable: OnceCell<&'static V>,
}

impl<V: CallbackVTable> VTableSlot<V> {
    pub const fn new(interface: &'static str) -> Self {
        Self {
            interface,
            vtable: OnceCell::new(),
        }
    }

    /// Register the vtable. Later registrations are ignored.
    pub fn register(&self, vtable: &'static V) {
        if self.vtable.set(vtable).is_err() {
            warn!(interface = self.interface, "vtable already registered; ignoring");
        }
    }

    pub fn get(&self) -> Result<&'static V, Error> {
        self.vtable
            .get()
            .copied()
            .ok_or(Error::VTableMissing(self.interface))
    }

    pub fn is_registered(&self) -> bool {
        self.vtable.get().is_some()
    }
}

impl<V> fmt::Debug for VTableSlot<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VTableSlot")
            .field("interface", &self.interface)
            .field("registered", &self.vtable.get().is_some())
            .finish()
    }
}

/// The core's reference to one host object.
///
/// Dropping it calls the vtable's free slot exactly once.
pub struct ForeignObject<V: CallbackVTable> {
    handle: Handle,
    vtable: &'static V,
}

impl<V: CallbackVTable> ForeignObject<V> {
    /// Take ownership of a handle the host passed in.
    pub fn new(slot: &VTableSlot<V>, handle: u64) -> Result<Self, Error> {
        let handle = Handle::from_raw(handle);
        if !handle.is_valid() {
            return Err(Error::Protocol(format!("invalid callback handle {handle}")));
        }
        Ok(Self {
            handle,
            vtable: slot.get()?,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Call a vtable method returning `R` and check its status.
    ///
    /// `method` receives the vtable, the object handle, the out-parameter for
    /// the return value, and the status.
    pub fn invoke<R, E>(
        &self,
        caller: &Caller,
        method: impl FnOnce(&V, u64, &mut R, &mut CallStatus),
    ) -> Result<R, CallError<E>>
    where
        R: Default,
        E: Lift,
    {
        let mut out = R::default();
        caller.call(|status| method(self.vtable, self.handle.as_raw(), &mut out, status))?;
        Ok(out)
    }
}

impl<V: CallbackVTable> Drop for ForeignObject<V> {
    fn drop(&mut self) {
        trace!(handle = self.handle.as_raw(), "releasing callback object");
        (self.vtable.free_slot())(self.handle.as_raw());
    }
}

impl<V: CallbackVTable> fmt::Debug for ForeignObject<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignObject")
            .field("handle", &self.handle)
            .finish()
    }
}
