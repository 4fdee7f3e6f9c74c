//! Host-side proxies for objects that live in the core.
//!
//! A [`NativeObject`] owns one core handle. Calls borrow the handle; the core's
//! free entry point runs exactly once, after the proxy is destroyed (or
//! dropped) and the last call in flight has returned.

use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::error::CallError;
use super::host::Caller;
use super::status::CallStatus;
use crate::codec::Lift;
use crate::error::Error;
use crate::handle::Handle;
use crate::logging::{trace, warn};

/// The core's lifecycle entry points for one object type.
#[derive(Debug, Clone, Copy)]
pub struct ObjectSymbols {
    /// Issue a second handle to the same object.
    pub clone: extern "C" fn(handle: u64, status: &mut CallStatus) -> u64,
    /// Release one handle.
    pub free: extern "C" fn(handle: u64, status: &mut CallStatus),
}

/// The host's reference to one core object.
pub struct NativeObject {
    interface: &'static str,
    handle: Handle,
    symbols: ObjectSymbols,
    caller: Caller,
    destroyed: AtomicBool,
    /// One for the proxy itself, plus one per call in flight.
    refs: AtomicU64,
}

impl NativeObject {
    /// Take ownership of a handle returned by the core.
    pub fn new(
        interface: &'static str,
        caller: Caller,
        symbols: ObjectSymbols,
        handle: u64,
    ) -> Result<Self, Error> {
        let handle = Handle::from_raw(handle);
        if !handle.is_valid() {
            return Err(Error::Protocol(format!("invalid {interface} handle {handle}")));
        }
        trace!(interface, handle = handle.as_raw(), "core object adopted");
        Ok(Self {
            interface,
            handle,
            symbols,
            caller,
            destroyed: AtomicBool::new(false),
            refs: AtomicU64::new(1),
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Invoke a method with the object's handle.
    ///
    /// The handle stays valid for the duration of `f` even if another thread
    /// destroys the proxy meanwhile.
    pub fn call<R, E: Lift>(
        &self,
        f: impl FnOnce(u64, &mut CallStatus) -> R,
    ) -> Result<R, CallError<E>> {
        self.acquire()?;
        let result = self.caller.call(|status| f(self.handle.as_raw(), status));
        self.release();
        result
    }

    /// A second proxy holding its own handle to the same object.
    pub fn try_clone(&self) -> Result<Self, CallError<Infallible>> {
        let clone = self.symbols.clone;
        let handle = self.call::<_, Infallible>(|handle, status| clone(handle, status))?;
        Ok(Self::new(self.interface, self.caller, self.symbols, handle)?)
    }

    /// Give up this proxy's handle. Later calls fail; repeated destroys are no-ops.
    pub fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.release();
        }
    }

    fn acquire(&self) -> Result<(), Error> {
        let mut refs = self.refs.load(Ordering::Acquire);
        loop {
            if refs == 0 || self.is_destroyed() {
                return Err(Error::ObjectDestroyed(self.interface));
            }
            match self
                .refs
                .compare_exchange_weak(refs, refs + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(()),
                Err(current) => refs = current,
            }
        }
    }

    fn release(&self) {
        if self.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.free_handle();
        }
    }

    fn free_handle(&self) {
        let free = self.symbols.free;
        let handle = self.handle.as_raw();
        match self.caller.call::<(), Infallible>(|status| free(handle, status)) {
            Ok(()) => trace!(interface = self.interface, handle, "core object freed"),
            Err(e) => warn!(interface = self.interface, handle, error = %e, "core object free failed"),
        }
    }
}

impl Drop for NativeObject {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeObject")
            .field("interface", &self.interface)
            .field("handle", &self.handle)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    static FREED: Mutex<Vec<u64>> = Mutex::new(Vec::new());
    static CLONES: AtomicU64 = AtomicU64::new(100);

    extern "C" fn clone(_handle: u64, _status: &mut CallStatus) -> u64 {
        CLONES.fetch_add(1, Ordering::SeqCst)
    }

    extern "C" fn free(handle: u64, _status: &mut CallStatus) {
        FREED.lock().push(handle);
    }

    fn times_freed(handle: u64) -> usize {
        FREED.lock().iter().filter(|freed| **freed == handle).count()
    }

    const SYMBOLS: ObjectSymbols = ObjectSymbols { clone, free };

    #[test]
    fn test_destroy_frees_once() {
        let object = NativeObject::new("Widget", Caller::in_process(), SYMBOLS, 7).unwrap();
        assert_eq!(object.call::<_, Infallible>(|handle, _| handle).unwrap(), 7);

        object.destroy();
        object.destroy();
        assert!(object.is_destroyed());
        drop(object);
        assert_eq!(times_freed(7), 1);
    }

    #[test]
    fn test_call_after_destroy_fails() {
        let object = NativeObject::new("Widget", Caller::in_process(), SYMBOLS, 8).unwrap();
        object.destroy();
        let result = object.call::<_, Infallible>(|handle, _| handle);
        assert!(matches!(
            result,
            Err(CallError::Internal(Error::ObjectDestroyed("Widget")))
        ));
    }

    #[test]
    fn test_null_handle_rejected() {
        assert!(NativeObject::new("Widget", Caller::in_process(), SYMBOLS, 0).is_err());
    }

    #[test]
    fn test_clone_holds_its_own_handle() {
        let object = NativeObject::new("Widget", Caller::in_process(), SYMBOLS, 9).unwrap();
        let copy = object.try_clone().unwrap();
        assert_ne!(copy.handle(), object.handle());
        drop(object);
        assert_eq!(times_freed(9), 1);
        assert_eq!(times_freed(copy.handle().as_raw()), 0);
        assert!(!copy.is_destroyed());
    }
}
