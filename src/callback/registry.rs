//! Host side of callback interfaces: the table behind the vtable trampolines.

use std::sync::Arc;

use crate::call::{CallStatus, LowerReturn, call_with_result};
use crate::codec::Lower;
use crate::handle::{Handle, HandleError, HandleMap};
use crate::logging::{debug, error};

#[cfg(feature = "async")]
use {
    crate::future::foreign::{self, ForeignFuture, ForeignFutureComplete},
    parking_lot::Mutex,
    std::collections::HashMap,
    std::future::Future,
};

/// Host objects implementing one callback interface, addressed by handle.
///
/// Each vtable trampoline resolves its handle here and runs the method through
/// [`CallbackRegistry::dispatch`]; the vtable's free slot calls
/// [`CallbackRegistry::free`].
pub struct CallbackRegistry<T: ?Sized> {
    objects: HandleMap<Arc<T>>,
    #[cfg(feature = "async")]
    jobs: Mutex<HashMap<u64, Vec<Handle>>>,
}

impl<T: ?Sized + Send + Sync> CallbackRegistry<T> {
    pub fn new(interface: &'static str) -> Self {
        Self {
            objects: HandleMap::new(interface),
            #[cfg(feature = "async")]
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Hand an implementation to the core; the returned handle is what the
    /// core stores.
    pub fn register(&self, object: Arc<T>) -> Result<Handle, HandleError> {
        self.objects.insert(object)
    }

    pub fn get(&self, handle: Handle) -> Result<Arc<T>, HandleError> {
        self.objects.get(handle)
    }

    /// Number of objects the core still references.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Run one method call for the core.
    ///
    /// Resolves `handle`, invokes `method`, writes the lowered return value to
    /// `out` and the outcome to `status`. An unknown handle is reported as
    /// `PANIC`: it means the core used a freed or foreign handle.
    pub fn dispatch<R, E, F>(
        &self,
        handle: u64,
        out: &mut R::ReturnType,
        status: &mut CallStatus,
        method: F,
    ) where
        R: LowerReturn,
        E: Lower,
        F: FnOnce(&T) -> Result<R, E>,
    {
        match self.objects.get(Handle::from_raw(handle)) {
            Ok(object) => *out = call_with_result(status, || method(&object)),
            Err(e) => {
                error!(error = %e, "callback dispatched to unknown handle");
                status.set_panic(&e.to_string());
            }
        }
    }

    /// The vtable's clone slot: a second handle to the same object, or the
    /// null handle if `handle` is unknown.
    pub fn clone_handle(&self, handle: u64) -> u64 {
        match self.objects.clone_handle(Handle::from_raw(handle)) {
            Ok(clone) => clone.as_raw(),
            Err(e) => {
                error!(error = %e, "clone of unknown callback handle");
                Handle::NULL.as_raw()
            }
        }
    }

    /// The vtable's free slot: the core dropped its last reference.
    ///
    /// Also cancels any async work started for the core on this object.
    pub fn free(&self, handle: u64) {
        let handle = Handle::from_raw(handle);
        match self.objects.remove(handle) {
            Ok(_) => debug!(interface = self.objects.name(), handle = handle.as_raw(), "callback object freed"),
            Err(e) => error!(error = %e, "free of unknown callback handle"),
        }
        #[cfg(feature = "async")]
        if let Some(jobs) = self.jobs.lock().remove(&handle.as_raw()) {
            jobs.into_iter().for_each(foreign::cancel_job);
        }
    }
}

#[cfg(feature = "async")]
impl<T: ?Sized + Send + Sync + 'static> CallbackRegistry<T> {
    /// Run an async method for the core on `runtime`.
    ///
    /// The work is tied to `handle`: freeing the object cancels it. If the
    /// handle is unknown, the core is completed immediately with `PANIC`.
    pub fn dispatch_async<R, E, F, Fut>(
        &self,
        runtime: &tokio::runtime::Handle,
        handle: u64,
        complete: ForeignFutureComplete<R::ReturnType>,
        callback_data: u64,
        method: F,
    ) -> ForeignFuture
    where
        R: LowerReturn + Send + 'static,
        R::ReturnType: Send + 'static,
        E: Lower + Send + 'static,
        F: FnOnce(Arc<T>) -> Fut,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let object_handle = Handle::from_raw(handle);
        let started = self
            .objects
            .get(object_handle)
            .map_err(crate::Error::from)
            .and_then(|object| {
                Ok(foreign::spawn_foreign(
                    runtime,
                    method(object),
                    complete,
                    callback_data,
                )?)
            });

        match started {
            Ok(future) => {
                let job = Handle::from_raw(future.handle);
                let mut jobs = self.jobs.lock();
                // `free` removes the object before it takes the jobs lock, so
                // an object freed while the job was starting is seen here.
                if !self.objects.contains(object_handle) {
                    drop(jobs);
                    debug!(handle, "callback object freed while its job started");
                    foreign::cancel_job(job);
                    return future;
                }
                let pending = jobs.entry(handle).or_default();
                pending.retain(|job| foreign::is_pending(*job));
                pending.push(job);
                future
            }
            Err(e) => {
                error!(error = %e, "async callback could not start");
                let mut call_status = CallStatus::new();
                call_status.set_panic(&e.to_string());
                complete(
                    callback_data,
                    foreign::ForeignFutureResult {
                        return_value: R::ffi_default(),
                        call_status,
                    },
                );
                ForeignFuture {
                    handle: Handle::NULL.as_raw(),
                    free: ignore_free,
                }
            }
        }
    }
}

#[cfg(feature = "async")]
extern "C" fn ignore_free(_handle: u64) {}

impl<T: ?Sized> std::fmt::Debug for CallbackRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("objects", &self.objects)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{CallStatusCode, Caller, CallError};

    trait Greeter: Send + Sync {
        fn greet(&self, name: &str) -> Result<String, String>;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self, name: &str) -> Result<String, String> {
            if name.is_empty() {
                Err("no name".into())
            } else {
                Ok(format!("hello {name}"))
            }
        }
    }

    #[test]
    fn test_dispatch_success_and_declared_error() {
        let registry: CallbackRegistry<dyn Greeter> = CallbackRegistry::new("Greeter");
        let handle = registry.register(Arc::new(English)).unwrap().as_raw();
        let caller = Caller::in_process();

        let mut out = Default::default();
        let result = caller.call::<_, String>(|status| {
            registry.dispatch(handle, &mut out, status, |g| g.greet("ana"))
        });
        assert!(result.is_ok());
        assert_eq!(caller.lift::<String>(out).unwrap(), "hello ana");

        let mut out = Default::default();
        let result = caller.call::<_, String>(|status| {
            registry.dispatch(handle, &mut out, status, |g| g.greet(""))
        });
        assert!(matches!(result, Err(CallError::Declared(ref m)) if m == "no name"));
    }

    #[test]
    fn test_dispatch_after_free_is_panic() {
        let registry: CallbackRegistry<dyn Greeter> = CallbackRegistry::new("Greeter");
        let handle = registry.register(Arc::new(English)).unwrap().as_raw();
        registry.free(handle);
        assert!(registry.is_empty());

        let mut out = crate::buffer::CoreBuffer::new();
        let mut status = CallStatus::new();
        registry.dispatch(handle, &mut out, &mut status, |g| g.greet("x"));
        assert_eq!(status.status_code(), Ok(CallStatusCode::Panic));
        status.take_error_buf().free().unwrap();
    }

    #[test]
    fn test_clone_handle_keeps_object_alive() {
        let registry: CallbackRegistry<dyn Greeter> = CallbackRegistry::new("Greeter");
        let first = registry.register(Arc::new(English)).unwrap().as_raw();
        let second = registry.clone_handle(first);
        assert_ne!(second, 0);
        registry.free(first);
        assert!(registry.get(Handle::from_raw(second)).is_ok());
        assert_eq!(registry.clone_handle(first), 0);
    }

    #[cfg(feature = "async")]
    extern "C" fn discard(
        _data: u64,
        mut result: foreign::ForeignFutureResult<crate::buffer::CoreBuffer>,
    ) {
        let _ = result.return_value.free();
        let _ = result.call_status.take_error_buf().free();
    }

    #[cfg(feature = "async")]
    #[test]
    fn test_free_while_job_starts_cancels_it() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let registry: CallbackRegistry<dyn Greeter> = CallbackRegistry::new("Greeter");
        let handle = registry.register(Arc::new(English)).unwrap().as_raw();

        let future = registry.dispatch_async(runtime.handle(), handle, discard, 1, |greeter| {
            // The core frees the object between lookup and bookkeeping.
            registry.free(handle);
            async move {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                greeter.greet("late")
            }
        });

        assert!(!foreign::is_pending(Handle::from_raw(future.handle)));
        assert!(!registry.jobs.lock().contains_key(&handle));
        (future.free)(future.handle);
    }
}
