//! Foreign futures: host async work awaited by the core.
//!
//! When the core calls an async method of a callback interface, the host
//! starts the work and returns a [`ForeignFuture`] `{handle, free}`. On
//! completion the host invokes the core-supplied completion callback with a
//! [`ForeignFutureResult`]. If the core loses interest first it calls `free`,
//! which aborts the work; `free` is idempotent. Completion and `free` race on
//! removing the job from its table, so the core sees either the result or
//! nothing, never both.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::buffer::CoreBuffer;
use crate::call::{CallError, CallStatus, Caller, LowerReturn, call_with_result, panic_message};
use crate::codec::{Lift, Lower};
use crate::error::Error;
use crate::handle::{Handle, HandleError, HandleMap};
use crate::logging::{debug, error, warn};

/// A host job the core is waiting on.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ForeignFuture {
    pub handle: u64,
    pub free: extern "C" fn(handle: u64),
}

/// What the host passes to the completion callback.
#[repr(C)]
#[derive(Debug)]
pub struct ForeignFutureResult<R> {
    pub return_value: R,
    pub call_status: CallStatus,
}

/// `complete(callback_data, result)`, supplied by the core.
pub type ForeignFutureComplete<R> = extern "C" fn(callback_data: u64, result: ForeignFutureResult<R>);

/// A value a foreign future can complete with.
pub trait ForeignReturn: Sized + Send + 'static {
    /// Dispose of a value nobody will read.
    fn release(self) {}
}

macro_rules! scalar_foreign_return {
    ($($ty:ty),*) => { $(impl ForeignReturn for $ty {})* };
}

scalar_foreign_return!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64, ());

impl ForeignReturn for CoreBuffer {
    fn release(self) {
        if let Err(e) = self.free() {
            warn!(error = %e, "could not release unread foreign future buffer");
        }
    }
}

#[derive(Default)]
struct JobState {
    abort: Option<AbortHandle>,
    cancelled: bool,
}

#[derive(Default)]
struct Job {
    state: Mutex<JobState>,
}

impl Job {
    fn attach(&self, abort: AbortHandle) {
        let mut state = self.state.lock();
        if state.cancelled {
            abort.abort();
        } else {
            state.abort = Some(abort);
        }
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancelled = true;
        if let Some(abort) = state.abort.take() {
            abort.abort();
        }
    }
}

static JOBS: Lazy<HandleMap<Arc<Job>>> = Lazy::new(|| HandleMap::new("foreign_futures"));

/// `free` slot of every [`ForeignFuture`] this module hands out.
extern "C" fn free_foreign_future(handle: u64) {
    cancel_job(Handle::from_raw(handle));
}

/// Abort a job unless it already completed. Idempotent.
pub fn cancel_job(handle: Handle) {
    match JOBS.remove(handle) {
        Ok(job) => {
            debug!(job = handle.as_raw(), "foreign future cancelled");
            job.cancel();
        }
        Err(_) => debug!(job = handle.as_raw(), "foreign future already settled"),
    }
}

/// Whether a job is still running and wanted.
pub fn is_pending(handle: Handle) -> bool {
    JOBS.contains(handle)
}

/// Start host async work on `runtime` for the core.
///
/// The outcome is folded into a call status exactly as a synchronous callback
/// would be, including panics inside `future`.
pub fn spawn_foreign<F, T, E>(
    runtime: &RuntimeHandle,
    future: F,
    complete: ForeignFutureComplete<T::ReturnType>,
    callback_data: u64,
) -> Result<ForeignFuture, HandleError>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: LowerReturn + Send + 'static,
    T::ReturnType: Send + 'static,
    E: Lower + Send + 'static,
{
    let job = Arc::new(Job::default());
    let handle = JOBS.insert(Arc::clone(&job))?;

    let work = runtime.spawn(future);
    job.attach(work.abort_handle());

    runtime.spawn(async move {
        let outcome = work.await;
        // Lost to `free`: the core no longer wants the result.
        if JOBS.remove(handle).is_err() {
            return;
        }
        let mut call_status = CallStatus::new();
        let return_value = match outcome {
            Ok(result) => call_with_result(&mut call_status, || result),
            Err(e) if e.is_panic() => {
                let message = panic_message(&*e.into_panic());
                error!(message = %message, "foreign future panicked");
                call_status.set_panic(&message);
                T::ffi_default()
            }
            Err(_) => {
                call_status.set_cancelled();
                T::ffi_default()
            }
        };
        complete(
            callback_data,
            ForeignFutureResult {
                return_value,
                call_status,
            },
        );
    });

    Ok(ForeignFuture {
        handle: handle.as_raw(),
        free: free_foreign_future,
    })
}

static WAITERS: Lazy<HandleMap<Box<dyn Any + Send>>> =
    Lazy::new(|| HandleMap::new("foreign_future_waiters"));

/// Completion callback the core hands to the host, one instantiation per type.
extern "C" fn deliver<R: ForeignReturn>(callback_data: u64, result: ForeignFutureResult<R>) {
    let undelivered = match WAITERS.remove(Handle::from_raw(callback_data)) {
        Ok(slot) => match slot.downcast::<oneshot::Sender<ForeignFutureResult<R>>>() {
            Ok(sender) => (*sender).send(result).err(),
            Err(_) => {
                error!(callback_data, "foreign future completed with the wrong type");
                Some(result)
            }
        },
        Err(_) => Some(result),
    };
    if let Some(ForeignFutureResult {
        return_value,
        mut call_status,
    }) = undelivered
    {
        debug!(callback_data, "discarding result of abandoned foreign future");
        return_value.release();
        if let Err(e) = call_status.take_error_buf().free() {
            warn!(error = %e, "could not release foreign future error buffer");
        }
    }
}

/// Core-side interest in one foreign future. Dropping it frees the future.
struct Interest {
    waiter: Handle,
    future: Option<ForeignFuture>,
}

impl Drop for Interest {
    fn drop(&mut self) {
        let _ = WAITERS.remove(self.waiter);
        if let Some(future) = self.future.take() {
            (future.free)(future.handle);
        }
    }
}

/// Await a foreign future from the core.
///
/// `start` receives the completion callback and its data and must start the
/// host work, typically by calling an async vtable method. Dropping the
/// returned future frees the foreign future, which cancels the host work.
pub async fn await_foreign<R, E>(
    caller: &Caller,
    start: impl FnOnce(ForeignFutureComplete<R>, u64) -> ForeignFuture,
) -> Result<R, CallError<E>>
where
    R: ForeignReturn,
    E: Lift,
{
    let (sender, receiver) = oneshot::channel::<ForeignFutureResult<R>>();
    let waiter = WAITERS.insert(Box::new(sender)).map_err(Error::from)?;
    let mut interest = Interest {
        waiter,
        future: None,
    };
    interest.future = Some(start(deliver::<R>, waiter.as_raw()));

    let ForeignFutureResult {
        return_value,
        call_status,
    } = receiver
        .await
        .map_err(|_| Error::Protocol("foreign future dropped its completion".into()))?;
    drop(interest);

    match caller.check_status(call_status) {
        Ok(()) => Ok(return_value),
        Err(e) => {
            return_value.release();
            Err(e)
        }
    }
}
