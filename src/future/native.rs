//! Core-side futures driven by host polls.
//!
//! The core does not run an executor for these. Each poll from the host runs
//! the future once on the polling thread; when it is not ready, the host's
//! continuation is stored and resumed by the future's waker, from whatever
//! thread the wake happens on.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use parking_lot::Mutex;

use super::ContinuationCallback;
use super::scheduler::Continuation;
use crate::call::{CallStatus, LowerReturn, call_with_result, panic_message};
use crate::codec::Lower;
use crate::handle::{Handle, HandleError, HandleMap};
use crate::logging::{debug, error, trace};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

enum State<T, E> {
    Running(BoxFuture<Result<T, E>>),
    Done(Result<T, E>),
    Panicked(String),
    /// Result handed out, or future dropped by cancellation.
    Consumed,
}

struct CoreFuture<T, E> {
    state: Mutex<State<T, E>>,
    continuation: Continuation,
}

impl<T, E> CoreFuture<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn new(future: BoxFuture<Result<T, E>>) -> Self {
        Self {
            state: Mutex::new(State::Running(future)),
            continuation: Continuation::new(),
        }
    }

    /// Run the future once if it is still running. Returns `true` once a
    /// result (or a panic) is available.
    fn poll_ready(self: &Arc<Self>) -> bool {
        let mut state = self.state.lock();
        let State::Running(future) = &mut *state else {
            return true;
        };
        let waker = Waker::from(Arc::clone(self));
        let mut cx = Context::from_waker(&waker);
        match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
            Ok(Poll::Pending) => false,
            Ok(Poll::Ready(result)) => {
                *state = State::Done(result);
                true
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                error!(message = %message, "future panicked while polled");
                *state = State::Panicked(message);
                true
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.continuation.is_cancelled()
    }
}

impl<T, E> Wake for CoreFuture<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.continuation.wake();
    }
}

/// Type-erased operations on a future whose completion returns `R`.
trait FutureObject<R>: Send + Sync {
    fn poll(self: Arc<Self>, callback: ContinuationCallback, data: u64);
    fn complete(&self, status: &mut CallStatus) -> R;
    fn cancel(&self);
}

impl<T, E> FutureObject<T::ReturnType> for CoreFuture<T, E>
where
    T: LowerReturn + Send + 'static,
    E: Lower + Send + 'static,
{
    fn poll(self: Arc<Self>, callback: ContinuationCallback, data: u64) {
        if self.is_cancelled() {
            debug!(data, "poll after cancel ignored");
            return;
        }
        if self.poll_ready() {
            // Silent if a cancel was acknowledged during the poll.
            self.continuation.ready(callback, data);
        } else {
            self.continuation.store(callback, data);
        }
    }

    fn complete(&self, status: &mut CallStatus) -> T::ReturnType {
        if self.is_cancelled() {
            status.set_cancelled();
            return T::ffi_default();
        }
        let taken = std::mem::replace(&mut *self.state.lock(), State::Consumed);
        match taken {
            State::Done(result) => call_with_result(status, || result),
            State::Panicked(message) => {
                status.set_panic(&message);
                T::ffi_default()
            }
            State::Running(future) => {
                *self.state.lock() = State::Running(future);
                status.set_panic("complete called before the future was ready");
                T::ffi_default()
            }
            State::Consumed => {
                status.set_panic("future result was already taken");
                T::ffi_default()
            }
        }
    }

    fn cancel(&self) {
        if self.continuation.cancel() {
            // Dropped outside the lock: dropping may wake.
            let dropped = std::mem::replace(&mut *self.state.lock(), State::Consumed);
            drop(dropped);
            debug!("future cancelled");
        }
    }
}

/// Handle table of in-flight futures whose completion returns `R`.
///
/// There is one registry per FFI return type; each backs one set of
/// poll/complete/cancel/free entry points.
pub struct FutureRegistry<R: 'static> {
    futures: HandleMap<Arc<dyn FutureObject<R>>>,
}

impl<R: Default + 'static> FutureRegistry<R> {
    pub fn new(name: &'static str) -> Self {
        Self {
            futures: HandleMap::new(name),
        }
    }

    /// Register a future and return the handle the host polls it by.
    pub fn spawn<F, T, E>(&self, future: F) -> Result<Handle, HandleError>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: LowerReturn<ReturnType = R> + Send + 'static,
        E: Lower + Send + 'static,
    {
        let object: Arc<dyn FutureObject<R>> = Arc::new(CoreFuture::new(Box::pin(future)));
        let handle = self.futures.insert(object)?;
        trace!(registry = self.futures.name(), handle = handle.as_raw(), "future started");
        Ok(handle)
    }

    /// Poll once; `callback(data, code)` is invoked when the host should act.
    pub fn poll(&self, handle: Handle, callback: ContinuationCallback, data: u64) {
        // Cloned out so the table lock is not held while polling.
        match self.futures.get(handle) {
            Ok(future) => future.poll(callback, data),
            Err(e) => error!(error = %e, "poll on unknown future"),
        }
    }

    pub fn complete(&self, handle: Handle, status: &mut CallStatus) -> R {
        match self.futures.get(handle) {
            Ok(future) => future.complete(status),
            Err(e) => {
                status.set_panic(&e.to_string());
                R::default()
            }
        }
    }

    pub fn cancel(&self, handle: Handle) {
        match self.futures.get(handle) {
            Ok(future) => future.cancel(),
            Err(e) => debug!(error = %e, "cancel on unknown future"),
        }
    }

    /// Release the future. Freeing without a prior cancel also cancels it.
    pub fn free(&self, handle: Handle) {
        match self.futures.remove(handle) {
            Ok(future) => future.cancel(),
            Err(e) => error!(error = %e, "free on unknown future"),
        }
    }

    /// Number of futures not yet freed.
    pub fn len(&self) -> usize {
        self.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::PollCode;
    use crate::call::CallStatusCode;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicU64, Ordering};

    static SIGNALS: Mutex<Vec<(u64, i8)>> = Mutex::new(Vec::new());
    static NEXT_DATA: AtomicU64 = AtomicU64::new(1000);

    extern "C" fn signal(data: u64, code: i8) {
        SIGNALS.lock().push((data, code));
    }

    fn signals_for(data: u64) -> Vec<i8> {
        SIGNALS
            .lock()
            .iter()
            .filter(|(d, _)| *d == data)
            .map(|(_, code)| *code)
            .collect()
    }

    fn fresh_data() -> u64 {
        NEXT_DATA.fetch_add(1, Ordering::Relaxed)
    }

    #[test]
    fn test_ready_future_signals_ready_once() {
        let registry = FutureRegistry::<u32>::new("test_u32");
        let handle = registry
            .spawn(async { Ok::<u32, Infallible>(42) })
            .unwrap();
        let data = fresh_data();
        registry.poll(handle, signal, data);
        assert_eq!(signals_for(data), vec![PollCode::Ready as i8]);

        let mut status = CallStatus::new();
        assert_eq!(registry.complete(handle, &mut status), 42);
        assert!(status.is_success());
        registry.free(handle);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_pending_future_wakes_then_ready() {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let gate = Arc::new(Mutex::new(None::<Waker>));
        let gate_in = Arc::clone(&gate);
        let registry = FutureRegistry::<i8>::new("test_bool");
        let handle = registry
            .spawn(std::future::poll_fn(move |cx| {
                if rx.try_recv().is_ok() {
                    Poll::Ready(Ok::<bool, Infallible>(true))
                } else {
                    *gate_in.lock() = Some(cx.waker().clone());
                    Poll::Pending
                }
            }))
            .unwrap();

        let data = fresh_data();
        registry.poll(handle, signal, data);
        assert!(signals_for(data).is_empty());

        tx.send(()).unwrap();
        let waker = gate.lock().take().unwrap();
        waker.wake();
        assert_eq!(signals_for(data), vec![PollCode::Wake as i8]);

        registry.poll(handle, signal, data);
        assert_eq!(
            signals_for(data),
            vec![PollCode::Wake as i8, PollCode::Ready as i8]
        );
        let mut status = CallStatus::new();
        assert_eq!(registry.complete(handle, &mut status), 1);
        registry.free(handle);
    }

    #[test]
    fn test_cancel_silences_and_reports_cancelled() {
        let registry = FutureRegistry::<u64>::new("test_u64");
        let handle = registry
            .spawn(std::future::pending::<Result<u64, Infallible>>())
            .unwrap();
        let data = fresh_data();
        registry.poll(handle, signal, data);
        registry.cancel(handle);
        registry.poll(handle, signal, data);
        assert!(signals_for(data).is_empty());

        let mut status = CallStatus::new();
        registry.complete(handle, &mut status);
        assert_eq!(status.status_code(), Ok(CallStatusCode::Cancelled));
        registry.free(handle);
    }

    fn explode() -> Result<(), Infallible> {
        panic!("async body failed")
    }

    #[test]
    fn test_panicking_future_completes_with_panic() {
        let registry = FutureRegistry::<()>::new("test_void");
        let handle = registry
            .spawn(async { explode() })
            .unwrap();
        let data = fresh_data();
        registry.poll(handle, signal, data);
        assert_eq!(signals_for(data), vec![PollCode::Ready as i8]);
        let mut status = CallStatus::new();
        registry.complete(handle, &mut status);
        assert_eq!(status.status_code(), Ok(CallStatusCode::Panic));
        let message: String = status.take_error_buf().lift().unwrap();
        assert_eq!(message, "async body failed");
        registry.free(handle);
    }

    #[test]
    fn test_complete_twice_is_panic() {
        let registry = FutureRegistry::<u32>::new("test_twice");
        let handle = registry.spawn(async { Ok::<u32, Infallible>(1) }).unwrap();
        registry.poll(handle, signal, fresh_data());
        let mut status = CallStatus::new();
        registry.complete(handle, &mut status);
        registry.complete(handle, &mut status);
        assert_eq!(status.status_code(), Ok(CallStatusCode::Panic));
        status.take_error_buf().free().unwrap();
        registry.free(handle);
    }

    /// Marks the point at which `cancel` returned.
    const CANCEL_RETURNED: i8 = -1;

    #[test]
    fn test_no_ready_after_cancel_returns() {
        let registry = Arc::new(FutureRegistry::<u32>::new("test_race"));
        for _ in 0..500 {
            let handle = registry.spawn(async { Ok::<u32, Infallible>(7) }).unwrap();
            let data = fresh_data();
            let poller = {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.poll(handle, signal, data))
            };
            registry.cancel(handle);
            SIGNALS.lock().push((data, CANCEL_RETURNED));
            poller.join().unwrap();

            let codes = signals_for(data);
            let marker = codes.iter().position(|code| *code == CANCEL_RETURNED).unwrap();
            assert_eq!(codes.len(), marker + 1, "callback fired after cancel: {codes:?}");
            registry.free(handle);
        }
        assert!(registry.is_empty());
    }
}
