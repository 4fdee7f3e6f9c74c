//! Host side of the async bridge: awaiting a core future.
//!
//! Each poll registers a continuation (a oneshot sender stored under a fresh
//! handle) and passes that handle as the poll's `data`. The continuation
//! callback only resumes the waiting task; the result is fetched afterwards
//! with `complete`. Whichever of "resumed" and "abandoned" removes the
//! continuation from its table first wins, so exactly one of them is observed.

use once_cell::sync::Lazy;
use tokio::sync::oneshot;

use super::{FutureSymbols, PollCode};
use crate::call::{CallError, Caller};
use crate::codec::Lift;
use crate::error::Error;
use crate::handle::{Handle, HandleMap};
use crate::logging::{debug, trace};

static CONTINUATIONS: Lazy<HandleMap<oneshot::Sender<i8>>> =
    Lazy::new(|| HandleMap::new("continuations"));

/// Continuation callback handed to every poll. Safe to call from any thread.
extern "C" fn resume_continuation(data: u64, poll_code: i8) {
    match CONTINUATIONS.remove(Handle::from_raw(data)) {
        Ok(sender) => {
            // The receiver is gone only if the await was abandoned.
            let _ = sender.send(poll_code);
        }
        Err(_) => debug!(data, "continuation already resumed or abandoned"),
    }
}

/// One future being driven; cancels and frees it when dropped early.
struct InFlight<R> {
    handle: u64,
    symbols: FutureSymbols<R>,
    continuation: Option<Handle>,
    finished: bool,
}

impl<R> InFlight<R> {
    fn new(handle: u64, symbols: FutureSymbols<R>) -> Result<Self, Error> {
        if !Handle::from_raw(handle).is_valid() {
            return Err(Error::Protocol(format!("invalid future handle {handle}")));
        }
        Ok(Self {
            handle,
            symbols,
            continuation: None,
            finished: false,
        })
    }

    /// Register a continuation and poll.
    fn poll(&mut self) -> Result<oneshot::Receiver<i8>, Error> {
        let (sender, receiver) = oneshot::channel();
        let continuation = CONTINUATIONS.insert(sender)?;
        self.continuation = Some(continuation);
        trace!(future = self.handle, continuation = continuation.as_raw(), "polling");
        (self.symbols.poll)(self.handle, resume_continuation, continuation.as_raw());
        Ok(receiver)
    }

    /// Interpret a resumption. `Ok(true)` means ready.
    fn resumed(&mut self, code: Result<i8, oneshot::error::RecvError>) -> Result<bool, Error> {
        self.continuation = None;
        match code.map(PollCode::try_from) {
            Ok(Ok(PollCode::Ready)) => Ok(true),
            Ok(Ok(PollCode::Wake)) => Ok(false),
            Ok(Err(code)) => Err(Error::Protocol(format!("unknown poll code {code}"))),
            Err(_) => Err(Error::Protocol("continuation dropped unresumed".into())),
        }
    }

    fn complete<E: Lift>(mut self, caller: &Caller) -> Result<R, CallError<E>> {
        self.finished = true;
        let complete = self.symbols.complete;
        let handle = self.handle;
        caller.call(|status| complete(handle, status))
    }
}

impl<R> Drop for InFlight<R> {
    fn drop(&mut self) {
        if let Some(continuation) = self.continuation.take() {
            // Fails if the callback got there first; either way it is settled.
            let _ = CONTINUATIONS.remove(continuation);
        }
        if !self.finished {
            debug!(future = self.handle, "cancelling abandoned future");
            (self.symbols.cancel)(self.handle);
        }
        (self.symbols.free)(self.handle);
    }
}

/// Drive a core future to completion from async code.
///
/// Dropping the returned future before it resolves cancels and frees the core
/// future. The core future is freed in every case.
pub async fn await_future<R, E: Lift>(
    caller: &Caller,
    handle: u64,
    symbols: FutureSymbols<R>,
) -> Result<R, CallError<E>> {
    let mut in_flight = InFlight::new(handle, symbols)?;
    loop {
        let receiver = in_flight.poll()?;
        if in_flight.resumed(receiver.await)? {
            break;
        }
    }
    in_flight.complete(caller)
}

/// Drive a core future to completion, blocking the current thread.
///
/// Must not be called from within an async runtime.
pub fn wait_future<R, E: Lift>(
    caller: &Caller,
    handle: u64,
    symbols: FutureSymbols<R>,
) -> Result<R, CallError<E>> {
    let mut in_flight = InFlight::new(handle, symbols)?;
    loop {
        let receiver = in_flight.poll()?;
        if in_flight.resumed(receiver.blocking_recv())? {
            break;
        }
    }
    in_flight.complete(caller)
}
