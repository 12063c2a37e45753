use super::drain;
use super::{catch_panic, Failure, FutureError, FutureResult, Status};
use crate::core::task::{Schedule, Task};

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{fmt, mem};

/// A single-assignment value produced concurrently.
///
/// `Future` is a cheap handle: clones observe and drive the same underlying
/// cell. Exactly one of `complete`, `fail` or `cancel` wins; every other
/// attempt observes the winner.
///
/// Continuations registered while the future is pending run on the thread
/// that performs the terminal transition, in registration order. Those
/// registered afterwards run immediately on the registering thread. When a
/// continuation settles another future, that future's continuations run after
/// the current batch returns rather than nested inside it, so chains of any
/// length complete and drop without growing the stack.
pub struct Future<T: 'static> {
    inner: Arc<FutureInner<T>>,
}

impl<T: Clone + Send + 'static> Future<T> {
    /// Returns a new pending future
    pub fn new() -> Future<T> {
        Future {
            inner: Arc::new(FutureInner::new()),
        }
    }

    /// Returns a future already completed with `val`
    pub fn completed(val: T) -> Future<T> {
        let ret = Future::new();
        ret.transition(State::Completed(val)).ok();
        ret
    }

    /// Returns a future already failed with `cause`
    pub fn failed<E>(cause: E) -> Future<T>
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        let ret = Future::new();
        ret.transition(State::Failed(Failure::Error(Arc::from(cause.into()))))
            .ok();
        ret
    }

    /// Completes the future with the given value.
    ///
    /// Completing a future that already reached a terminal state is a producer
    /// bug: the stored outcome is kept and `IllegalState` is returned.
    pub fn complete(&self, val: T) -> Result<(), FutureError> {
        self.produce(State::Completed(val))
    }

    /// Fails the future, the cause is surfaced as `FutureError::Execution`.
    pub fn fail<E>(&self, cause: E) -> Result<(), FutureError>
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        self.produce(State::Failed(Failure::Error(Arc::from(cause.into()))))
    }

    pub(crate) fn fail_with(&self, failure: Failure) -> Result<(), FutureError> {
        self.produce(State::Failed(failure))
    }

    /// Attempts to cancel the future. Returns `true` if the future was pending
    /// and is now cancelled.
    pub fn cancel(&self) -> bool {
        self.transition(State::Cancelled).is_ok()
    }

    /// Blocks until the future reaches a terminal state.
    pub fn get(&self) -> FutureResult<T> {
        self.wait(None)
    }

    /// Blocks until the future reaches a terminal state or `timeout` elapses.
    /// Timing out leaves the future pending.
    pub fn get_timeout(&self, timeout: Duration) -> FutureResult<T> {
        self.wait(Some(timeout))
    }

    /// Returns the outcome without blocking, `None` while pending.
    pub fn poll(&self) -> Option<FutureResult<T>> {
        self.inner.lock().state.outcome()
    }

    pub fn status(&self) -> Status {
        self.inner.lock().state.status()
    }

    pub fn is_done(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status() == Status::Cancelled
    }

    /// Registers a pair of continuations, exactly one of which is invoked with
    /// the terminal outcome. The returned future completes once the invoked
    /// continuation returns, or fails if it panics.
    pub fn on_complete<F, E>(&self, on_value: F, on_error: E) -> Future<()>
    where
        F: FnOnce(T) + Send + 'static,
        E: FnOnce(FutureError) + Send + 'static,
    {
        let ret = Future::new();
        let done = ret.clone();

        self.ready(move |res| {
            let ran = catch_panic(move || match res {
                Ok(val) => on_value(val),
                Err(err) => on_error(err),
            });

            done.settle(ran);
        });

        ret
    }

    /// Maps the future to Future<U> by applying the provided function.
    ///
    /// Failure and cancellation propagate to the returned future without
    /// invoking `op`.
    pub fn map<U, F>(&self, op: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let ret = Future::new();
        let derived = ret.clone();

        self.ready(move |res| {
            derived.settle(res.and_then(|val| catch_panic(move || op(val))));
        });

        ret
    }

    /// Like `map`, but `op` runs as a job on the given scheduler instead of on
    /// the thread that observed the completion.
    pub fn map_on<S, U, F>(&self, sched: &S, op: F) -> Future<U>
    where
        S: Schedule + Clone + 'static,
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let ret = Future::new();
        let derived = ret.clone();
        let sched = sched.clone();

        self.ready(move |res| match res {
            Ok(val) => sched.schedule(Box::new(Task::new(derived, move || Ok(op(val))))),
            Err(err) => derived.settle(Err(err)),
        });

        ret
    }

    /// Chains a computation that itself produces a future. The returned future
    /// takes on the outcome of the future returned by `op`.
    pub fn and_then<U, F>(&self, op: F) -> Future<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Future<U> + Send + 'static,
    {
        let ret = Future::new();
        let derived = ret.clone();

        self.ready(move |res| match res.and_then(|val| catch_panic(move || op(val))) {
            Ok(next) => next.link(derived),
            Err(err) => derived.settle(Err(err)),
        });

        ret
    }

    /// Moves an observed outcome into this future.
    pub(crate) fn settle(&self, res: FutureResult<T>) {
        // Losing the race is already logged by `produce`
        let _ = match res {
            Ok(val) => self.complete(val),
            Err(FutureError::Cancelled) => {
                self.cancel();
                Ok(())
            }
            Err(err) => match Failure::from_error(err) {
                Some(failure) => self.fail_with(failure),
                None => Ok(()),
            },
        };
    }

    // Proxy self's completion to other
    fn link(&self, other: Future<T>) {
        trace!("linking two futures");
        self.ready(move |res| other.settle(res));
    }

    // Invoke the callback with the outcome on completion
    fn ready<F>(&self, cb: F)
    where
        F: FnOnce(FutureResult<T>) + Send + 'static,
    {
        let mut core = self.inner.lock();

        // If the future has already been realized, invoke the callback
        // outside of the lock.
        if let Some(res) = core.state.outcome() {
            drop(core);
            cb(res);
            return;
        }

        core.waiters.push(Box::new(cb));
    }

    // Producer-side transition, reporting a lost race loudly
    fn produce(&self, next: State<T>) -> Result<(), FutureError> {
        self.transition(next).map_err(|curr| {
            if curr == Status::Cancelled {
                debug!("future cancelled before the producer completed it");
            } else {
                error!("attempted to complete a future that is already {}", curr);
            }

            FutureError::IllegalState(curr)
        })
    }

    fn transition(&self, next: State<T>) -> Result<(), Status> {
        // Acquire the lock
        let mut core = self.inner.lock();

        if core.state.is_terminal() {
            return Err(core.state.status());
        }

        trace!("future transitioning to {}", next.status());

        core.state = next;

        let waiters = mem::take(&mut core.waiters);
        let outcome = if waiters.is_empty() {
            None
        } else {
            core.state.outcome()
        };

        // Release the lock before waking getters and running continuations
        drop(core);
        self.inner.condvar.notify_all();

        // Continuations may settle derived futures. Those run after this
        // batch instead of nesting inside it.
        if let Some(outcome) = outcome {
            drain::dispatch(Box::new(move || {
                for waiter in waiters {
                    waiter(outcome.clone());
                }
            }));
        }

        Ok(())
    }

    fn wait(&self, timeout: Option<Duration>) -> FutureResult<T> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut core = self.inner.lock();

        // Spurious wakeups are permitted, so check the state in a loop
        loop {
            if let Some(res) = core.state.outcome() {
                return res;
            }

            match (timeout, deadline) {
                (Some(timeout), Some(deadline)) => {
                    if self.inner.condvar.wait_until(&mut core, deadline).timed_out() {
                        return core
                            .state
                            .outcome()
                            .unwrap_or(Err(FutureError::Timeout(timeout)));
                    }
                }
                _ => self.inner.condvar.wait(&mut core),
            }
        }
    }
}

impl<T: Clone + Send + 'static> Default for Future<T> {
    fn default() -> Future<T> {
        Future::new()
    }
}

impl<T: 'static> Clone for Future<T> {
    fn clone(&self) -> Future<T> {
        Future {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for Future<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let status = self.inner.lock().state.status();
        fmt.debug_struct("Future").field("status", &status).finish()
    }
}

// == Implementation details ==
//
// Implemented with a single mutex per future. The state is only ever moved
// out of Pending while the lock is held, which linearizes the competing
// `complete`, `fail` and `cancel` calls. Blocking getters wait on a condvar
// paired with the same mutex.
struct FutureInner<T: 'static> {
    core: Mutex<Core<T>>,
    condvar: Condvar,
}

impl<T: 'static> FutureInner<T> {
    fn new() -> FutureInner<T> {
        FutureInner {
            core: Mutex::new(Core {
                state: State::Pending,
                waiters: Vec::new(),
            }),
            condvar: Condvar::new(),
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Core<T>> {
        self.core.lock()
    }
}

type Waiter<T> = Box<dyn FnOnce(FutureResult<T>) + Send>;

struct Core<T: 'static> {
    state: State<T>,
    // Continuations registered while pending, in registration order
    waiters: Vec<Waiter<T>>,
}

impl<T: 'static> Drop for Core<T> {
    fn drop(&mut self) {
        // Pending continuations own derived futures, which own theirs
        if !self.waiters.is_empty() {
            drain::release(Box::new(mem::take(&mut self.waiters)));
        }
    }
}

enum State<T> {
    Pending,
    Completed(T),
    Failed(Failure),
    Cancelled,
}

impl<T> State<T> {
    fn status(&self) -> Status {
        match *self {
            State::Pending => Status::Pending,
            State::Completed(..) => Status::Completed,
            State::Failed(..) => Status::Failed,
            State::Cancelled => Status::Cancelled,
        }
    }

    fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

impl<T: Clone> State<T> {
    fn outcome(&self) -> Option<FutureResult<T>> {
        match *self {
            State::Pending => None,
            State::Completed(ref val) => Some(Ok(val.clone())),
            State::Failed(ref failure) => Some(Err(failure.to_error())),
            State::Cancelled => Some(Err(FutureError::Cancelled)),
        }
    }
}
