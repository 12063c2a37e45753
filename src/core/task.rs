use crate::core::future::{catch_panic, Failure, Future, FutureResult};

/// A unit of work handed to a scheduler.
pub trait Job: Send {
    /// Runs the job on the current worker. A panic is caught and logged, the
    /// worker moves on to the next job.
    fn run(self: Box<Self>);

    /// Called instead of `run` when the scheduler discards the job.
    fn abort(self: Box<Self>);
}

/// Something able to run jobs on a worker resource.
pub trait Schedule: Send + Sync {
    // Schedule the job for execution. A scheduler that cannot accept the job
    // must abort it rather than drop it.
    fn schedule(&self, job: Box<dyn Job>);
}

/// Runs a computation and moves its outcome into a future.
pub(crate) struct Task<T: 'static, F> {
    future: Future<T>,
    op: F,
}

impl<T, F> Task<T, F>
where
    T: Clone + Send + 'static,
    F: FnOnce() -> FutureResult<T> + Send,
{
    pub(crate) fn new(future: Future<T>, op: F) -> Task<T, F> {
        Task { future, op }
    }
}

impl<T, F> Job for Task<T, F>
where
    T: Clone + Send + 'static,
    F: FnOnce() -> FutureResult<T> + Send,
{
    fn run(self: Box<Self>) {
        let Task { future, op } = *self;

        if future.is_cancelled() {
            debug!("future cancelled before the job started, skipping");
            return;
        }

        future.settle(catch_panic(op).and_then(|res| res));
    }

    fn abort(self: Box<Self>) {
        trace!("job aborted");
        let _ = self.future.fail_with(Failure::Shutdown);
    }
}
