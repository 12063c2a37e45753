//! Worker dispatch.
//!
//! The runtime owns a fixed pool of worker threads. It is created once and
//! shared by every caller that needs to run work asynchronously; submitting
//! work never allocates new workers.

use self::State::*;
use crate::config::{Config, ConfigError};
use crate::core::future::{Future, FutureError};
use crate::core::scheduler::Scheduler;
use crate::core::task::{Job, Schedule, Task};

use std::convert::Infallible;
use std::error::Error;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    pub fn new(config: Config) -> Result<Runtime, ConfigError> {
        config.validate()?;

        Ok(Runtime {
            inner: Arc::new(RuntimeInner::new(config)),
        })
    }

    /// Start the worker threads if they are not already running.
    pub fn start(&self) -> io::Result<()> {
        self.inner.start()
    }

    /// Shut down, waiting up to the configured shutdown timeout for running
    /// jobs to finish.
    pub fn shutdown(&self) {
        self.shutdown_timed(self.inner.config.shutdown_timeout);
    }

    pub fn shutdown_timed(&self, timeout: Duration) {
        self.inner.shutdown(timeout);
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self.inner.state(), ShuttingDown | Shutdown)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Runs `op` on a worker. The returned future completes with its return
    /// value, or fails if it panics.
    pub fn submit<T, F>(&self, op: F) -> Future<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.try_submit(move || Ok::<T, Infallible>(op()))
    }

    /// Runs a fallible `op` on a worker. An `Err` fails the returned future
    /// with that error as its cause.
    pub fn try_submit<T, E, F>(&self, op: F) -> Future<T>
    where
        T: Clone + Send + 'static,
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let future = Future::new();
        let op = move || op().map_err(FutureError::execution);

        self.schedule(Box::new(Task::new(future.clone(), op)));
        future
    }
}

impl Schedule for Runtime {
    fn schedule(&self, job: Box<dyn Job>) {
        self.inner.schedule(job);
    }
}

impl Clone for Runtime {
    fn clone(&self) -> Runtime {
        Runtime {
            inner: self.inner.clone(),
        }
    }
}

/*
 *
 * ===== Implementation =====
 *
 */

struct RuntimeInner {
    state: AtomicUsize,
    scheduler: Scheduler,
    config: Config,
}

impl RuntimeInner {
    fn new(config: Config) -> RuntimeInner {
        RuntimeInner {
            state: AtomicUsize::new(New as usize),
            scheduler: Scheduler::new(),
            config,
        }
    }

    fn state(&self) -> State {
        State::from_usize(self.state.load(Ordering::Acquire))
    }

    /// Start the runtime if it has not already been started
    fn start(&self) -> io::Result<()> {
        let mut expect = self.state.load(Ordering::Acquire);

        loop {
            let next = match State::from_usize(expect) {
                // Transition from New to Running
                New => Running,
                // Nothing to do
                _ => return Ok(()),
            };

            match self.state.compare_exchange(expect, next as usize, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(actual) => expect = actual,
            }
        }

        debug!("starting runtime; workers={}", self.config.workers);

        if let Err(e) = self.scheduler.start(self.config.workers, &self.config.thread_name) {
            error!("failed to start worker threads: {}", e);
            self.shutdown(Duration::from_millis(0));
            return Err(e);
        }

        Ok(())
    }

    /// Shutdown the runtime waiting up to specified time
    fn shutdown(&self, timeout: Duration) {
        let mut expect = self.state.load(Ordering::Acquire);

        loop {
            let next = match State::from_usize(expect) {
                New | Running => ShuttingDown,
                ShuttingDown => break,
                Shutdown => return,
            };

            match self.state.compare_exchange(expect, next as usize, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => break,
                Err(actual) => expect = actual,
            }
        }

        debug!("shutting down runtime");

        // Wait until shutdown
        self.scheduler.shutdown(timeout);

        // Update the state
        self.state.store(Shutdown as usize, Ordering::Release);
    }

    fn schedule(&self, job: Box<dyn Job>) {
        // Ensure that the runtime is running
        if let Err(e) = self.start() {
            debug!("runtime unavailable, aborting job: {}", e);
            job.abort();
            return;
        }

        if let Err(job) = self.scheduler.enqueue(job) {
            debug!("runtime shut down, aborting job");
            job.abort();
        }
    }
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        debug!("dropping RuntimeInner");
        self.shutdown(Duration::from_millis(0));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
enum State {
    New,
    Running,
    ShuttingDown,
    Shutdown,
}

impl State {
    fn from_usize(val: usize) -> State {
        match val {
            0 => New,
            1 => Running,
            2 => ShuttingDown,
            3 => Shutdown,
            _ => unreachable!("[BUG] invalid runtime state {}", val),
        }
    }
}
