use self::State::*;
use crate::core::task::Job;

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{io, mem, thread};

/// Fixed set of worker threads draining a shared job queue.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    queue: Mutex<Queue>,
    // Signalled when a job is enqueued or the scheduler starts terminating
    available: Condvar,
    // Signalled when the last worker exits
    terminated: Condvar,
}

struct Queue {
    jobs: VecDeque<Box<dyn Job>>,
    state: State,
    live: usize,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler {
            inner: Arc::new(SchedulerInner {
                queue: Mutex::new(Queue {
                    jobs: VecDeque::new(),
                    state: Running,
                    live: 0,
                }),
                available: Condvar::new(),
                terminated: Condvar::new(),
            }),
        }
    }

    /// Spawns `workers` threads. Fails only if not a single thread could be
    /// spawned.
    pub fn start(&self, workers: usize, name: &str) -> io::Result<()> {
        let mut spawned = 0;

        for i in 0..workers {
            let inner = self.inner.clone();

            // Count the worker before it runs so that a shutdown racing with
            // start waits for it.
            self.inner.queue.lock().live += 1;

            let res = thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || worker_loop(inner));

            match res {
                Ok(_) => spawned += 1,
                Err(e) => {
                    self.inner.worker_exited();

                    if spawned == 0 {
                        return Err(e);
                    }

                    warn!("started {} of {} workers: {}", spawned, workers, e);
                    break;
                }
            }
        }

        debug!("started {} workers", spawned);
        Ok(())
    }

    /// Enqueues the job, handing it back if the scheduler is terminating.
    pub fn enqueue(&self, job: Box<dyn Job>) -> Result<(), Box<dyn Job>> {
        let mut queue = self.inner.queue.lock();

        if queue.state != Running {
            return Err(job);
        }

        queue.jobs.push_back(job);
        drop(queue);

        self.inner.available.notify_one();
        Ok(())
    }

    /// Stops accepting jobs, aborts the queued ones and waits up to `timeout`
    /// for running jobs to finish.
    pub fn shutdown(&self, timeout: Duration) {
        self.inner.shutdown(timeout);
    }
}

impl SchedulerInner {
    fn shutdown(&self, timeout: Duration) {
        let drained = {
            let mut queue = self.queue.lock();

            if queue.state == Running {
                debug!("terminating scheduler; live={}", queue.live);
                queue.state = if queue.live == 0 { Terminated } else { Terminating };
                mem::take(&mut queue.jobs)
            } else {
                VecDeque::new()
            }
        };

        self.available.notify_all();

        if !drained.is_empty() {
            debug!("aborting {} queued jobs", drained.len());
        }

        for job in drained {
            job.abort();
        }

        let deadline = Instant::now().checked_add(timeout);
        let mut queue = self.queue.lock();

        while queue.state != Terminated {
            match deadline {
                Some(deadline) => {
                    if self.terminated.wait_until(&mut queue, deadline).timed_out() {
                        debug!("shutdown timed out with {} workers running", queue.live);
                        break;
                    }
                }
                None => self.terminated.wait(&mut queue),
            }
        }
    }

    // Blocks until a job is available, returns None once terminating
    fn take(&self) -> Option<Box<dyn Job>> {
        let mut queue = self.queue.lock();

        loop {
            if queue.state != Running {
                return None;
            }

            if let Some(job) = queue.jobs.pop_front() {
                return Some(job);
            }

            self.available.wait(&mut queue);
        }
    }

    fn worker_exited(&self) {
        let mut queue = self.queue.lock();

        queue.live -= 1;

        if queue.live == 0 && queue.state == Terminating {
            // Transition to the terminated state
            queue.state = Terminated;

            // Signal any waiting threads
            self.terminated.notify_all();
        }
    }
}

// ===== Background worker =====

struct Worker {
    scheduler: Arc<SchedulerInner>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        debug!("terminating worker thread");
        self.scheduler.worker_exited();
    }
}

fn worker_loop(scheduler: Arc<SchedulerInner>) {
    let worker = Worker { scheduler };

    while let Some(job) = worker.scheduler.take() {
        // A panicking job must not take the worker down with it
        if panic::catch_unwind(AssertUnwindSafe(move || job.run())).is_err() {
            error!("job panicked on worker {:?}", thread::current().name());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Terminating,
    Terminated,
}
