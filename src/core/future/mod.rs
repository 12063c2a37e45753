pub use self::future::Future;

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

mod drain;
mod future;

/// The cause carried by a failed future.
pub type Cause = Arc<dyn Error + Send + Sync + 'static>;

pub type FutureResult<T> = Result<T, FutureError>;

/// Observable state of a future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        self != Status::Pending
    }
}

impl fmt::Display for Status {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            Status::Pending => "pending",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
        };

        fmt.write_str(name)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FutureError {
    /// The computation itself returned an error or panicked.
    #[error("computation failed: {0}")]
    Execution(#[source] Cause),

    #[error("future was cancelled")]
    Cancelled,

    /// Nothing was observed within the caller's budget. The future itself is
    /// left untouched and may still complete later.
    #[error("timed out after {0:?} waiting for future")]
    Timeout(Duration),

    /// The runtime shut down before the job could run.
    #[error("runtime shut down before the job ran")]
    Shutdown,

    /// A producer attempted to complete a future that already reached a
    /// terminal state. Only returned by `complete` and `fail`.
    #[error("future already {0}")]
    IllegalState(Status),
}

impl FutureError {
    pub fn execution<E>(cause: E) -> FutureError
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        FutureError::Execution(Arc::from(cause.into()))
    }

    pub fn is_execution_error(&self) -> bool {
        matches!(*self, FutureError::Execution(..))
    }

    pub fn is_cancellation_error(&self) -> bool {
        matches!(*self, FutureError::Cancelled)
    }

    pub fn is_timeout_error(&self) -> bool {
        matches!(*self, FutureError::Timeout(..))
    }

    pub fn is_shutdown_error(&self) -> bool {
        matches!(*self, FutureError::Shutdown)
    }

    /// Returns the cause of an execution error
    pub fn cause(&self) -> Option<&Cause> {
        match *self {
            FutureError::Execution(ref cause) => Some(cause),
            _ => None,
        }
    }
}

/// A computation panicked while running on a worker or inside a continuation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("panicked: {message}")]
pub struct Panicked {
    pub message: String,
}

impl Panicked {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Panicked {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        Panicked { message }
    }
}

/// Runs `op`, turning a panic into an execution error.
pub(crate) fn catch_panic<R, F>(op: F) -> FutureResult<R>
where
    F: FnOnce() -> R,
{
    panic::catch_unwind(AssertUnwindSafe(op))
        .map_err(|payload| FutureError::execution(Panicked::from_payload(payload)))
}

/// Why a future transitioned to `Failed`.
#[derive(Debug, Clone)]
pub(crate) enum Failure {
    Error(Cause),
    Shutdown,
}

impl Failure {
    pub(crate) fn to_error(&self) -> FutureError {
        match *self {
            Failure::Error(ref cause) => FutureError::Execution(cause.clone()),
            Failure::Shutdown => FutureError::Shutdown,
        }
    }

    // Inverse of `to_error` for errors carried across a chained future
    pub(crate) fn from_error(err: FutureError) -> Option<Failure> {
        match err {
            FutureError::Execution(cause) => Some(Failure::Error(cause)),
            FutureError::Shutdown => Some(Failure::Shutdown),
            FutureError::Cancelled => None,
            other => Some(Failure::Error(Arc::new(other))),
        }
    }
}
