pub use self::future::{Cause, Future, FutureError, FutureResult, Panicked, Status};
pub use self::runtime::Runtime;
pub use self::task::{Job, Schedule};

mod future;
mod runtime;
mod scheduler;
mod task;
