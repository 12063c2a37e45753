//! Deferred, cancellable, composable results backed by a reusable worker pool.
//!
//! ```no_run
//! use completable::{Config, Runtime};
//!
//! let runtime = Runtime::new(Config::default()).unwrap();
//! let greeting = runtime.submit(|| "hello".to_string());
//!
//! let len = greeting.map(|s| s.len());
//! assert_eq!(len.get().unwrap(), 5);
//!
//! runtime.shutdown();
//! ```
#![crate_name = "completable"]

#[macro_use]
extern crate log;

pub use crate::config::{Config, ConfigError};

pub use crate::core::{
    Cause,
    Future,
    FutureError,
    FutureResult,
    Job,
    Panicked,
    Runtime,
    Schedule,
    Status,
};

mod config;
mod core;
