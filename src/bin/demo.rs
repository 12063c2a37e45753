//! Plays the four asynchronous patterns against one shared runtime and prints
//! each outcome as a status line.
//!
//!     RUST_LOG=debug cargo run --bin demo -- 500

use completable::{Config, Future, FutureError, FutureResult, Runtime};

use std::fmt;
use std::thread::sleep;
use std::time::Duration;
use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

const DEFAULT_MILLIS: u64 = 2000;
const STEP: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
struct Pair {
    key: String,
    value: String,
}

impl Pair {
    fn new(key: &str, value: &str) -> Pair {
        Pair {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Pair(key={}, value={})", self.key, self.value)
    }
}

pub fn main() {
    init_logging();

    let millis = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_MILLIS);
    let delay = Duration::from_millis(millis);

    let runtime = match Runtime::new(Config::default()) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("invalid runtime configuration: {}", e);
            std::process::exit(1);
        }
    };

    run_async(&runtime);
    respond("simple", simple(&runtime, delay).get());
    respond("cancellation", cancellation(&runtime, delay).get());
    respond("encapsulated", encapsulated(&runtime, delay).get());

    println!("Attempting to shutdown");
    runtime.shutdown();
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(tracing_fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

// Interleaves worker and caller output, then waits for the worker.
fn run_async(runtime: &Runtime) {
    let future = runtime.submit(|| {
        for step in 1..=3 {
            println!("{}", step);
            sleep(STEP);
        }
    });

    println!("4");
    sleep(STEP);
    println!("5");
    sleep(STEP);

    respond("run-async", future.get().map(|()| "done"));

    println!("6");
}

// A future completed by a worker after `delay`.
fn simple(runtime: &Runtime, delay: Duration) -> Future<Pair> {
    let future = Future::new();
    let producer = future.clone();

    let produced = runtime.submit(move || {
        sleep(delay);
        producer.complete(Pair::new("key", "value"))
    });

    produced.on_complete(
        |res| {
            if let Err(e) = res {
                log::warn!("simple: producer could not complete the future: {}", e);
            }
        },
        |e| log::warn!("simple: producer job did not run: {}", e),
    );

    future
}

// A future cancelled by a worker after `delay`.
fn cancellation(runtime: &Runtime, delay: Duration) -> Future<Pair> {
    let future = Future::new();
    let canceller = future.clone();

    let cancelled = runtime.submit(move || {
        sleep(delay);
        canceller.cancel()
    });

    cancelled.on_complete(
        |took_effect| {
            if took_effect {
                log::info!("cancellation: future cancelled");
            } else {
                log::warn!("cancellation: future already done, cancel had no effect");
            }
        },
        |e| log::warn!("cancellation: canceller job did not run: {}", e),
    );

    future
}

// The computation is handed to the runtime directly, with a chained
// continuation on a second computation.
fn encapsulated(runtime: &Runtime, delay: Duration) -> Future<Pair> {
    let greeting = runtime.submit(move || {
        sleep(delay);
        "Hello".to_string()
    });

    greeting.on_complete(
        |s| println!("Computation returned: {}", s),
        |e| println!("Computation failed: {}", e),
    );

    runtime.submit(move || {
        sleep(delay);
        Pair::new("key", "value")
    })
}

fn respond<T: fmt::Display>(name: &str, res: FutureResult<T>) {
    let (status, body) = match res {
        Ok(val) => (200, val.to_string()),
        Err(e) => (status_of(&e), e.to_string()),
    };

    println!("[{}] {} {}", name, status, body);
}

fn status_of(err: &FutureError) -> u16 {
    match *err {
        FutureError::Execution(..) | FutureError::IllegalState(..) => 500,
        FutureError::Cancelled => 409,
        FutureError::Shutdown => 503,
        FutureError::Timeout(..) => 504,
    }
}
