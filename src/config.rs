use std::thread;
use std::time::Duration;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of worker threads.
    pub workers: usize,
    /// Worker threads are named `<thread_name>-<index>`.
    pub thread_name: String,
    /// How long `Runtime::shutdown` waits for running jobs.
    pub shutdown_timeout: Duration,
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn workers(mut self, workers: usize) -> Config {
        self.workers = workers;
        self
    }

    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Config {
        self.thread_name = name.into();
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Config {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }

        if self.thread_name.is_empty() {
            return Err(ConfigError::EmptyThreadName);
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Config {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Config {
            workers,
            thread_name: "completable-worker".to_string(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("runtime requires at least one worker")]
    NoWorkers,

    #[error("worker thread name must not be empty")]
    EmptyThreadName,
}
