//! Worker harness for integration tests.
//!
//! Runs closures on dedicated threads and reports whether they finished
//! within a wall-clock budget. A worker that stalls is abandoned, never
//! joined.

#![allow(dead_code)]

use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use rand::Rng;

/// Default budget for a single worker.
pub const WORKER_TIMEOUT: Duration = Duration::from_secs(10);

/// Budget used when a test expects the worker to stall.
pub const STALL_TIMEOUT: Duration = Duration::from_millis(200);

/// How a worker run ended.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The closure returned this value in time.
    Finished(T),
    /// The closure did not return within the budget.
    TimedOut,
}

impl<T> Outcome<T> {
    /// Returns the value, panicking on timeout.
    pub fn unwrap(self) -> T {
        match self {
            Self::Finished(value) => value,
            Self::TimedOut => panic!("worker timed out"),
        }
    }

    /// Returns `true` if the worker stalled.
    pub fn timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// A worker started with [`spawn`]; collect it with [`Worker::join`].
pub struct Worker<T> {
    receiver: crossbeam_channel::Receiver<thread::Result<T>>,
}

impl<T> Worker<T> {
    /// Waits up to `timeout` for the worker's result.
    ///
    /// A panic inside the worker is re-raised here.
    pub fn join(self, timeout: Duration) -> Outcome<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(Ok(value)) => Outcome::Finished(value),
            Ok(Err(panic)) => std::panic::resume_unwind(panic),
            Err(RecvTimeoutError::Timeout) => Outcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => panic!("worker vanished without reporting"),
        }
    }
}

/// Starts `work` on a fresh thread.
pub fn spawn<T, F>(work: F) -> Worker<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (sender, receiver) = bounded(1);
    thread::spawn(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(work));
        let _ = sender.send(result);
    });
    Worker { receiver }
}

/// Runs `work` on a fresh thread and waits up to `timeout` for it.
pub fn run_with_timeout<T, F>(timeout: Duration, work: F) -> Outcome<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    spawn(work).join(timeout)
}

/// Sleeps for a random few hundred microseconds to shake up interleavings.
pub fn jitter() {
    let micros = rand::thread_rng().gen_range(0..300);
    thread::sleep(Duration::from_micros(micros));
}

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
