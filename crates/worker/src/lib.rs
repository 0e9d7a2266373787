//! `postforge-worker` — timer-triggered background workers.
//!
//! Each periodic component (scan, digest, purge, integrity check) runs as
//! one worker thread: fire the task, sleep the interval, repeat. Tasks are
//! effectively single-threaded batches; a task error is logged, never fatal
//! to the loop.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Fixed-interval periodic worker.
#[derive(Debug)]
pub struct PeriodicWorker;

impl PeriodicWorker {
    /// Spawn a worker thread that runs `task` once per `interval`.
    ///
    /// The next tick is scheduled from the end of the previous run, so a
    /// slow run delays rather than overlaps the next one. Shutdown is
    /// checked between sleeps and honored promptly.
    pub fn spawn<F, E>(name: &'static str, interval: Duration, mut task: F) -> WorkerHandle
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, interval, shutdown_rx, &mut task))
            .expect("failed to spawn periodic worker thread");

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

fn worker_loop<F, E>(
    name: &'static str,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
    task: &mut F,
) where
    F: FnMut() -> Result<(), E>,
    E: core::fmt::Debug,
{
    info!(worker = name, interval_secs = interval.as_secs(), "worker started");

    loop {
        let started = Instant::now();
        if let Err(err) = task() {
            warn!(worker = name, error = ?err, "worker task failed");
        } else {
            debug!(
                worker = name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "worker task completed"
            );
        }

        // Sleep in short slices so shutdown is honored promptly.
        let slice = Duration::from_millis(50);
        let mut slept = Duration::ZERO;
        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!(worker = name, "worker stopped");
                return;
            }
            if slept >= interval {
                break;
            }
            let remaining = (interval - slept).min(slice);
            thread::sleep(remaining);
            slept += remaining;
        }
    }
}
