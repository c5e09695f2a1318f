//! Worker pool lifecycle.
//!
//! Reserves worker identities and tracks whether the pool is running.
//! Dispatching work onto workers belongs to the data-plane collaborator.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::status::{LbError, LbResult};

/// Identity of one worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(usize);

impl WorkerId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Number of online processors, or 1 if it cannot be determined.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Bounded set of worker identities with a running flag.
#[derive(Debug, Default)]
pub struct WorkerPool {
    workers: Vec<WorkerId>,
    running: AtomicBool,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `count` workers and mark the pool running.
    pub fn start(&mut self, count: usize) -> LbResult<()> {
        if count == 0 {
            return Err(LbError::InvalidArgument("worker count is 0"));
        }
        if self.is_running() {
            return Err(LbError::InvalidState("worker pool already running"));
        }

        let mut workers = Vec::new();
        workers.try_reserve_exact(count)?;
        workers.extend((0..count).map(WorkerId));
        self.workers = workers;
        self.running.store(true, Ordering::Release);

        tracing::debug!(target: "pool", workers = count, "Worker pool started");
        Ok(())
    }

    /// Mark the pool stopped and release worker identities.
    ///
    /// Safe on a pool that never started, and safe to repeat.
    pub fn stop(&mut self) {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        // No worker threads are spawned, so there is nothing to join.
        self.workers = Vec::new();
        if was_running {
            tracing::debug!(target: "pool", "Worker pool stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of reserved workers (0 when stopped).
    pub fn count(&self) -> usize {
        self.workers.len()
    }

    pub fn workers(&self) -> &[WorkerId] {
        &self.workers
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}
