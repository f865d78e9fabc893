//! Release hand-off
//!
//! When a child completes the release handshake the monitor stops blocking
//! the caller and packages the rest of the work (drain output, wait, report)
//! into a [`DeferredReap`]. The caller decides where that runs by supplying a
//! [`ReleaseFn`].

use std::fmt;
use std::thread;

use tracing::{debug, warn};

use crate::attributes::ProcessHandle;
use crate::delegate::ProcessResult;

/// Receives the deferred reap of a released process
pub type ReleaseFn = Box<dyn FnOnce(DeferredReap) + Send>;

/// Receives the final result of a spawn
pub type CompletionFn = Box<dyn FnOnce(ProcessResult) + Send>;

/// Remaining work for a released process
///
/// Owns the process, its open descriptors and the completion continuation.
/// Dropping it without calling [`run`](Self::run) reaps on the dropping
/// thread.
pub struct DeferredReap {
    pid: u32,
    handle: ProcessHandle,
    task: Option<Box<dyn FnOnce() + Send>>,
}

impl DeferredReap {
    pub(crate) fn new(pid: u32, handle: ProcessHandle, task: impl FnOnce() + Send + 'static) -> Self {
        Self {
            pid,
            handle,
            task: Some(Box::new(task)),
        }
    }

    /// OS process id of the released child
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn handle(&self) -> ProcessHandle {
        self.handle
    }

    /// Drain remaining output, wait for exit and deliver the result
    pub fn run(mut self) {
        if let Some(task) = self.task.take() {
            debug!(pid = %self.pid, handle = %self.handle, "Running deferred reap");
            task();
        }
    }
}

impl Drop for DeferredReap {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            warn!(pid = %self.pid, handle = %self.handle, "Deferred reap dropped without running, reaping now");
            task();
        }
    }
}

impl fmt::Debug for DeferredReap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredReap")
            .field("pid", &self.pid)
            .field("handle", &self.handle)
            .field("pending", &self.task.is_some())
            .finish()
    }
}

/// Reap on the releasing thread before `spawn_process` returns
pub fn inline() -> ReleaseFn {
    Box::new(DeferredReap::run)
}

/// Reap on a new named thread so `spawn_process` returns at release time
pub fn detached(name: impl Into<String>) -> ReleaseFn {
    let name = name.into();
    Box::new(move |deferred: DeferredReap| {
        let pid = deferred.pid();
        if let Err(e) = thread::Builder::new()
            .name(name)
            .spawn(move || deferred.run())
        {
            // The closure was dropped with the failed spawn, so the guard
            // already reaped on this thread.
            warn!(pid = %pid, error = %e, "Failed to start reap thread");
        }
    })
}
