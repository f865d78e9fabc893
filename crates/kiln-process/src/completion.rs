//! Waiting for exit, classifying the outcome and delivering the result

use std::sync::Arc;

use tracing::{info, warn};

use crate::attributes::ProcessHandle;
use crate::delegate::{ProcessDelegate, ProcessResult, ProcessStatus};
use crate::error::ProcessError;
use crate::group::ProcessGroup;
use crate::release::CompletionFn;
use crate::sys::{ExitInfo, Platform, ProcessBackend, ReadEnd, Termination};

/// Everything needed to finish a running process
///
/// Moves from the spawn engine to the monitor and, after a release, into the
/// deferred reap.
pub(crate) struct Reaper<C, D: ?Sized> {
    pub delegate: Arc<D>,
    pub context: C,
    pub group: Arc<ProcessGroup>,
    pub handle: ProcessHandle,
    pub child: <Platform as ProcessBackend>::Child,
    pub pid: u32,
    /// Held open until the wait returns
    pub control: Option<ReadEnd>,
    pub on_completion: CompletionFn,
}

impl<C, D> Reaper<C, D>
where
    D: ProcessDelegate<C> + ?Sized,
{
    pub fn report(&self, error: ProcessError) {
        warn!(pid = %self.pid, handle = %self.handle, error = %error, "Process error");
        self.delegate
            .process_had_error(&self.context, self.handle, &error);
    }

    pub fn report_output(&self, data: &[u8]) {
        self.delegate
            .process_had_output(&self.context, self.handle, data);
    }

    /// Wait for exit, unregister and deliver the result
    pub fn reap(mut self) {
        let waited = Platform::wait_with_usage(&mut self.child);

        self.control.take();
        self.group.remove(self.pid);

        let result = match waited {
            Ok(exit) => classify(self.pid, &exit),
            Err(e) => {
                self.report(ProcessError::Wait(e));
                ProcessResult {
                    pid: Some(self.pid),
                    ..ProcessResult::failed()
                }
            }
        };

        info!(
            pid = %self.pid,
            handle = %self.handle,
            status = ?result.status,
            exit_code = result.exit_code,
            "Process finished"
        );

        self.delegate
            .process_finished(&self.context, self.handle, &result);
        (self.on_completion)(result);
    }
}

/// Map a reaped child's exit to a result
pub(crate) fn classify(pid: u32, exit: &ExitInfo) -> ProcessResult {
    let (status, exit_code, signal) = match exit.termination {
        Termination::Signaled(signo) if Platform::is_cancellation_signal(signo) => {
            (ProcessStatus::Cancelled, 128 + signo, Some(signo))
        }
        Termination::Signaled(signo) => (ProcessStatus::Failed, 128 + signo, Some(signo)),
        Termination::Exited(0) => (ProcessStatus::Succeeded, 0, None),
        Termination::Exited(code) => (ProcessStatus::Failed, code, None),
    };

    ProcessResult {
        status,
        exit_code,
        pid: Some(pid),
        utime_micros: exit.utime_micros,
        stime_micros: exit.stime_micros,
        max_rss_bytes: exit.max_rss_bytes,
        signal,
    }
}
