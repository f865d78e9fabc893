//! Caller notifications and the final result of a spawn

use serde::{Deserialize, Serialize};

use crate::attributes::ProcessHandle;
use crate::error::ProcessError;

/// Outcome category of a spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Exited with status 0
    Succeeded,
    /// Failed to start, exited non-zero or died from a signal other than
    /// interrupt or kill
    Failed,
    /// Never started because the group was closed, or interrupted/killed
    Cancelled,
}

/// Final report for one spawn, produced exactly once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub status: ProcessStatus,
    /// Exit status, `128 + signo` after a signal death, `-1` if nothing ran
    pub exit_code: i32,
    pub pid: Option<u32>,
    /// User CPU time; always 0 on Windows
    pub utime_micros: u64,
    /// System CPU time; always 0 on Windows
    pub stime_micros: u64,
    /// Peak resident set size; always 0 on Windows
    pub max_rss_bytes: u64,
    /// Terminating signal number, if any
    pub signal: Option<i32>,
}

impl ProcessResult {
    fn without_process(status: ProcessStatus) -> Self {
        Self {
            status,
            exit_code: -1,
            pid: None,
            utime_micros: 0,
            stime_micros: 0,
            max_rss_bytes: 0,
            signal: None,
        }
    }

    /// Result for a spawn that failed before or instead of running
    pub fn failed() -> Self {
        Self::without_process(ProcessStatus::Failed)
    }

    /// Result for a spawn refused by a closed group
    pub fn cancelled() -> Self {
        Self::without_process(ProcessStatus::Cancelled)
    }

    pub fn is_success(&self) -> bool {
        self.status == ProcessStatus::Succeeded
    }
}

/// Receives progress for spawned processes
///
/// Calls for one handle arrive in order: `process_started`, any number of
/// `process_had_output` / `process_had_error`, then exactly one
/// `process_finished`. Calls for different handles may interleave across
/// threads.
pub trait ProcessDelegate<C>: Send + Sync {
    fn process_started(&self, context: &C, handle: ProcessHandle);

    /// A chunk of combined stdout and stderr
    fn process_had_output(&self, context: &C, handle: ProcessHandle, data: &[u8]);

    fn process_had_error(&self, context: &C, handle: ProcessHandle, error: &ProcessError);

    fn process_finished(&self, context: &C, handle: ProcessHandle, result: &ProcessResult);
}
