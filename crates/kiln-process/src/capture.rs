//! Run a command to completion and collect everything it printed

use std::borrow::Cow;
use std::ffi::OsStr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::attributes::{ProcessAttributes, ProcessHandle};
use crate::delegate::{ProcessDelegate, ProcessResult, ProcessStatus};
use crate::environment::Environment;
use crate::error::ProcessError;
use crate::group::ProcessGroup;
use crate::release;
use crate::spawn::spawn_process;

/// Output, errors and result of a captured run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRun {
    /// Combined stdout and stderr
    pub output: Vec<u8>,
    /// Rendered messages of every reported error
    pub errors: Vec<String>,
    pub result: ProcessResult,
}

impl CapturedRun {
    /// Whether the command ran and exited with status 0
    pub fn succeeded(&self) -> bool {
        self.result.status == ProcessStatus::Succeeded && self.result.exit_code == 0
    }

    pub fn output_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }
}

#[derive(Default)]
struct CapturingDelegate {
    output: Mutex<Vec<u8>>,
    errors: Mutex<Vec<String>>,
}

impl ProcessDelegate<()> for CapturingDelegate {
    fn process_started(&self, _: &(), _: ProcessHandle) {}

    fn process_had_output(&self, _: &(), _: ProcessHandle, data: &[u8]) {
        self.output.lock().extend_from_slice(data);
    }

    fn process_had_error(&self, _: &(), _: ProcessHandle, error: &ProcessError) {
        self.errors.lock().push(error.to_string());
    }

    fn process_finished(&self, _: &(), _: ProcessHandle, _: &ProcessResult) {}
}

/// Run `command_line` and block until it has exited
///
/// A release request is honoured inline, so the call still returns only
/// after the child is reaped.
pub fn run_captured<S: AsRef<OsStr>>(
    group: &Arc<ProcessGroup>,
    command_line: &[S],
    environment: Environment,
    attributes: ProcessAttributes,
) -> CapturedRun {
    let delegate = Arc::new(CapturingDelegate::default());
    let slot = Arc::new(Mutex::new(None));
    let completed = Arc::clone(&slot);

    spawn_process(
        Arc::clone(&delegate),
        (),
        Arc::clone(group),
        ProcessHandle(0),
        command_line,
        environment,
        attributes,
        release::inline(),
        Box::new(move |result| {
            *completed.lock() = Some(result);
        }),
    );

    let result = slot.lock().take().unwrap_or_else(ProcessResult::failed);
    let output = std::mem::take(&mut *delegate.output.lock());
    let errors = std::mem::take(&mut *delegate.errors.lock());
    CapturedRun {
        output,
        errors,
        result,
    }
}
