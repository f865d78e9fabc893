//! Spawn engine
//!
//! Turns a command line into a monitored child process and reports every
//! outcome, including refusals and setup failures, through the delegate and
//! the completion continuation exactly once.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::attributes::{ProcessAttributes, ProcessHandle};
use crate::completion::Reaper;
use crate::delegate::{ProcessDelegate, ProcessResult};
use crate::environment::{Environment, CONTROL_FD_ENV, TASK_ID_ENV};
use crate::error::{Channel, ProcessError};
use crate::group::{ProcessGroup, ProcessInfo};
use crate::monitor;
use crate::qos;
use crate::release::{CompletionFn, ReleaseFn};
use crate::sys::{Platform, ProcessBackend, SpawnPlan};

enum Outcome<T> {
    Running(T),
    Cancelled,
    Failed(std::io::Error),
}

/// Run `command_line` as a new child process
///
/// Blocks the calling thread until the child's output reaches EOF and the
/// child has been reaped, or until the child completes the release
/// handshake, in which case the remaining work is handed to `on_release`.
///
/// `delegate.process_started` is always called first; `process_finished`
/// and then `on_completion` are always called exactly once, whether or not a
/// process was created.
#[allow(clippy::too_many_arguments)]
pub fn spawn_process<C, D, S>(
    delegate: Arc<D>,
    context: C,
    group: Arc<ProcessGroup>,
    handle: ProcessHandle,
    command_line: &[S],
    mut environment: Environment,
    attributes: ProcessAttributes,
    on_release: ReleaseFn,
    on_completion: CompletionFn,
) where
    C: Send + Sync + 'static,
    D: ProcessDelegate<C> + ?Sized + 'static,
    S: AsRef<OsStr>,
{
    delegate.process_started(&context, handle);

    let Some((program, args)) = command_line.split_first() else {
        return abandon(
            &*delegate,
            &context,
            handle,
            Some(ProcessError::EmptyCommandLine),
            ProcessResult::failed(),
            on_completion,
        );
    };
    let program = program.as_ref();
    let args: Vec<&OsStr> = args.iter().map(AsRef::as_ref).collect();

    let control_pipe = if attributes.control_enabled {
        if !Platform::SUPPORTS_CONTROL {
            return abandon(
                &*delegate,
                &context,
                handle,
                Some(ProcessError::Unsupported(
                    "control channel is not available on this platform".to_string(),
                )),
                ProcessResult::failed(),
                on_completion,
            );
        }
        match Platform::create_pipe() {
            Ok(pipe) => Some(pipe),
            Err(source) => {
                return abandon(
                    &*delegate,
                    &context,
                    handle,
                    Some(ProcessError::PipeCreation {
                        channel: Channel::Control,
                        source,
                    }),
                    ProcessResult::failed(),
                    on_completion,
                );
            }
        }
    } else {
        None
    };

    let (output_read, output_write) = match Platform::create_pipe() {
        Ok(pipe) => pipe,
        Err(source) => {
            return abandon(
                &*delegate,
                &context,
                handle,
                Some(ProcessError::PipeCreation {
                    channel: Channel::Output,
                    source,
                }),
                ProcessResult::failed(),
                on_completion,
            );
        }
    };

    environment.set_if_missing(TASK_ID_ENV, handle.task_id());
    if let Some((_, write)) = &control_pipe {
        environment.set_if_missing(CONTROL_FD_ENV, Platform::descriptor_label(write));
    }

    let executable = resolve_executable(program);
    let quality_of_service = qos::effective_quality_of_service(attributes.quality_of_service);
    let (control_read, control_write) = control_pipe.unzip();

    debug!(
        handle = %handle,
        command = %executable.display(),
        qos = %quality_of_service,
        control = control_read.is_some(),
        "Spawning process"
    );

    let outcome = {
        let mut guard = group.lock();
        if guard.is_closed() {
            Outcome::Cancelled
        } else {
            let plan = SpawnPlan {
                program: executable.as_os_str(),
                args: &args,
                environment: &environment,
                working_dir: attributes.working_dir.as_deref(),
                output: &output_write,
                control: control_write.as_ref(),
                quality_of_service,
            };
            match Platform::spawn(plan) {
                Ok(child) => {
                    let pid = Platform::pid(&child);
                    guard.add(
                        pid,
                        ProcessInfo {
                            can_safely_interrupt: attributes.can_safely_interrupt,
                        },
                    );
                    Outcome::Running((child, pid))
                }
                Err(e) => Outcome::Failed(e),
            }
        }
    };

    // Only the child may hold the write ends, or EOF never arrives.
    drop(control_write);
    drop(output_write);

    match outcome {
        Outcome::Cancelled => {
            debug!(handle = %handle, "Process group closed, not spawning");
            abandon(
                &*delegate,
                &context,
                handle,
                None,
                ProcessResult::cancelled(),
                on_completion,
            );
        }
        Outcome::Failed(source) => abandon(
            &*delegate,
            &context,
            handle,
            Some(ProcessError::Spawn {
                program: program.to_string_lossy().into_owned(),
                source,
            }),
            ProcessResult::failed(),
            on_completion,
        ),
        Outcome::Running((child, pid)) => {
            info!(pid = %pid, handle = %handle, command = %executable.display(), "Process spawned");
            let reaper = Reaper {
                delegate,
                context,
                group,
                handle,
                child,
                pid,
                control: control_read,
                on_completion,
            };
            monitor::run(
                reaper,
                output_read,
                attributes.control_message_limit,
                on_release,
            );
        }
    }
}

/// Finish a spawn that never produced a running process
fn abandon<C, D>(
    delegate: &D,
    context: &C,
    handle: ProcessHandle,
    error: Option<ProcessError>,
    result: ProcessResult,
    on_completion: CompletionFn,
) where
    D: ProcessDelegate<C> + ?Sized,
{
    if let Some(error) = error {
        debug!(handle = %handle, error = %error, "Process not started");
        delegate.process_had_error(context, handle, &error);
    }
    delegate.process_finished(context, handle, &result);
    on_completion(result);
}

/// Look a bare program name up on `PATH`, keeping the token if that fails
///
/// Tokens with a directory part (`./tool`, `bin/cc`) are left for the child
/// to resolve against its own working directory.
fn resolve_executable(program: &OsStr) -> PathBuf {
    let path = Path::new(program);
    let has_directory = path
        .parent()
        .is_some_and(|parent| !parent.as_os_str().is_empty());
    if path.is_absolute() || has_directory {
        return path.to_path_buf();
    }
    which::which(program).unwrap_or_else(|_| path.to_path_buf())
}
