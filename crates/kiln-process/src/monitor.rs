//! I/O loop for a running process
//!
//! Multiplexes the output channel and, when enabled, the control channel
//! until both reach EOF or the child asks to be released.

use std::io::{self, Read};

use tracing::debug;

use crate::control::{ControlProtocolState, ControlStatus};
use crate::completion::Reaper;
use crate::delegate::ProcessDelegate;
use crate::error::{Channel, ProcessError};
use crate::release::{DeferredReap, ReleaseFn};
use crate::sys::{Platform, ProcessBackend, ReadEnd};

const READ_BUFFER_SIZE: usize = 4096;

/// Drive a spawned process to completion or release
///
/// The control read end, if any, travels inside `reaper` so it stays open
/// until the wait returns.
pub(crate) fn run<C, D>(
    mut reaper: Reaper<C, D>,
    output: ReadEnd,
    max_message_length: usize,
    on_release: ReleaseFn,
) where
    C: Send + 'static,
    D: ProcessDelegate<C> + ?Sized + 'static,
{
    let mut output = Some(output);
    let mut control_active = reaper.control.is_some();
    let mut parser =
        ControlProtocolState::with_max_length(reaper.handle.task_id(), max_message_length);
    let mut buf = [0u8; READ_BUFFER_SIZE];

    while output.is_some() || control_active {
        let control = if control_active {
            reaper.control.as_ref()
        } else {
            None
        };

        let (control_ready, output_ready) =
            match Platform::poll_readable(control, output.as_ref()) {
                Ok(ready) => ready,
                Err(e) => {
                    reaper.report(ProcessError::Poll(e));
                    // Nobody drains the pipe from here on; closing it keeps
                    // the child from blocking on a full buffer.
                    output = None;
                    break;
                }
            };

        if control_ready {
            if let Some(file) = reaper.control.as_mut() {
                match read_retrying(file, &mut buf) {
                    Ok(0) => {
                        debug!(pid = %reaper.pid, "Control channel closed");
                        control_active = false;
                    }
                    Ok(n) => match parser.read(&buf[..n]) {
                        ControlStatus::Continue => {}
                        ControlStatus::Completed => control_active = false,
                        ControlStatus::Fault(fault) => {
                            reaper.report(fault.into());
                            control_active = false;
                        }
                    },
                    Err(source) => {
                        reaper.report(ProcessError::Read {
                            channel: Channel::Control,
                            source,
                        });
                        control_active = false;
                    }
                }
            }
        }

        if parser.should_release() {
            release(reaper, output, on_release);
            return;
        }

        if output_ready {
            if let Some(file) = output.as_mut() {
                match read_retrying(file, &mut buf) {
                    Ok(0) => {
                        debug!(pid = %reaper.pid, "Output channel closed");
                        output = None;
                    }
                    Ok(n) => reaper.report_output(&buf[..n]),
                    Err(source) => {
                        reaper.report(ProcessError::Read {
                            channel: Channel::Output,
                            source,
                        });
                        output = None;
                    }
                }
            }
        }
    }

    drop(output);
    reaper.reap();
}

/// Hand the rest of the process's lifetime to the caller's executor
fn release<C, D>(reaper: Reaper<C, D>, output: Option<ReadEnd>, on_release: ReleaseFn)
where
    C: Send + 'static,
    D: ProcessDelegate<C> + ?Sized + 'static,
{
    let (pid, handle) = (reaper.pid, reaper.handle);
    debug!(pid = %pid, handle = %handle, "Process released");

    let deferred = DeferredReap::new(pid, handle, move || {
        if let Some(mut file) = output {
            drain(&reaper, &mut file);
        }
        reaper.reap();
    });
    on_release(deferred);
}

/// Forward output until EOF or the first read error
fn drain<C, D>(reaper: &Reaper<C, D>, output: &mut ReadEnd)
where
    D: ProcessDelegate<C> + ?Sized,
{
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match read_retrying(output, &mut buf) {
            Ok(0) => break,
            Ok(n) => reaper.report_output(&buf[..n]),
            Err(source) => {
                reaper.report(ProcessError::Read {
                    channel: Channel::Output,
                    source,
                });
                break;
            }
        }
    }
}

fn read_retrying<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
