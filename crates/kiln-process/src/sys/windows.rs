//! Windows backend
//!
//! Children get their own console process group and a shared anonymous pipe
//! for stdout and stderr. There is no control channel and no resource usage
//! accounting; group signals are delivered by terminating the process tree.

use std::io::{self, PipeReader, PipeWriter};
use std::os::windows::process::CommandExt;
use std::process::{Child, Command, Stdio};

use tracing::debug;

use super::{ExitInfo, ProcessBackend, SpawnPlan, Termination};
use crate::group::Signal;
use crate::qos::QualityOfService;

pub(crate) type ReadEnd = PipeReader;
pub(crate) type WriteEnd = PipeWriter;

const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

pub(crate) struct WindowsBackend;

impl ProcessBackend for WindowsBackend {
    type Child = Child;

    const SUPPORTS_CONTROL: bool = false;

    fn create_pipe() -> io::Result<(ReadEnd, WriteEnd)> {
        io::pipe()
    }

    fn descriptor_label(_end: &WriteEnd) -> String {
        String::new()
    }

    fn spawn(plan: SpawnPlan<'_>) -> io::Result<Child> {
        let mut command = Command::new(plan.program);
        command
            .args(plan.args)
            .env_clear()
            .envs(plan.environment.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::from(plan.output.try_clone()?))
            .stderr(Stdio::from(plan.output.try_clone()?))
            .creation_flags(CREATE_NEW_PROCESS_GROUP);

        if let Some(dir) = plan.working_dir {
            command.current_dir(dir);
        }

        command.spawn()
    }

    fn pid(child: &Child) -> u32 {
        child.id()
    }

    fn signal_group(pid: u32, signal: Signal) -> io::Result<()> {
        debug!(pid = %pid, signal = %signal, "Terminating process tree");
        let status = Command::new("taskkill")
            .args(["/pid", &pid.to_string(), "/t", "/f"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("taskkill exited with {}", status),
            ))
        }
    }

    fn wait_with_usage(child: &mut Child) -> io::Result<ExitInfo> {
        let status = child.wait()?;
        Ok(ExitInfo {
            termination: Termination::Exited(status.code().unwrap_or(-1)),
            utime_micros: 0,
            stime_micros: 0,
            max_rss_bytes: 0,
        })
    }

    fn poll_readable(
        _control: Option<&ReadEnd>,
        output: Option<&ReadEnd>,
    ) -> io::Result<(bool, bool)> {
        // Anonymous pipes cannot be polled; the output read blocks instead.
        Ok((false, output.is_some()))
    }

    fn is_cancellation_signal(_signal: i32) -> bool {
        false
    }

    fn apply_thread_quality_of_service(_level: QualityOfService) {}
}
