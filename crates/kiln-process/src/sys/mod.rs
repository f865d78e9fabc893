//! Platform process primitives
//!
//! Everything that differs between operating systems sits behind
//! [`ProcessBackend`]; the protocol parser, monitor loop and accounting are
//! written once against it.

use std::ffi::OsStr;
use std::io;
use std::path::Path;

use crate::environment::Environment;
use crate::group::Signal;
use crate::qos::QualityOfService;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub(crate) use unix::{ReadEnd, UnixBackend as Platform, WriteEnd};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub(crate) use windows::{ReadEnd, WindowsBackend as Platform, WriteEnd};

/// Everything needed to create one child
pub(crate) struct SpawnPlan<'a> {
    pub program: &'a OsStr,
    pub args: &'a [&'a OsStr],
    pub environment: &'a Environment,
    pub working_dir: Option<&'a Path>,
    /// Becomes the child's stdout and stderr
    pub output: &'a WriteEnd,
    /// Inherited by the child under its own descriptor number
    pub control: Option<&'a WriteEnd>,
    pub quality_of_service: QualityOfService,
}

/// How a reaped child ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Termination {
    Exited(i32),
    Signaled(i32),
}

/// Exit status plus resource usage of a reaped child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExitInfo {
    pub termination: Termination,
    pub utime_micros: u64,
    pub stime_micros: u64,
    pub max_rss_bytes: u64,
}

/// Operations the engine needs from the OS
pub(crate) trait ProcessBackend {
    /// Owned reference to a created, not yet reaped child
    type Child: Send;

    /// Whether the control channel can be offered to children
    const SUPPORTS_CONTROL: bool;

    /// Create an anonymous pipe whose ends are not inherited by default
    fn create_pipe() -> io::Result<(ReadEnd, WriteEnd)>;

    /// Value published to the child to locate an inherited write end
    fn descriptor_label(end: &WriteEnd) -> String;

    /// Create the child as the leader of a new process group
    fn spawn(plan: SpawnPlan<'_>) -> io::Result<Self::Child>;

    /// OS process id of a created child
    fn pid(child: &Self::Child) -> u32;

    /// Deliver `signal` to the process group led by `pid`
    fn signal_group(pid: u32, signal: Signal) -> io::Result<()>;

    /// Block until the child exits, collecting its resource usage
    fn wait_with_usage(child: &mut Self::Child) -> io::Result<ExitInfo>;

    /// Block until at least one open channel is readable
    ///
    /// Returns `(control_ready, output_ready)`; a closed or hung-up channel
    /// counts as readable so the following read observes EOF.
    fn poll_readable(
        control: Option<&ReadEnd>,
        output: Option<&ReadEnd>,
    ) -> io::Result<(bool, bool)>;

    /// Whether death by `signal` means the process was cancelled
    fn is_cancellation_signal(signal: i32) -> bool;

    /// Move the calling thread into `level`, where threads have a class
    fn apply_thread_quality_of_service(level: QualityOfService);
}
