//! POSIX backend: fork/exec through `std::process::Command`, `poll(2)`,
//! `killpg(2)` and `wait4(2)`.

use std::fs::File;
use std::io;
use std::mem;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::ptr;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{killpg, Signal as NixSignal};
use nix::unistd::Pid;

use super::{ExitInfo, ProcessBackend, SpawnPlan, Termination};
use crate::group::Signal;
use crate::qos::QualityOfService;

pub(crate) type ReadEnd = File;
pub(crate) type WriteEnd = OwnedFd;

/// Highest signal number reset to its default disposition in the child.
/// Linux refuses changes to the realtime signals glibc reserves.
#[cfg(target_os = "linux")]
const SIGNAL_RESET_LIMIT: libc::c_int = libc::SIGSYS;
#[cfg(not(target_os = "linux"))]
const SIGNAL_RESET_LIMIT: libc::c_int = 31;

/// `ru_maxrss` is reported in kilobytes everywhere but Darwin.
#[cfg(target_vendor = "apple")]
const MAX_RSS_UNIT: u64 = 1;
#[cfg(not(target_vendor = "apple"))]
const MAX_RSS_UNIT: u64 = 1024;

impl From<Signal> for NixSignal {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Interrupt => NixSignal::SIGINT,
            Signal::Terminate => NixSignal::SIGTERM,
            Signal::Kill => NixSignal::SIGKILL,
            Signal::Hangup => NixSignal::SIGHUP,
            Signal::Quit => NixSignal::SIGQUIT,
            Signal::User1 => NixSignal::SIGUSR1,
            Signal::User2 => NixSignal::SIGUSR2,
        }
    }
}

/// A created child; reaped exactly once by `wait_with_usage`
#[derive(Debug)]
pub(crate) struct UnixChild {
    pid: Pid,
}

pub(crate) struct UnixBackend;

impl ProcessBackend for UnixBackend {
    type Child = UnixChild;

    const SUPPORTS_CONTROL: bool = true;

    fn create_pipe() -> io::Result<(ReadEnd, WriteEnd)> {
        let (read, write) = cloexec_pipe()?;
        Ok((File::from(read), write))
    }

    fn descriptor_label(end: &WriteEnd) -> String {
        end.as_raw_fd().to_string()
    }

    fn spawn(plan: SpawnPlan<'_>) -> io::Result<UnixChild> {
        let mut command = Command::new(plan.program);
        command
            .args(plan.args)
            .env_clear()
            .envs(plan.environment.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::from(plan.output.try_clone()?))
            .stderr(Stdio::from(plan.output.try_clone()?))
            .process_group(0);

        if let Some(dir) = plan.working_dir {
            command.current_dir(dir);
        }

        let control_fd = plan.control.map(AsRawFd::as_raw_fd);
        let quality_of_service = plan.quality_of_service;
        // SAFETY: the hook runs between fork and exec and only makes
        // async-signal-safe libc calls without allocating.
        unsafe {
            command.pre_exec(move || prepare_child(control_fd, quality_of_service));
        }

        // Dropping `command` closes its copies of the output write end.
        let child = command.spawn()?;
        Ok(UnixChild {
            pid: Pid::from_raw(child.id() as libc::pid_t),
        })
    }

    fn pid(child: &UnixChild) -> u32 {
        child.pid.as_raw() as u32
    }

    fn signal_group(pid: u32, signal: Signal) -> io::Result<()> {
        killpg(Pid::from_raw(pid as libc::pid_t), NixSignal::from(signal)).map_err(io::Error::from)
    }

    fn wait_with_usage(child: &mut UnixChild) -> io::Result<ExitInfo> {
        let mut status: libc::c_int = 0;
        // SAFETY: rusage is plain data; zero is a valid bit pattern.
        let mut usage: libc::rusage = unsafe { mem::zeroed() };

        loop {
            // SAFETY: both out-pointers reference live locals.
            let rc = unsafe { libc::wait4(child.pid.as_raw(), &mut status, 0, &mut usage) };
            if rc != -1 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        let termination = if libc::WIFSIGNALED(status) {
            Termination::Signaled(libc::WTERMSIG(status))
        } else {
            Termination::Exited(libc::WEXITSTATUS(status))
        };

        Ok(ExitInfo {
            termination,
            utime_micros: timeval_micros(&usage.ru_utime),
            stime_micros: timeval_micros(&usage.ru_stime),
            max_rss_bytes: (usage.ru_maxrss.max(0) as u64) * MAX_RSS_UNIT,
        })
    }

    fn poll_readable(
        control: Option<&ReadEnd>,
        output: Option<&ReadEnd>,
    ) -> io::Result<(bool, bool)> {
        let mut fds = Vec::with_capacity(2);
        if let Some(file) = control {
            fds.push(PollFd::new(file.as_fd(), PollFlags::POLLIN));
        }
        if let Some(file) = output {
            fds.push(PollFd::new(file.as_fd(), PollFlags::POLLIN));
        }
        if fds.is_empty() {
            return Ok((false, false));
        }

        loop {
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(io::Error::from(errno)),
            }
        }

        let readable = |fd: &PollFd<'_>| {
            fd.revents().map_or(false, |events| {
                events.intersects(
                    PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL,
                )
            })
        };
        let mut ready = fds.iter();
        let control_ready = control.is_some() && ready.next().map_or(false, readable);
        let output_ready = output.is_some() && ready.next().map_or(false, readable);
        Ok((control_ready, output_ready))
    }

    fn is_cancellation_signal(signal: i32) -> bool {
        signal == libc::SIGINT || signal == libc::SIGKILL
    }

    fn apply_thread_quality_of_service(level: QualityOfService) {
        apply_thread_qos(level);
    }
}

#[cfg(not(target_vendor = "apple"))]
fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::OFlag;

    Ok(nix::unistd::pipe2(OFlag::O_CLOEXEC)?)
}

#[cfg(target_vendor = "apple")]
fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};

    let (read, write) = nix::unistd::pipe()?;
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read, write))
}

fn timeval_micros(tv: &libc::timeval) -> u64 {
    (tv.tv_sec.max(0) as u64) * 1_000_000 + (tv.tv_usec.max(0) as u64)
}

/// Child-side setup between fork and exec
fn prepare_child(control_fd: Option<RawFd>, quality_of_service: QualityOfService) -> io::Result<()> {
    // SAFETY: these calls only touch the child's own signal state.
    unsafe {
        let mut empty: libc::sigset_t = mem::zeroed();
        libc::sigemptyset(&mut empty);
        libc::pthread_sigmask(libc::SIG_SETMASK, &empty, ptr::null_mut());

        for signo in 1..=SIGNAL_RESET_LIMIT {
            if signo == libc::SIGKILL || signo == libc::SIGSTOP {
                continue;
            }
            libc::signal(signo, libc::SIG_DFL);
        }
    }

    mark_descriptors_cloexec();

    if let Some(fd) = control_fd {
        // SAFETY: fork duplicated the parent's descriptor table, so `fd` is
        // open here.
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            if flags == -1 || libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) == -1 {
                return Err(io::Error::last_os_error());
            }
        }
    }

    apply_child_quality_of_service(quality_of_service);
    Ok(())
}

/// Keep descriptors leaked by other threads' pipes out of the child.
#[cfg(target_os = "linux")]
fn mark_descriptors_cloexec() {
    const CLOSE_RANGE_CLOEXEC: libc::c_uint = 1 << 2;
    // SAFETY: only flips descriptor flags. Kernels without close_range
    // return ENOSYS and leave everything as it was.
    unsafe {
        libc::syscall(
            libc::SYS_close_range,
            3 as libc::c_uint,
            libc::c_uint::MAX,
            CLOSE_RANGE_CLOEXEC,
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn mark_descriptors_cloexec() {}

#[cfg(target_os = "linux")]
fn apply_child_quality_of_service(level: QualityOfService) {
    let nice = match level {
        QualityOfService::Normal | QualityOfService::UserInitiated => return,
        QualityOfService::Utility => 5,
        QualityOfService::Background => 10,
    };
    // SAFETY: affects only the calling (child) process.
    unsafe {
        libc::setpriority(libc::PRIO_PROCESS, 0, nice);
    }
}

#[cfg(target_vendor = "apple")]
fn apply_child_quality_of_service(level: QualityOfService) {
    apply_thread_qos(level);
}

/// Move the calling thread into a Darwin QoS class
#[cfg(target_vendor = "apple")]
fn apply_thread_qos(level: QualityOfService) {
    // SAFETY: affects only the calling thread.
    unsafe {
        libc::pthread_set_qos_class_self_np(darwin_qos_class(level), 0);
    }
}

#[cfg(not(target_vendor = "apple"))]
fn apply_thread_qos(_level: QualityOfService) {}

#[cfg(not(any(target_os = "linux", target_vendor = "apple")))]
fn apply_child_quality_of_service(_level: QualityOfService) {}

#[cfg(target_vendor = "apple")]
fn darwin_qos_class(level: QualityOfService) -> libc::qos_class_t {
    match level {
        QualityOfService::Normal => libc::qos_class_t::QOS_CLASS_DEFAULT,
        QualityOfService::UserInitiated => libc::qos_class_t::QOS_CLASS_USER_INITIATED,
        QualityOfService::Utility => libc::qos_class_t::QOS_CLASS_UTILITY,
        QualityOfService::Background => libc::qos_class_t::QOS_CLASS_BACKGROUND,
    }
}
