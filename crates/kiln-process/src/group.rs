//! Process group registry
//!
//! Tracks every live child so a cancelling actor can `close()` the group and
//! `signal_all()` without racing concurrent spawns. The spawn engine checks
//! the closed flag and registers the new pid under one lock hold, so a child
//! is either never created or visible to the next `signal_all`.

use std::collections::HashMap;
use std::fmt;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::sys::{Platform, ProcessBackend};

/// Signals that can be delivered to a whole group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// SIGINT; only delivered to processes marked safe to interrupt
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGKILL
    Kill,
    /// SIGHUP
    Hangup,
    /// SIGQUIT
    Quit,
    /// SIGUSR1
    User1,
    /// SIGUSR2
    User2,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Kill => "SIGKILL",
            Signal::Hangup => "SIGHUP",
            Signal::Quit => "SIGQUIT",
            Signal::User1 => "SIGUSR1",
            Signal::User2 => "SIGUSR2",
        };
        f.write_str(name)
    }
}

/// Metadata kept per registered process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Whether an interrupt may be forwarded to this process
    pub can_safely_interrupt: bool,
}

#[derive(Debug, Default)]
struct GroupState {
    processes: HashMap<u32, ProcessInfo>,
    closed: bool,
}

impl GroupState {
    /// Pids `signal` should reach; interrupts skip processes not safe to interrupt
    fn targets(&self, signal: Signal) -> Vec<u32> {
        self.processes
            .iter()
            .filter(|(pid, info)| {
                let skip = signal == Signal::Interrupt && !info.can_safely_interrupt;
                if skip {
                    debug!(pid = %pid, "Skipping interrupt for process not safe to interrupt");
                }
                !skip
            })
            .map(|(&pid, _)| pid)
            .collect()
    }
}

/// Thread-safe set of live child processes
///
/// Dropping the group blocks until every registered process has been
/// removed.
#[derive(Debug, Default)]
pub struct ProcessGroup {
    state: Mutex<GroupState>,
    drained: Condvar,
}

/// Exclusive access to the group for the spawn critical section
pub struct GroupGuard<'a> {
    state: MutexGuard<'a, GroupState>,
}

impl GroupGuard<'_> {
    /// Whether further spawns are refused
    pub fn is_closed(&self) -> bool {
        self.state.closed
    }

    /// Register a freshly created process
    pub fn add(&mut self, pid: u32, info: ProcessInfo) {
        if self.state.processes.insert(pid, info).is_some() {
            warn!(pid = %pid, "Process registered twice");
        }
    }
}

impl fmt::Debug for GroupGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupGuard")
            .field("closed", &self.state.closed)
            .field("processes", &self.state.processes.len())
            .finish()
    }
}

impl ProcessGroup {
    /// Create an empty, open group
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the group lock
    ///
    /// Hold it only across the closed check, process creation and
    /// registration. Never across a blocking read or wait.
    pub fn lock(&self) -> GroupGuard<'_> {
        GroupGuard {
            state: self.state.lock(),
        }
    }

    /// Forget a reaped process
    pub fn remove(&self, pid: u32) {
        let mut state = self.state.lock();
        if state.processes.remove(&pid).is_none() {
            debug!(pid = %pid, "Removing unregistered process");
        }
        if state.processes.is_empty() {
            self.drained.notify_all();
        }
    }

    /// Refuse all further spawns
    pub fn close(&self) {
        self.state.lock().closed = true;
        debug!("Process group closed");
    }

    /// Whether further spawns are refused
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of live processes
    pub fn len(&self) -> usize {
        self.state.lock().processes.len()
    }

    /// Whether no process is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `pid` is registered
    pub fn contains(&self, pid: u32) -> bool {
        self.state.lock().processes.contains_key(&pid)
    }

    /// Deliver `signal` to the process group of every registered child
    ///
    /// Interrupts skip processes not marked safe to interrupt. Returns the
    /// number of groups the signal was delivered to.
    pub fn signal_all(&self, signal: Signal) -> usize {
        let state = self.state.lock();
        let targets = state.targets(signal);

        // taskkill is itself a blocking child process; never run it under the lock.
        #[cfg(windows)]
        drop(state);

        let mut delivered = 0;
        for pid in targets {
            match Platform::signal_group(pid, signal) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(pid = %pid, signal = %signal, error = %e, "Failed to signal process group"),
            }
        }

        debug!(signal = %signal, delivered, "Signalled process group");
        delivered
    }

    /// Block until every registered process has been removed
    pub fn wait_until_empty(&self) {
        let mut state = self.state.lock();
        while !state.processes.is_empty() {
            self.drained.wait(&mut state);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.wait_until_empty();
    }
}
