//! Error types for process execution

use std::fmt;
use std::io;

use thiserror::Error;

use crate::control::ControlFault;

/// The two byte streams a running process is monitored on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Side channel carrying the release handshake
    Control,
    /// Captured stdout and stderr
    Output,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Control => f.write_str("control"),
            Channel::Output => f.write_str("output"),
        }
    }
}

/// Process execution errors
///
/// These are reported through [`ProcessDelegate::process_had_error`]; none of
/// them unwind out of [`spawn_process`].
///
/// [`ProcessDelegate::process_had_error`]: crate::ProcessDelegate::process_had_error
/// [`spawn_process`]: crate::spawn_process
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The command line had no program to run
    #[error("no arguments for command")]
    EmptyCommandLine,

    /// A pipe could not be created
    #[error("unable to open {channel} pipe ({source})")]
    PipeCreation {
        channel: Channel,
        #[source]
        source: io::Error,
    },

    /// The OS refused to create the process
    #[error("unable to spawn process '{program}' ({source})")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Reading one of the process channels failed
    #[error("unable to read process {channel} ({source})")]
    Read {
        channel: Channel,
        #[source]
        source: io::Error,
    },

    /// The child violated the control protocol
    #[error("control protocol error: {0}")]
    ControlProtocol(#[from] ControlFault),

    /// Waiting for the process to exit failed
    #[error("unable to wait for process ({0})")]
    Wait(#[source] io::Error),

    /// Waiting for channel readiness failed
    #[error("failed to poll ({0})")]
    Poll(#[source] io::Error),

    /// The platform cannot honour a requested attribute
    #[error("unsupported on this platform: {0}")]
    Unsupported(String),

    /// Invalid engine configuration
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

impl ProcessError {
    /// Channel the error relates to, if any
    pub fn channel(&self) -> Option<Channel> {
        match self {
            ProcessError::PipeCreation { channel, .. } | ProcessError::Read { channel, .. } => {
                Some(*channel)
            }
            ProcessError::ControlProtocol(_) => Some(Channel::Control),
            _ => None,
        }
    }
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;
