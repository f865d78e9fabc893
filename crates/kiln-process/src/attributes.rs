//! Per-spawn process attributes

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::control::DEFAULT_MAX_MESSAGE_LENGTH;
use crate::qos::QualityOfService;

/// Caller-assigned token identifying a logical task
///
/// Unrelated to the OS process id; it only correlates delegate callbacks and
/// seeds the task id exported to the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessHandle(pub u64);

impl ProcessHandle {
    /// Task id exported to the child and expected as its control id
    pub fn task_id(&self) -> String {
        format!("{:x}", self.0)
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl From<u64> for ProcessHandle {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Attributes for spawning a process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessAttributes {
    /// Whether an interrupt signal may be forwarded to this process
    pub can_safely_interrupt: bool,
    /// Whether to create a control channel for the release handshake
    pub control_enabled: bool,
    /// Working directory (None = inherit)
    pub working_dir: Option<PathBuf>,
    /// Scheduling class (None = thread override or process default)
    pub quality_of_service: Option<QualityOfService>,
    /// Bound on a single control message line
    pub control_message_limit: usize,
}

impl Default for ProcessAttributes {
    fn default() -> Self {
        Self {
            can_safely_interrupt: true,
            control_enabled: true,
            working_dir: None,
            quality_of_service: None,
            control_message_limit: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

impl ProcessAttributes {
    /// Create attributes with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark whether interrupts may be forwarded
    pub fn with_safe_interrupt(mut self, can_safely_interrupt: bool) -> Self {
        self.can_safely_interrupt = can_safely_interrupt;
        self
    }

    /// Enable/disable the control channel
    pub fn with_control(mut self, enabled: bool) -> Self {
        self.control_enabled = enabled;
        self
    }

    /// Set working directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set scheduling class
    pub fn with_quality_of_service(mut self, level: QualityOfService) -> Self {
        self.quality_of_service = Some(level);
        self
    }

    /// Set control message bound
    pub fn with_control_message_limit(mut self, limit: usize) -> Self {
        self.control_message_limit = limit;
        self
    }
}
