//! Control channel protocol
//!
//! A child that was spawned with a control channel may write two
//! newline-terminated lines to the descriptor named by `LLBUILD_CONTROL_FD`:
//!
//! ```text
//! llbuild.1
//! <control id>
//! ```
//!
//! The first line negotiates the protocol version. The second releases the
//! child's lane when it matches the control id handed out at spawn time (the
//! hex task id). Only one message is supported per process, so the channel is
//! finished after the second line either way.

use thiserror::Error;

/// Protocol version token expected on the first line
pub const CONTROL_PROTOCOL_VERSION: &str = "llbuild.1";

/// Default bound on a single line, terminator excluded
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 16;

/// Protocol violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlFault {
    /// First line was not the version token
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// Release message did not carry this process's control id
    #[error("bad ID")]
    BadId,

    /// A line grew past the configured maximum
    #[error("excessive message length")]
    ExcessiveLength,
}

/// Outcome of feeding bytes to the parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlStatus {
    /// Need more bytes
    Continue,
    /// Message consumed, the channel no longer needs polling
    Completed,
    /// Protocol error, the channel no longer needs polling
    Fault(ControlFault),
}

/// Incremental parser for one process's control channel
#[derive(Debug, Clone)]
pub struct ControlProtocolState {
    control_id: String,
    negotiated: bool,
    partial: Vec<u8>,
    release_seen: bool,
    outcome: Option<ControlStatus>,
    max_length: usize,
}

impl ControlProtocolState {
    /// Create a parser expecting `control_id` as the release message
    pub fn new(control_id: impl Into<String>) -> Self {
        Self::with_max_length(control_id, DEFAULT_MAX_MESSAGE_LENGTH)
    }

    /// Create a parser with a custom line bound
    pub fn with_max_length(control_id: impl Into<String>, max_length: usize) -> Self {
        Self {
            control_id: control_id.into(),
            negotiated: false,
            partial: Vec::with_capacity(max_length),
            release_seen: false,
            outcome: None,
            max_length,
        }
    }

    /// Feed the next chunk read from the channel
    ///
    /// Chunks may split lines anywhere. Once a terminal status has been
    /// returned, later calls return it again without consuming anything.
    pub fn read(&mut self, mut buf: &[u8]) -> ControlStatus {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        while !buf.is_empty() {
            let Some(nl) = buf.iter().position(|&b| b == b'\n') else {
                if self.partial.len() + buf.len() > self.max_length {
                    return self.finish(ControlStatus::Fault(ControlFault::ExcessiveLength));
                }
                self.partial.extend_from_slice(buf);
                return ControlStatus::Continue;
            };

            if self.partial.len() + nl > self.max_length {
                return self.finish(ControlStatus::Fault(ControlFault::ExcessiveLength));
            }
            self.partial.extend_from_slice(&buf[..nl]);
            let line = std::mem::take(&mut self.partial);
            buf = &buf[nl + 1..];

            if !self.negotiated {
                if line != CONTROL_PROTOCOL_VERSION.as_bytes() {
                    let seen = String::from_utf8_lossy(&line).into_owned();
                    return self.finish(ControlStatus::Fault(ControlFault::UnsupportedProtocol(
                        seen,
                    )));
                }
                self.negotiated = true;
                continue;
            }

            // Anything after the first control message is ignored.
            if line == self.control_id.as_bytes() {
                self.release_seen = true;
                return self.finish(ControlStatus::Completed);
            }
            return self.finish(ControlStatus::Fault(ControlFault::BadId));
        }

        ControlStatus::Continue
    }

    /// Whether the child asked to release its lane
    pub fn should_release(&self) -> bool {
        self.release_seen
    }

    /// Whether the parser reached a terminal status
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Whether the version handshake succeeded
    pub fn is_negotiated(&self) -> bool {
        self.negotiated
    }

    /// Control id this parser accepts
    pub fn control_id(&self) -> &str {
        &self.control_id
    }

    fn finish(&mut self, status: ControlStatus) -> ControlStatus {
        self.partial.clear();
        self.outcome = Some(status.clone());
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_in_one_chunk() {
        let mut state = ControlProtocolState::new("2a");
        assert_eq!(state.read(b"llbuild.1\n2a\n"), ControlStatus::Completed);
        assert!(state.should_release());
        assert!(state.is_finished());
    }

    #[test]
    fn test_release_across_chunks() {
        let mut state = ControlProtocolState::new("2a");
        assert_eq!(state.read(b"llbu"), ControlStatus::Continue);
        assert_eq!(state.read(b"ild.1"), ControlStatus::Continue);
        assert_eq!(state.read(b"\n"), ControlStatus::Continue);
        assert!(state.is_negotiated());
        assert_eq!(state.read(b"2"), ControlStatus::Continue);
        assert!(!state.should_release());
        assert_eq!(state.read(b"a\n"), ControlStatus::Completed);
        assert!(state.should_release());
    }

    #[test]
    fn test_wrong_version_faults() {
        let mut state = ControlProtocolState::new("2a");
        assert_eq!(
            state.read(b"llbuild.2\n2a\n"),
            ControlStatus::Fault(ControlFault::UnsupportedProtocol("llbuild.2".into()))
        );
        assert!(!state.should_release());
    }

    #[test]
    fn test_mismatched_id_is_bad_id() {
        let mut state = ControlProtocolState::new("2a");
        assert_eq!(
            state.read(b"llbuild.1\nff\n"),
            ControlStatus::Fault(ControlFault::BadId)
        );
        assert!(!state.should_release());
        assert!(state.is_finished());
    }

    #[test]
    fn test_excessive_length_without_newline() {
        let mut state = ControlProtocolState::new("2a");
        assert_eq!(state.read(&[b'x'; 16]), ControlStatus::Continue);
        assert_eq!(
            state.read(b"x"),
            ControlStatus::Fault(ControlFault::ExcessiveLength)
        );
    }

    #[test]
    fn test_excessive_length_with_newline() {
        let mut state = ControlProtocolState::new("2a");
        let mut line = vec![b'x'; 17];
        line.push(b'\n');
        assert_eq!(
            state.read(&line),
            ControlStatus::Fault(ControlFault::ExcessiveLength)
        );
    }

    #[test]
    fn test_sixteen_hex_digit_id_fits() {
        let id = format!("{:x}", u64::MAX);
        let mut state = ControlProtocolState::new(id.clone());
        let message = format!("{}\n{}\n", CONTROL_PROTOCOL_VERSION, id);
        assert_eq!(state.read(message.as_bytes()), ControlStatus::Completed);
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut state = ControlProtocolState::new("2a");
        assert_eq!(state.read(b"nope\n"), state.read(b"llbuild.1\n2a\n"));
        assert!(!state.should_release());
    }

    #[test]
    fn test_trailing_bytes_after_release_are_ignored() {
        let mut state = ControlProtocolState::new("2a");
        assert_eq!(
            state.read(b"llbuild.1\n2a\ngarbage that is way too long\n"),
            ControlStatus::Completed
        );
        assert!(state.should_release());
    }

    #[test]
    fn test_custom_max_length() {
        let mut state = ControlProtocolState::with_max_length("abc", 9);
        assert_eq!(state.read(b"llbuild.1\n"), ControlStatus::Continue);
        let mut state = ControlProtocolState::with_max_length("abc", 8);
        assert_eq!(
            state.read(b"llbuild.1\n"),
            ControlStatus::Fault(ControlFault::ExcessiveLength)
        );
    }
}
