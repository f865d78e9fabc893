//! # kiln-process
//!
//! **Purpose**: Process execution engine for kiln build commands
//!
//! Launches external commands, streams their combined output back to a
//! delegate, tracks every live child in a [`ProcessGroup`] for mass
//! cancellation, and lets a child release its execution slot before it exits
//! through a line-based control channel.
//!
//! ## Features
//!
//! - **Process Groups**: Each child leads its own OS process group; the
//!   registry signals all of them at once and refuses spawns once closed
//! - **Output Capture**: stdout and stderr share one pipe, delivered in chunks
//! - **Release Handshake**: `llbuild.1` control protocol over an inherited
//!   descriptor, with the rest of the reap handed to a caller executor
//! - **Resource Accounting**: Exit status, CPU time and peak RSS per child
//! - **Quality of Service**: Process default, thread override, per-spawn value
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kiln_process::{
//!     release, spawn_process, Environment, ProcessAttributes, ProcessDelegate,
//!     ProcessError, ProcessGroup, ProcessHandle, ProcessResult,
//! };
//!
//! struct Printer;
//!
//! impl ProcessDelegate<()> for Printer {
//!     fn process_started(&self, _: &(), handle: ProcessHandle) {
//!         eprintln!("started {handle}");
//!     }
//!     fn process_had_output(&self, _: &(), _: ProcessHandle, data: &[u8]) {
//!         print!("{}", String::from_utf8_lossy(data));
//!     }
//!     fn process_had_error(&self, _: &(), _: ProcessHandle, error: &ProcessError) {
//!         eprintln!("error: {error}");
//!     }
//!     fn process_finished(&self, _: &(), _: ProcessHandle, result: &ProcessResult) {
//!         eprintln!("finished: {:?}", result.status);
//!     }
//! }
//!
//! let group = Arc::new(ProcessGroup::new());
//! spawn_process(
//!     Arc::new(Printer),
//!     (),
//!     Arc::clone(&group),
//!     ProcessHandle(1),
//!     &["cc", "-c", "main.c"],
//!     Environment::inherit(),
//!     ProcessAttributes::new(),
//!     release::detached("kiln-reap"),
//!     Box::new(|result| eprintln!("exit code {}", result.exit_code)),
//! );
//! ```

pub mod attributes;
pub mod capture;
mod completion;
pub mod config;
pub mod control;
pub mod delegate;
pub mod environment;
pub mod error;
pub mod group;
pub mod limits;
mod monitor;
pub mod qos;
pub mod release;
pub mod spawn;
mod sys;

pub use attributes::{ProcessAttributes, ProcessHandle};
pub use capture::{run_captured, CapturedRun};
pub use config::EngineConfig;
pub use control::{ControlFault, ControlProtocolState, ControlStatus, CONTROL_PROTOCOL_VERSION};
pub use delegate::{ProcessDelegate, ProcessResult, ProcessStatus};
pub use environment::{Environment, CONTROL_FD_ENV, TASK_ID_ENV};
pub use error::{Channel, ProcessError, Result};
pub use group::{ProcessGroup, ProcessInfo, Signal};
pub use limits::raise_open_file_limit;
pub use qos::QualityOfService;
pub use release::{CompletionFn, DeferredReap, ReleaseFn};
pub use spawn::spawn_process;
