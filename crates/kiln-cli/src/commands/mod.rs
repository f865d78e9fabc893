// Command handlers for the kiln CLI

pub mod capture;
pub mod config;
pub mod run;

pub use capture::CaptureCommand;
pub use config::ConfigCommand;
pub use run::RunCommand;

use kiln_process::{ProcessResult, ProcessStatus};

use crate::error::CliResult;

/// Exit code reported for a cancelled command, as a shell does for SIGINT
pub const CANCELLED_EXIT_CODE: i32 = 130;

/// Trait for command handlers
pub trait Command {
    /// Execute the command, returning the process exit code
    fn execute(&self) -> CliResult<i32>;
}

/// Map an engine result to the exit code of `kiln` itself
pub fn exit_code_for(result: &ProcessResult) -> i32 {
    match result.status {
        ProcessStatus::Succeeded => 0,
        ProcessStatus::Cancelled => CANCELLED_EXIT_CODE,
        ProcessStatus::Failed if result.exit_code > 0 => result.exit_code,
        ProcessStatus::Failed => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let mut result = ProcessResult::failed();
        assert_eq!(exit_code_for(&result), 1);

        result.exit_code = 7;
        assert_eq!(exit_code_for(&result), 7);

        assert_eq!(
            exit_code_for(&ProcessResult::cancelled()),
            CANCELLED_EXIT_CODE
        );

        let succeeded = ProcessResult {
            status: ProcessStatus::Succeeded,
            exit_code: 0,
            pid: Some(1),
            ..ProcessResult::failed()
        };
        assert_eq!(exit_code_for(&succeeded), 0);
    }
}
