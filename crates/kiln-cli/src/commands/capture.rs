// Run a command to completion and report what it printed

use std::io::{self, Write};
use std::sync::Arc;

use kiln_process::{run_captured, CapturedRun, ProcessGroup};

use super::run::{build_environment, prepare_engine};
use super::{exit_code_for, Command};
use crate::config::KilnConfig;
use crate::error::{CliError, CliResult};
use crate::logging;

pub struct CaptureCommand {
    pub config: KilnConfig,
    pub command_line: Vec<String>,
    pub json: bool,
}

impl CaptureCommand {
    pub fn new(config: KilnConfig, command_line: Vec<String>, json: bool) -> Self {
        Self {
            config,
            command_line,
            json,
        }
    }

    fn run(&self) -> CapturedRun {
        let group = Arc::new(ProcessGroup::new());
        run_captured(
            &group,
            &self.command_line,
            build_environment(self.config.inherit_environment, &[]),
            self.config.engine.attributes(),
        )
    }
}

impl Command for CaptureCommand {
    fn execute(&self) -> CliResult<i32> {
        if self.command_line.is_empty() {
            return Err(CliError::InvalidArgument {
                message: "no command given".to_string(),
            });
        }

        prepare_engine(&self.config);
        let captured = self.run();

        let mut stdout = io::stdout().lock();
        stdout.write_all(&captured.output)?;
        stdout.flush()?;
        drop(stdout);

        for error in &captured.errors {
            eprintln!("kiln: {}", error);
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&captured.result)?);
        } else {
            logging::notice(&summary(&captured));
        }
        Ok(exit_code_for(&captured.result))
    }
}

/// One-line description of a finished run
pub fn summary(captured: &CapturedRun) -> String {
    let result = &captured.result;
    let status = if captured.succeeded() {
        "succeeded".to_string()
    } else {
        format!("{:?} (exit code {})", result.status, result.exit_code).to_lowercase()
    };
    format!(
        "kiln: {} bytes, {}, user {:.3}s, sys {:.3}s, max rss {} KiB",
        captured.output.len(),
        status,
        result.utime_micros as f64 / 1_000_000.0,
        result.stime_micros as f64 / 1_000_000.0,
        result.max_rss_bytes / 1024,
    )
}
