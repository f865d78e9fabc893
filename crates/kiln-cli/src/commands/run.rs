// Run a single command through the process engine

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, OnceLock};

use kiln_process::{
    raise_open_file_limit, release, spawn_process, Environment, ProcessAttributes,
    ProcessDelegate, ProcessError, ProcessGroup, ProcessHandle, ProcessResult, QualityOfService,
    ReleaseFn, Signal,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{exit_code_for, Command};
use crate::config::{KilnConfig, FILE_LIMIT_TARGET};
use crate::error::{CliError, CliResult};
use crate::logging;

/// Per-invocation overrides from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub handle: u64,
    /// Force the control channel on or off
    pub control: Option<bool>,
    pub no_interrupt: bool,
    pub working_dir: Option<PathBuf>,
    pub quality_of_service: Option<QualityOfService>,
    pub env: Vec<(String, String)>,
    pub clean_env: bool,
    pub json: bool,
}

/// Run a command, streaming its output to stdout
pub struct RunCommand {
    pub config: KilnConfig,
    pub command_line: Vec<String>,
    pub options: RunOptions,
}

impl RunCommand {
    pub fn new(config: KilnConfig, command_line: Vec<String>, options: RunOptions) -> Self {
        Self {
            config,
            command_line,
            options,
        }
    }

    /// Environment the child will see
    pub fn environment(&self) -> Environment {
        build_environment(
            self.config.inherit_environment && !self.options.clean_env,
            &self.options.env,
        )
    }

    /// Attributes for the spawn, config defaults first
    pub fn attributes(&self) -> ProcessAttributes {
        let mut attributes = self.config.engine.attributes();
        if let Some(enabled) = self.options.control {
            attributes = attributes.with_control(enabled);
        }
        if self.options.no_interrupt {
            attributes = attributes.with_safe_interrupt(false);
        }
        if let Some(dir) = &self.options.working_dir {
            attributes = attributes.with_working_dir(dir);
        }
        if let Some(level) = self.options.quality_of_service {
            attributes = attributes.with_quality_of_service(level);
        }
        attributes
    }
}

impl Command for RunCommand {
    fn execute(&self) -> CliResult<i32> {
        if self.command_line.is_empty() {
            return Err(CliError::InvalidArgument {
                message: "no command given".to_string(),
            });
        }

        prepare_engine(&self.config);

        let group = Arc::new(ProcessGroup::new());
        let cancellation = Cancellation::install()?;
        cancellation.watch(Arc::clone(&group));

        let (tx, rx) = mpsc::channel();
        spawn_process(
            Arc::new(TerminalDelegate),
            (),
            Arc::clone(&group),
            ProcessHandle(self.options.handle),
            &self.command_line,
            self.environment(),
            self.attributes(),
            announce_release(),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        let received = rx.recv();
        cancellation.clear();
        let result = received
            .map_err(|_| CliError::Internal("command finished without a result".to_string()))?;

        if self.options.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Ok(exit_code_for(&result))
    }
}

/// Install engine defaults and raise descriptor limits before spawning
pub(crate) fn prepare_engine(config: &KilnConfig) {
    config.engine.apply();
    if config.raise_file_limit {
        match raise_open_file_limit(FILE_LIMIT_TARGET) {
            Ok(limit) => debug!(limit, "Open file limit"),
            Err(e) => warn!(error = %e, "Could not raise open file limit"),
        }
    }
}

pub(crate) fn build_environment(inherit: bool, overrides: &[(String, String)]) -> Environment {
    let mut environment = if inherit {
        Environment::inherit()
    } else {
        Environment::new()
    };
    for (key, value) in overrides {
        environment.set(key, value);
    }
    environment
}

/// Tell the user the command released its slot and finish it in the
/// background
fn announce_release() -> ReleaseFn {
    let reap = release::detached("kiln-reap");
    Box::new(move |deferred| {
        logging::notice(&format!(
            "kiln: process {} released, waiting for it to exit",
            deferred.pid()
        ));
        reap(deferred);
    })
}

/// Streams output to stdout and errors to stderr
struct TerminalDelegate;

impl ProcessDelegate<()> for TerminalDelegate {
    fn process_started(&self, _: &(), handle: ProcessHandle) {
        debug!(handle = %handle, "Command started");
    }

    fn process_had_output(&self, _: &(), _: ProcessHandle, data: &[u8]) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = stdout.write_all(data).and_then(|()| stdout.flush()) {
            debug!(error = %e, "Dropping command output");
        }
    }

    fn process_had_error(&self, _: &(), _: ProcessHandle, error: &ProcessError) {
        eprintln!("kiln: {}", error);
    }

    fn process_finished(&self, _: &(), handle: ProcessHandle, result: &ProcessResult) {
        debug!(
            handle = %handle,
            status = ?result.status,
            exit_code = result.exit_code,
            utime_micros = result.utime_micros,
            stime_micros = result.stime_micros,
            max_rss_bytes = result.max_rss_bytes,
            "Command finished"
        );
    }
}

/// Forwards Ctrl-C to the running command's group
///
/// The first press interrupts, later presses kill.
#[derive(Default)]
struct Cancellation {
    group: Mutex<Option<Arc<ProcessGroup>>>,
    presses: AtomicUsize,
}

impl Cancellation {
    fn install() -> CliResult<&'static Cancellation> {
        static STATE: OnceLock<Cancellation> = OnceLock::new();
        static HANDLER: OnceLock<Result<(), String>> = OnceLock::new();

        let state = STATE.get_or_init(Cancellation::default);
        HANDLER
            .get_or_init(|| {
                ctrlc::set_handler(move || state.interrupt()).map_err(|e| e.to_string())
            })
            .clone()
            .map_err(|e| CliError::Internal(format!("failed to install Ctrl-C handler: {}", e)))?;
        Ok(state)
    }

    fn watch(&self, group: Arc<ProcessGroup>) {
        *self.group.lock() = Some(group);
        self.presses.store(0, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.group.lock().take();
    }

    fn interrupt(&self) {
        let Some(group) = self.group.lock().clone() else {
            return;
        };
        let signal = if self.presses.fetch_add(1, Ordering::SeqCst) == 0 {
            Signal::Interrupt
        } else {
            Signal::Kill
        };

        group.close();
        let delivered = group.signal_all(signal);
        warn!(signal = %signal, delivered, "Cancelling command");
    }
}
