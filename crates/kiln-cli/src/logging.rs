// Logging and verbosity control

use std::sync::atomic::{AtomicU8, Ordering};

use tracing_subscriber::EnvFilter;

/// Global verbosity level
static VERBOSITY: AtomicU8 = AtomicU8::new(1);

/// Verbosity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerbosityLevel {
    /// Quiet mode - errors only
    Quiet = 0,
    /// Normal mode - configured log level
    Normal = 1,
    /// Verbose mode - debug output
    Verbose = 2,
    /// Very verbose mode - trace output
    VeryVerbose = 3,
}

impl VerbosityLevel {
    /// Level selected by `-q` and repeated `-v`
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => VerbosityLevel::Quiet,
            (false, 0) => VerbosityLevel::Normal,
            (false, 1) => VerbosityLevel::Verbose,
            (false, _) => VerbosityLevel::VeryVerbose,
        }
    }

    /// Get the current verbosity level
    pub fn current() -> Self {
        match VERBOSITY.load(Ordering::Relaxed) {
            0 => VerbosityLevel::Quiet,
            1 => VerbosityLevel::Normal,
            2 => VerbosityLevel::Verbose,
            _ => VerbosityLevel::VeryVerbose,
        }
    }

    /// Set the verbosity level
    pub fn set(level: Self) {
        VERBOSITY.store(level as u8, Ordering::Relaxed);
    }

    /// Check if we should output at this level
    pub fn should_output(&self) -> bool {
        self <= &Self::current()
    }

    /// Filter directive used when `RUST_LOG` is not set
    pub fn directive<'a>(&self, configured: &'a str) -> &'a str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => configured,
            VerbosityLevel::Verbose => "debug",
            VerbosityLevel::VeryVerbose => "trace",
        }
    }
}

/// Initialize logging based on CLI flags and the configured level
///
/// Log lines go to stderr so command output on stdout stays clean.
/// `RUST_LOG` overrides both.
pub fn init_logging(verbose: u8, quiet: bool, configured_level: &str) {
    let level = VerbosityLevel::from_flags(verbose, quiet);
    VerbosityLevel::set(level);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.directive(configured_level)))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // A subscriber may already be installed (tests); keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Print a user-facing notice on stderr unless running quietly
pub fn notice(message: &str) {
    if VerbosityLevel::Normal.should_output() {
        eprintln!("{}", message);
    }
}
