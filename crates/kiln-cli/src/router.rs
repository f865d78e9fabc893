// Command routing and dispatch

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use kiln_process::QualityOfService;

use crate::commands::run::RunOptions;
use crate::commands::{CaptureCommand, Command, ConfigCommand, RunCommand};
use crate::config::{ConfigLoader, KilnConfig};
use crate::error::CliResult;

/// kiln - run build commands through the kiln process engine
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(bin_name = "kiln")]
#[command(about = "Run build commands through the kiln process engine")]
#[command(
    long_about = "kiln runs build commands in their own process groups, streams their output, \
and supports the llbuild.1 control protocol so a command can release its slot before it exits."
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file layered above the defaults
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose output (repeat for trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Minimize output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a command, streaming its output
    #[command(about = "Run a command, streaming its output and exiting with its status")]
    Run(RunArgs),

    /// Run a command and report its captured output
    #[command(about = "Run a command to completion and print a captured summary")]
    Capture(CaptureArgs),

    /// Show the effective configuration
    #[command(about = "Print the merged configuration as TOML")]
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Task handle; exported to the child as hex LLBUILD_TASK_ID
    #[arg(long, default_value_t = 0)]
    pub handle: u64,

    /// Offer the control channel even if disabled in config
    #[arg(long, overrides_with = "no_control")]
    pub control: bool,

    /// Do not offer the control channel
    #[arg(long, overrides_with = "control")]
    pub no_control: bool,

    /// Never forward interrupts; Ctrl-C escalates straight to kill
    #[arg(long)]
    pub no_interrupt: bool,

    /// Working directory for the command
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Scheduling class (normal, user-initiated, utility, background)
    #[arg(long, value_name = "LEVEL")]
    pub qos: Option<QualityOfService>,

    /// Set an environment variable for the command
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Start from an empty environment
    #[arg(long)]
    pub clean_env: bool,

    /// Print the result as JSON after the command exits
    #[arg(long)]
    pub json: bool,

    /// Command and arguments
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<String>,
}

impl RunArgs {
    pub fn options(&self) -> RunOptions {
        let control = match (self.control, self.no_control) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        };
        RunOptions {
            handle: self.handle,
            control,
            no_interrupt: self.no_interrupt,
            working_dir: self.cwd.clone(),
            quality_of_service: self.qos,
            env: self.env.clone(),
            clean_env: self.clean_env,
            json: self.json,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CaptureArgs {
    /// Print the result as JSON instead of a summary line
    #[arg(long)]
    pub json: bool,

    /// Command and arguments
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<String>,
}

/// Parse a `KEY=VALUE` pair
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{}`", s))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in `{}`", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Route and execute commands
pub struct CommandRouter;

impl CommandRouter {
    /// Parse CLI arguments and route to the appropriate handler
    pub fn route() -> CliResult<i32> {
        let cli = Cli::parse();
        let config = Self::load_config(&cli)?;

        // Initialize logging based on CLI flags
        crate::logging::init_logging(cli.verbose, cli.quiet, &config.log_level);

        Self::execute(&cli, config)
    }

    pub fn load_config(cli: &Cli) -> CliResult<KilnConfig> {
        let mut loader = ConfigLoader::new();
        if let Some(path) = &cli.config {
            loader = loader.with_file(path);
        }
        loader.load()
    }

    /// Execute a command
    pub fn execute(cli: &Cli, config: KilnConfig) -> CliResult<i32> {
        match &cli.command {
            Commands::Run(args) => {
                let cmd = RunCommand::new(config, args.command.clone(), args.options());
                cmd.execute()
            }
            Commands::Capture(args) => {
                let cmd = CaptureCommand::new(config, args.command.clone(), args.json);
                cmd.execute()
            }
            Commands::Config => ConfigCommand::new(config).execute(),
        }
    }
}
