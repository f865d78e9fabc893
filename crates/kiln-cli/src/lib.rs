//! kiln command-line front end
//!
//! Loads layered configuration, initialises logging and routes the `run`,
//! `capture` and `config` subcommands onto `kiln-process`.

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod router;

pub use config::{ConfigLoader, KilnConfig};
pub use error::{CliError, CliResult};
pub use router::{Cli, CommandRouter, Commands};
