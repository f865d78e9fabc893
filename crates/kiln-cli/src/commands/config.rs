// Show the effective configuration

use super::Command;
use crate::config::{ConfigLoader, KilnConfig};
use crate::error::CliResult;
use crate::logging::VerbosityLevel;

/// Print the merged configuration as TOML
pub struct ConfigCommand {
    pub config: KilnConfig,
}

impl ConfigCommand {
    pub fn new(config: KilnConfig) -> Self {
        Self { config }
    }
}

impl Command for ConfigCommand {
    fn execute(&self) -> CliResult<i32> {
        if VerbosityLevel::Verbose.should_output() {
            for path in ConfigLoader::default_paths() {
                let state = if path.exists() { "found" } else { "absent" };
                eprintln!("# {} ({})", path.display(), state);
            }
        }
        print!("{}", self.config.to_toml()?);
        Ok(0)
    }
}
