//! Layered configuration for the `kiln` front end
//!
//! Sources, lowest priority first: built-in defaults,
//! `<config_dir>/kiln/config.toml`, `./kiln.toml`, files passed explicitly,
//! then `KILN_*` environment variables (`__` separates nested keys, e.g.
//! `KILN_ENGINE__CONTROL_MESSAGE_LIMIT=32`).

use std::collections::HashMap;
use std::path::PathBuf;

use config::{Config, Environment, File};
use kiln_process::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

/// Default environment variable prefix
pub const ENV_PREFIX: &str = "KILN";

/// Soft open-file limit requested when `raise_file_limit` is set
pub const FILE_LIMIT_TARGET: u64 = 10240;

/// Effective `kiln` configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    /// `tracing` filter directive used without `-v`/`-q`
    pub log_level: String,
    /// Start from the current environment instead of an empty one
    pub inherit_environment: bool,
    /// Raise the soft open-file limit before spawning
    pub raise_file_limit: bool,
    pub engine: EngineConfig,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            inherit_environment: true,
            raise_file_limit: true,
            engine: EngineConfig::default(),
        }
    }
}

/// Builds a [`KilnConfig`] from files and the environment
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    files: Vec<PathBuf>,
    search_defaults: bool,
    env_prefix: String,
    env_source: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            search_defaults: true,
            env_prefix: ENV_PREFIX.to_string(),
            env_source: None,
        }
    }

    /// Add a file that must exist, layered above earlier sources
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Whether to read the user and project config files
    pub fn search_defaults(mut self, enabled: bool) -> Self {
        self.search_defaults = enabled;
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Read variables from `vars` instead of the process environment
    pub fn with_env_source(mut self, vars: HashMap<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    /// Optional files consulted when searching defaults
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("kiln").join("config.toml"));
        }
        paths.push(PathBuf::from("kiln.toml"));
        paths
    }

    /// Merge every source and validate the result
    pub fn load(&self) -> CliResult<KilnConfig> {
        let mut builder = Config::builder();

        if self.search_defaults {
            for path in Self::default_paths() {
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        for path in &self.files {
            if !path.exists() {
                return Err(CliError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path.clone()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(self.env_source.clone()),
        );

        let config: KilnConfig = builder.build()?.try_deserialize()?;
        config.engine.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl KilnConfig {
    /// Render as TOML
    pub fn to_toml(&self) -> CliResult<String> {
        toml::to_string_pretty(self).map_err(|e| CliError::Internal(e.to_string()))
    }
}
