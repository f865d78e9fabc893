// CLI error types

use thiserror::Error;

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            CliError::InvalidArgument { message } => {
                format!(
                    "Invalid argument: {}\n\nRun 'kiln help' for usage information.",
                    message
                )
            }
            CliError::Io(e) => {
                format!("I/O failed: {}", e)
            }
            CliError::Config(msg) => {
                format!(
                    "Configuration error: {}\n\nRun 'kiln config' to check your configuration.",
                    msg
                )
            }
            CliError::Output(e) => {
                format!("Could not render the result: {}", e)
            }
            CliError::Internal(msg) => {
                format!("Internal error: {}\n\nPlease report this issue.", msg)
            }
        }
    }

    /// Get technical details for verbose mode
    pub fn technical_details(&self) -> String {
        format!("{:?}", self)
    }
}

impl From<config::ConfigError> for CliError {
    fn from(e: config::ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<kiln_process::ProcessError> for CliError {
    fn from(e: kiln_process::ProcessError) -> Self {
        match e {
            kiln_process::ProcessError::InvalidConfig(msg) => CliError::Config(msg),
            other => CliError::Internal(other.to_string()),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
