//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::{
    attributes::ProcessAttributes,
    control::{CONTROL_PROTOCOL_VERSION, DEFAULT_MAX_MESSAGE_LENGTH},
    error::{ProcessError, Result},
    qos::{self, QualityOfService},
};

/// Engine-wide settings, usually deserialized from the front end's config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Process-wide scheduling class for spawned children
    pub default_quality_of_service: QualityOfService,
    /// Bound on a single control message line
    pub control_message_limit: usize,
    /// Default for [`ProcessAttributes::can_safely_interrupt`]
    pub can_safely_interrupt: bool,
    /// Default for [`ProcessAttributes::control_enabled`]
    pub control_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_quality_of_service: QualityOfService::Normal,
            control_message_limit: DEFAULT_MAX_MESSAGE_LENGTH,
            can_safely_interrupt: true,
            control_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.control_message_limit < CONTROL_PROTOCOL_VERSION.len() {
            return Err(ProcessError::InvalidConfig(format!(
                "control_message_limit must be at least {} to fit the protocol version",
                CONTROL_PROTOCOL_VERSION.len()
            )));
        }
        Ok(())
    }

    /// Install the process-wide defaults
    pub fn apply(&self) {
        qos::set_default_quality_of_service(self.default_quality_of_service);
    }

    /// Base attributes for a spawn
    pub fn attributes(&self) -> ProcessAttributes {
        ProcessAttributes::new()
            .with_safe_interrupt(self.can_safely_interrupt)
            .with_control(self.control_enabled)
            .with_control_message_limit(self.control_message_limit)
    }
}
