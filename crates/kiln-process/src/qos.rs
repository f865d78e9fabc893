//! Quality-of-service scheduling hints
//!
//! The effective class for a spawn is, in order: the explicit value in
//! [`ProcessAttributes`](crate::ProcessAttributes), the calling thread's
//! override, the process-wide default.

use std::cell::Cell;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sys::{Platform, ProcessBackend};

/// Scheduling class applied to spawned children where the platform has one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum QualityOfService {
    /// Platform default
    #[default]
    Normal = 0,
    /// Work the user is waiting on
    UserInitiated = 1,
    /// Long-running work the user is not actively watching
    Utility = 2,
    /// Maintenance work
    Background = 3,
}

impl QualityOfService {
    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityOfService::Normal => "normal",
            QualityOfService::UserInitiated => "user-initiated",
            QualityOfService::Utility => "utility",
            QualityOfService::Background => "background",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => QualityOfService::UserInitiated,
            2 => QualityOfService::Utility,
            3 => QualityOfService::Background,
            _ => QualityOfService::Normal,
        }
    }
}

impl fmt::Display for QualityOfService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown quality-of-service name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown quality of service '{0}' (expected normal, user-initiated, utility or background)")]
pub struct ParseQualityOfServiceError(String);

impl FromStr for QualityOfService {
    type Err = ParseQualityOfServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "normal" | "default" => Ok(QualityOfService::Normal),
            "user-initiated" => Ok(QualityOfService::UserInitiated),
            "utility" => Ok(QualityOfService::Utility),
            "background" => Ok(QualityOfService::Background),
            _ => Err(ParseQualityOfServiceError(s.to_string())),
        }
    }
}

static DEFAULT_QOS: AtomicU8 = AtomicU8::new(QualityOfService::Normal as u8);

thread_local! {
    static THREAD_QOS: Cell<Option<QualityOfService>> = const { Cell::new(None) };
}

/// Process-wide default class
pub fn default_quality_of_service() -> QualityOfService {
    QualityOfService::from_u8(DEFAULT_QOS.load(Ordering::Relaxed))
}

/// Set the process-wide default class, normally once at startup
pub fn set_default_quality_of_service(level: QualityOfService) {
    DEFAULT_QOS.store(level as u8, Ordering::Relaxed);
}

/// Override the class for spawns made from the calling thread
///
/// On Darwin this also moves the calling thread itself into the class.
pub fn set_current_thread_quality_of_service(level: QualityOfService) {
    THREAD_QOS.with(|cell| cell.set(Some(level)));
    Platform::apply_thread_quality_of_service(level);
}

/// Drop the calling thread's override
pub fn clear_current_thread_quality_of_service() {
    THREAD_QOS.with(|cell| cell.set(None));
}

/// The calling thread's override, if any
pub fn current_thread_quality_of_service() -> Option<QualityOfService> {
    THREAD_QOS.with(Cell::get)
}

/// Resolve the class a spawn from this thread should use
pub fn effective_quality_of_service(explicit: Option<QualityOfService>) -> QualityOfService {
    explicit
        .or_else(current_thread_quality_of_service)
        .unwrap_or_else(default_quality_of_service)
}
