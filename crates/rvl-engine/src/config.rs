use std::fmt;

use serde::{Deserialize, Serialize};

/// Engine log verbosity.
///
/// Serialized as its numeric value (`0`, `1`, `2`), which is what engines expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum LogLevel {
    Error = 0,
    #[default]
    Info = 1,
    Debug = 2,
}

impl From<LogLevel> for u8 {
    fn from(level: LogLevel) -> Self {
        level as u8
    }
}

impl TryFrom<u8> for LogLevel {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, String> {
        match value {
            0 => Ok(LogLevel::Error),
            1 => Ok(LogLevel::Info),
            2 => Ok(LogLevel::Debug),
            other => Err(format!("invalid log level {other} (expected 0, 1 or 2)")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Error => "Error",
            LogLevel::Info => "Info",
            LogLevel::Debug => "Debug",
        };
        f.write_str(name)
    }
}

/// Identity of one controller, fixed at construction.
///
/// Workers receive a serialized copy of this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Logical light group driven by the controller.
    pub channel: u8,
    pub log_level: LogLevel,
    /// Identity assigned by the manager.
    pub device_id: u16,
}
