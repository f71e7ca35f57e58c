//! # fxbridge-shared
//!
//! Types shared between the bridge and the code on either side of it: the
//! severity levels understood by the managed log sink and the error taxonomy
//! every bridge operation reports through.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Log severity, mirrored one-to-one by the managed logging consumer.
///
/// The discriminants are part of the wire contract: the managed sink receives
/// the level as a plain `int`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    #[default]
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl LogLevel {
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    /// The integer passed across the boundary.
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i32> for LogLevel {
    type Error = BridgeError;

    fn try_from(raw: i32) -> Result<Self> {
        LogLevel::ALL
            .get(usize::try_from(raw).unwrap_or(usize::MAX))
            .copied()
            .ok_or_else(|| BridgeError::Config(format!("unknown log level {raw}")))
    }
}

impl FromStr for LogLevel {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" | "critical" => Ok(LogLevel::Fatal),
            _ => Err(BridgeError::Config(format!("unknown log level '{s}'"))),
        }
    }
}

/// Coarse classification of a [`BridgeError`], one per failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Discovery,
    Load,
    Initialize,
    Delegate,
    NotReady,
    Resolution,
    Config,
    Io,
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Host library discovery failed for {}: {reason}", reference.display())]
    Discovery { reference: PathBuf, reason: String },

    #[error("Failed to load host library {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("Host library is missing export '{symbol}'")]
    MissingExport { symbol: String },

    #[error("Hosting context initialization failed (status {status:#010x})")]
    Initialize { status: i32 },

    #[error("Loader delegate acquisition failed (status {status:#010x})")]
    Delegate { status: i32 },

    #[error("Hosting context not initialized")]
    NotReady,

    #[error("Cannot resolve {type_name}::{method} in '{assembly}': {reason}")]
    Resolution {
        assembly: String,
        type_name: String,
        method: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid host string: {0}")]
    InvalidString(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Discovery { .. } => ErrorKind::Discovery,
            BridgeError::Load { .. } | BridgeError::MissingExport { .. } => ErrorKind::Load,
            BridgeError::Initialize { .. } => ErrorKind::Initialize,
            BridgeError::Delegate { .. } => ErrorKind::Delegate,
            BridgeError::NotReady => ErrorKind::NotReady,
            BridgeError::Resolution { .. } => ErrorKind::Resolution,
            BridgeError::Config(_) | BridgeError::InvalidString(_) => ErrorKind::Config,
            BridgeError::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_discriminants_match_managed_enum() {
        let raw: Vec<i32> = LogLevel::ALL.iter().map(|l| l.as_raw()).collect();
        assert_eq!(raw, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_level_from_raw() {
        assert_eq!(LogLevel::try_from(4).unwrap(), LogLevel::Error);
        assert!(LogLevel::try_from(6).is_err());
        assert!(LogLevel::try_from(-1).is_err());
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" fatal ".parse::<LogLevel>().unwrap(), LogLevel::Fatal);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_level_serde_names() {
        let json = serde_json::to_string(&LogLevel::Debug).unwrap();
        assert_eq!(json, "\"debug\"");
        let back: LogLevel = serde_json::from_str("\"trace\"").unwrap();
        assert_eq!(back, LogLevel::Trace);
    }

    #[test]
    fn test_status_rendered_as_hex() {
        let err = BridgeError::Initialize {
            status: 0x8000_8083_u32 as i32,
        };
        assert_eq!(
            err.to_string(),
            "Hosting context initialization failed (status 0x80008083)"
        );
        assert_eq!(err.kind(), ErrorKind::Initialize);
    }

    #[test]
    fn test_error_kinds() {
        let missing = BridgeError::MissingExport {
            symbol: "hostfxr_close".into(),
        };
        assert_eq!(missing.kind(), ErrorKind::Load);
        assert_eq!(BridgeError::NotReady.kind(), ErrorKind::NotReady);
    }
}
