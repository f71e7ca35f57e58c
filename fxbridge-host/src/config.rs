//! # fxbridge-host — Configuration

use fxbridge_shared::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV: &str = "FXBRIDGE_CONFIG";

/// Top-level configuration for the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Runtime configuration file handed to the host library.
    /// Relative paths are resolved against the executable's directory.
    pub runtime_config: PathBuf,
    /// How the host library is located.
    pub host: HostConfig,
    /// Entry points used by the logging facade.
    pub logging: LoggingConfig,
}

/// Host library discovery settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Use this host library directly instead of running discovery.
    pub hostfxr_path: Option<PathBuf>,
    /// Runtime installation root searched by discovery. Takes precedence
    /// over the reference file's location.
    pub dotnet_root: Option<PathBuf>,
}

/// Managed log sink coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Assembly exporting the log sink. Relative to the executable's directory.
    pub assembly: PathBuf,
    /// Fully qualified type name, passed through verbatim.
    pub type_name: String,
    /// Mandatory sink method: `void(int level, byte* utf8, int len)`.
    pub log_method: String,
    /// Optional shutdown notifier: `void()`.
    pub shutdown_method: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            runtime_config: PathBuf::from("App.runtimeconfig.json"),
            host: HostConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            assembly: PathBuf::from("App.dll"),
            type_name: "App.Interop.NativeLogBridge, App".into(),
            log_method: "Log".into(),
            shutdown_method: Some("Shutdown".into()),
        }
    }
}

impl BridgeConfig {
    /// Loads a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BridgeError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// The configuration named by `FXBRIDGE_CONFIG`, or the defaults.
    ///
    /// A file that cannot be read or parsed is reported and the defaults are
    /// used instead.
    pub fn ambient() -> Self {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                match Self::from_file(&path) {
                    Ok(config) => {
                        debug!(path = %path.display(), "Loaded bridge configuration");
                        config
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Ignoring unreadable bridge configuration");
                        Self::default()
                    }
                }
            }
            None => Self::default(),
        }
    }

    /// Absolute path of the runtime configuration file.
    pub fn runtime_config_path(&self) -> PathBuf {
        resolve_beside_exe(&self.runtime_config)
    }

    /// Absolute path of the logging assembly.
    pub fn logging_assembly_path(&self) -> PathBuf {
        resolve_beside_exe(&self.logging.assembly)
    }
}

/// Directory containing the running executable, or `.` when unknown.
pub fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Joins `file_name` onto [`exe_dir`].
pub fn next_to_exe(file_name: impl AsRef<Path>) -> PathBuf {
    exe_dir().join(file_name)
}

/// Absolute paths pass through; relative ones are placed beside the executable.
pub fn resolve_beside_exe(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        next_to_exe(path)
    }
}
