//! # fxbridge-host — Host Locator
//!
//! Finds the host library on disk. Discovery is the nethost routine
//! `get_hostfxr_path`; a configured path skips discovery entirely.

use crate::config::{BridgeConfig, HostConfig};
use crate::exports::host_string;
use fxbridge_shared::{BridgeError, Result};
use netcorehost::nethost;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Something that can produce the path of the host library.
pub trait HostLocator: Send + Sync {
    /// `reference` is a locality hint only, typically the runtime
    /// configuration file that sits beside the deployment.
    fn locate(&self, reference: &Path) -> Result<PathBuf>;
}

/// Discovery through nethost.
///
/// With a runtime root configured, only that root is searched. Otherwise the
/// search starts from the reference file (app-local and self-contained
/// layouts) before the global install locations.
#[derive(Debug, Clone, Default)]
pub struct NethostLocator {
    dotnet_root: Option<PathBuf>,
}

impl NethostLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dotnet_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.dotnet_root = Some(root.into());
        self
    }
}

impl HostLocator for NethostLocator {
    fn locate(&self, reference: &Path) -> Result<PathBuf> {
        let found = match &self.dotnet_root {
            Some(root) => nethost::get_hostfxr_path_with_dotnet_root(host_string(root)?),
            None if reference.as_os_str().is_empty() => nethost::get_hostfxr_path(),
            None => nethost::get_hostfxr_path_with_assembly_path(host_string(reference)?),
        };

        match found {
            Ok(path) => {
                let path = PathBuf::from(path.to_os_string());
                debug!(path = %path.display(), "Host library located");
                Ok(path)
            }
            Err(e) => {
                let reason = e.to_string();
                error!(reference = %reference.display(), %reason, "Host library discovery failed");
                Err(BridgeError::Discovery {
                    reference: reference.to_path_buf(),
                    reason,
                })
            }
        }
    }
}

/// A host library path fixed by configuration.
#[derive(Debug, Clone)]
pub struct FixedLocator {
    path: PathBuf,
}

impl FixedLocator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HostLocator for FixedLocator {
    fn locate(&self, reference: &Path) -> Result<PathBuf> {
        if self.path.is_file() {
            Ok(self.path.clone())
        } else {
            error!(path = %self.path.display(), "Configured host library does not exist");
            Err(BridgeError::Discovery {
                reference: reference.to_path_buf(),
                reason: format!("{} does not exist", self.path.display()),
            })
        }
    }
}

/// Picks the locator a host configuration asks for.
pub fn locator_for(config: &HostConfig) -> Box<dyn HostLocator> {
    if let Some(path) = &config.hostfxr_path {
        return Box::new(FixedLocator::new(path));
    }
    let mut locator = NethostLocator::new();
    if let Some(root) = &config.dotnet_root {
        locator = locator.with_dotnet_root(root);
    }
    Box::new(locator)
}

/// Locates the host library using the ambient configuration.
pub fn locate_host_library(reference_path: &Path) -> Result<PathBuf> {
    locator_for(&BridgeConfig::ambient().host).locate(reference_path)
}
