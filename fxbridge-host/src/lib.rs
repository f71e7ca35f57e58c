//! # fxbridge-host — Library Entry Point
//!
//! Loads the managed runtime host library, keeps one ref-counted hosting
//! context alive for the process and resolves managed entry points through
//! it. `ffi` is the C linkage surface; the other modules are the Rust API.

pub mod config;
pub mod context;
pub mod exports;
pub mod ffi;
pub mod locator;
pub mod logging;
pub mod resolver;
pub mod telemetry;

pub use config::BridgeConfig;
pub use context::{HostState, HostingContextManager};
pub use exports::{HostExports, HostLoader, HostfxrLoader};
pub use fxbridge_shared::{BridgeError, ErrorKind, LogLevel, Result};
pub use locator::{locate_host_library, HostLocator};
pub use logging::{LogBridge, LogTarget};
pub use resolver::{resolve, EntryPoint};
