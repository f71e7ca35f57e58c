//! # fxbridge-host — Managed Log Facade
//!
//! Forwards log records to a sink exported by the hosted component. Until
//! the sink has been resolved, after resolution failed, and after shutdown,
//! records go to the local diagnostic stream instead. Records are never
//! dropped.

use crate::config::BridgeConfig;
use crate::context::HostingContextManager;
use arc_swap::{ArcSwap, ArcSwapOption};
use fxbridge_shared::{LogLevel, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Managed sink: `void Log(int level, byte* utf8, int len)`.
pub type ManagedLogFn = unsafe extern "system" fn(level: i32, utf8: *const u8, len: i32);

/// Managed shutdown notifier: `void Shutdown()`.
pub type ManagedShutdownFn = unsafe extern "system" fn();

static GLOBAL: Lazy<LogBridge> =
    Lazy::new(|| LogBridge::new(HostingContextManager::global().clone(), Arc::new(Stderr)));

/// Where records go when no managed sink is available.
pub trait DiagnosticStream: Send + Sync {
    /// Writes `message` followed by a line terminator.
    fn write_line(&self, message: &[u8]);
}

/// The process's standard error stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stderr;

impl DiagnosticStream for Stderr {
    fn write_line(&self, message: &[u8]) {
        let mut stderr = std::io::stderr().lock();
        // Nowhere left to report a failing stderr.
        let _ = stderr.write_all(message);
        let _ = stderr.write_all(b"\n");
    }
}

enum Sink {
    Managed(ManagedLogFn),
    Local,
}

/// Coordinates of the managed log sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTarget {
    pub runtime_config: PathBuf,
    pub assembly: PathBuf,
    pub type_name: String,
    pub log_method: String,
    pub shutdown_method: Option<String>,
}

impl LogTarget {
    /// Paths from the configuration, placed beside the executable when relative.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            runtime_config: config.runtime_config_path(),
            assembly: config.logging_assembly_path(),
            type_name: config.logging.type_name.clone(),
            log_method: config.logging.log_method.clone(),
            shutdown_method: config.logging.shutdown_method.clone(),
        }
    }

    /// A target whose runtime config is `<stem>.runtimeconfig.json` beside
    /// the assembly.
    pub fn for_assembly(
        assembly: impl Into<PathBuf>,
        type_name: impl Into<String>,
        log_method: impl Into<String>,
    ) -> Self {
        let assembly = assembly.into();
        Self {
            runtime_config: assembly.with_extension("runtimeconfig.json"),
            assembly,
            type_name: type_name.into(),
            log_method: log_method.into(),
            shutdown_method: None,
        }
    }

    pub fn with_shutdown_method(mut self, method: impl Into<String>) -> Self {
        self.shutdown_method = Some(method.into());
        self
    }

    pub fn with_runtime_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.runtime_config = path.into();
        self
    }
}

pub struct LogBridge {
    manager: Arc<HostingContextManager>,
    stream: Arc<dyn DiagnosticStream>,
    sink: ArcSwap<Sink>,
    shutdown_hook: ArcSwapOption<ManagedShutdownFn>,
    holds_reference: AtomicBool,
    /// Serializes `init` and `shutdown`; `log` never takes it.
    lifecycle: Mutex<()>,
}

impl LogBridge {
    pub fn new(manager: Arc<HostingContextManager>, stream: Arc<dyn DiagnosticStream>) -> Self {
        Self {
            manager,
            stream,
            sink: ArcSwap::from_pointee(Sink::Local),
            shutdown_hook: ArcSwapOption::empty(),
            holds_reference: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        }
    }

    /// The process-wide facade over [`HostingContextManager::global`].
    pub fn global() -> &'static LogBridge {
        &GLOBAL
    }

    /// Acquires the hosting context and resolves the sink.
    ///
    /// On failure the facade keeps writing to the diagnostic stream and holds
    /// no reference on the hosting context. Calling it again once a sink is
    /// installed does nothing.
    pub fn init(&self, target: &LogTarget) -> Result<()> {
        let _guard = self.lifecycle.lock();
        if self.is_managed() {
            debug!("Managed log sink already installed");
            return Ok(());
        }

        if let Err(e) = self.manager.acquire(&target.runtime_config) {
            error!(error = %e, "Managed logging unavailable, using the diagnostic stream");
            return Err(e);
        }

        let log = match self
            .manager
            .resolve(&target.assembly, &target.type_name, &target.log_method)
        {
            Ok(entry) => entry,
            Err(e) => {
                self.manager.release();
                error!(error = %e, "Managed log sink unavailable, using the diagnostic stream");
                return Err(e);
            }
        };
        // SAFETY: the managed sink is declared with the `ManagedLogFn` signature.
        let log: ManagedLogFn = unsafe { log.cast() };

        if let Some(method) = &target.shutdown_method {
            match self
                .manager
                .resolve(&target.assembly, &target.type_name, method)
            {
                Ok(entry) => {
                    // SAFETY: the managed notifier takes no arguments and returns nothing.
                    let hook: ManagedShutdownFn = unsafe { entry.cast() };
                    self.shutdown_hook.store(Some(Arc::new(hook)));
                }
                Err(e) => warn!(error = %e, "Managed shutdown notifier not available"),
            }
        }

        self.holds_reference.store(true, Ordering::Release);
        self.sink.store(Arc::new(Sink::Managed(log)));
        info!(
            assembly = %target.assembly.display(),
            type_name = %target.type_name,
            "Managed log sink installed"
        );
        Ok(())
    }

    pub fn log(&self, level: LogLevel, message: &[u8]) {
        self.log_raw(level.as_raw(), message);
    }

    /// Like [`log`](Self::log) with the level as the integer the sink receives.
    pub fn log_raw(&self, level: i32, message: &[u8]) {
        if message.is_empty() {
            return;
        }
        let sink = self.sink.load();
        match &**sink {
            Sink::Managed(log) => match i32::try_from(message.len()) {
                Ok(len) => unsafe { (*log)(level, message.as_ptr(), len) },
                // The sink cannot express the length.
                Err(_) => self.stream.write_line(message),
            },
            Sink::Local => self.stream.write_line(message),
        }
    }

    /// Falls back to the diagnostic stream, notifies the managed side once and
    /// releases the hosting context reference taken by `init`.
    pub fn shutdown(&self) {
        let _guard = self.lifecycle.lock();
        self.sink.store(Arc::new(Sink::Local));

        if let Some(hook) = self.shutdown_hook.swap(None) {
            unsafe { (*hook)() };
            debug!("Managed shutdown notifier invoked");
        }

        if self.holds_reference.swap(false, Ordering::AcqRel) {
            self.manager.release();
            info!("Managed log sink removed");
        }
    }

    /// Whether records currently reach the managed sink.
    pub fn is_managed(&self) -> bool {
        matches!(**self.sink.load(), Sink::Managed(_))
    }

    pub fn manager(&self) -> &Arc<HostingContextManager> {
        &self.manager
    }
}
