//! # fxbridge-host — Hosting Context Manager
//!
//! Owns at most one live hosting context per manager, shared by every caller
//! that acquired it and torn down when the last of them releases it.
//!
//! Lifecycle rules:
//! - The reference count moves between 0 and 1 only while `slot` is locked.
//!   The lock-free fast paths move it between non-zero values only, so a
//!   fast-path acquire can never revive a generation that is being torn down.
//! - `loader_delegate` is published (release ordering) before the count
//!   becomes 1, so any thread that observes a non-zero count with acquire
//!   ordering also observes the delegate.
//! - Teardown closes the context before the host library is unloaded.

use crate::config::{next_to_exe, BridgeConfig};
use crate::exports::{
    host_string, DelegateType, HostContextHandle, HostExports, HostLoader, HostfxrLoader,
    LoadAssemblyAndGetFunctionPointerFn,
};
use crate::resolver::{self, EntryPoint};
use fxbridge_shared::{BridgeError, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::ffi::c_void;
use std::path::Path;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

static GLOBAL: Lazy<Arc<HostingContextManager>> = Lazy::new(|| {
    let config = BridgeConfig::ambient();
    Arc::new(HostingContextManager::new(Box::new(HostfxrLoader::from_config(
        &config.host,
    ))))
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Uninitialized,
    Active,
}

/// One generation: the exports table, the context it created and the loader
/// delegate obtained from that context.
struct ActiveHost {
    exports: HostExports,
    context: HostContextHandle,
    delegate: *mut c_void,
}

// SAFETY: the context handle is only touched while the manager lock is held.
unsafe impl Send for ActiveHost {}

impl Drop for ActiveHost {
    fn drop(&mut self) {
        // Runs before `exports` drops, so the close export is still mapped.
        self.exports.close(self.context);
        info!("Hosting context closed");
    }
}

pub struct HostingContextManager {
    loader: Box<dyn HostLoader>,
    slot: Mutex<Option<ActiveHost>>,
    ref_count: AtomicUsize,
    loader_delegate: AtomicPtr<c_void>,
    generation: AtomicU64,
}

impl HostingContextManager {
    pub fn new(loader: Box<dyn HostLoader>) -> Self {
        Self {
            loader,
            slot: Mutex::new(None),
            ref_count: AtomicUsize::new(0),
            loader_delegate: AtomicPtr::new(std::ptr::null_mut()),
            generation: AtomicU64::new(0),
        }
    }

    /// The process-wide manager, configured from [`BridgeConfig::ambient`].
    pub fn global() -> &'static Arc<HostingContextManager> {
        &GLOBAL
    }

    /// Takes a reference on the hosting context, creating it from
    /// `runtime_config` if none is live.
    ///
    /// Redundant calls are cheap and never touch the host library; the
    /// configuration path is only consulted by the call that starts a
    /// generation. A failed call leaves the manager exactly as it found it.
    pub fn acquire(&self, runtime_config: &Path) -> Result<()> {
        if runtime_config.as_os_str().is_empty() {
            error!("Runtime config path is empty");
            return Err(BridgeError::Config("runtime config path is empty".into()));
        }

        if self.try_retain() {
            debug!(ref_count = self.ref_count(), "Hosting context already active");
            return Ok(());
        }

        let mut slot = self.slot.lock();
        if self.try_retain() {
            debug!(ref_count = self.ref_count(), "Hosting context activated concurrently");
            return Ok(());
        }

        let active = self.start_generation(runtime_config)?;
        self.loader_delegate.store(active.delegate, Ordering::Release);
        *slot = Some(active);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.ref_count.store(1, Ordering::Release);

        info!(
            runtime_config = %runtime_config.display(),
            generation,
            "Hosting context initialized"
        );
        Ok(())
    }

    /// [`acquire`](Self::acquire) with a runtime config that sits beside the
    /// running executable.
    pub fn acquire_next_to_exe(&self, file_name: impl AsRef<Path>) -> Result<()> {
        self.acquire(&next_to_exe(file_name))
    }

    /// Drops one reference. The call that drops the last one closes the
    /// context and unloads the host library; extra calls are ignored.
    pub fn release(&self) {
        if self.ref_count.load(Ordering::Acquire) == 0 {
            debug!("Release without a live hosting context ignored");
            return;
        }

        if self
            .ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n > 1).then(|| n - 1))
            .is_ok()
        {
            return;
        }

        let mut slot = self.slot.lock();
        match self
            .ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Err(_) => {
                debug!("Release without a live hosting context ignored");
                return;
            }
            Ok(previous) if previous > 1 => return,
            Ok(_) => {}
        }

        self.loader_delegate
            .store(std::ptr::null_mut(), Ordering::Release);
        drop(slot.take());
        info!(generation = self.generation(), "Hosting context released");
    }

    /// Resolves a managed entry point through the live context.
    ///
    /// The caller must hold a reference (from [`acquire`](Self::acquire))
    /// for the duration of the call. A resolve racing the `release` that
    /// drops the last reference may still pass the readiness check and then
    /// call into a context that is being closed.
    pub fn resolve(
        &self,
        assembly_path: &Path,
        type_name: &str,
        method_name: &str,
    ) -> Result<EntryPoint> {
        resolver::resolve(self, assembly_path, type_name, method_name)
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    pub fn state(&self) -> HostState {
        if self.ref_count() > 0 {
            HostState::Active
        } else {
            HostState::Uninitialized
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == HostState::Active
    }

    /// Number of generations started so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// The published loader delegate, if a context is live.
    pub(crate) fn loader_delegate(&self) -> Option<LoadAssemblyAndGetFunctionPointerFn> {
        if self.ref_count.load(Ordering::Acquire) == 0 {
            return None;
        }
        let ptr = self.loader_delegate.load(Ordering::Acquire);
        if ptr.is_null() {
            return None;
        }
        // SAFETY: only pointers obtained for `LoadAssemblyAndGetFunctionPointer`
        // are ever published.
        Some(unsafe { std::mem::transmute::<*mut c_void, LoadAssemblyAndGetFunctionPointerFn>(ptr) })
    }

    /// Load, initialize, fetch the loader delegate. Any failure unwinds what
    /// was already built: a dropped `ActiveHost` closes its context and a
    /// dropped `HostExports` unloads its library.
    fn start_generation(&self, runtime_config: &Path) -> Result<ActiveHost> {
        let config = host_string(runtime_config)?;
        let exports = self.loader.load(runtime_config)?;
        let context = exports.initialize(&config)?;

        let mut active = ActiveHost {
            exports,
            context,
            delegate: std::ptr::null_mut(),
        };
        active.delegate = active
            .exports
            .runtime_delegate(context, DelegateType::hdt_load_assembly_and_get_function_pointer)?;
        Ok(active)
    }

    fn try_retain(&self) -> bool {
        self.ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n > 0).then(|| n + 1))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxbridge_shared::ErrorKind;
    use std::path::PathBuf;

    struct FailingLoader {
        calls: Arc<AtomicUsize>,
    }

    impl HostLoader for FailingLoader {
        fn load(&self, reference: &Path) -> Result<HostExports> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BridgeError::Discovery {
                reference: reference.to_path_buf(),
                reason: "no host installed".into(),
            })
        }
    }

    fn failing_manager() -> (HostingContextManager, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = HostingContextManager::new(Box::new(FailingLoader {
            calls: calls.clone(),
        }));
        (manager, calls)
    }

    #[test]
    fn test_new_manager_is_uninitialized() {
        let (manager, _) = failing_manager();
        assert_eq!(manager.state(), HostState::Uninitialized);
        assert_eq!(manager.ref_count(), 0);
        assert_eq!(manager.generation(), 0);
        assert!(manager.loader_delegate().is_none());
    }

    #[test]
    fn test_empty_config_path_never_loads() {
        let (manager, calls) = failing_manager();
        let err = manager.acquire(Path::new("")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_discovery_failure_leaves_no_state() {
        let (manager, calls) = failing_manager();
        let path = PathBuf::from("/opt/app/app.runtimeconfig.json");
        for attempt in 1..=2 {
            let err = manager.acquire(&path).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Discovery);
            assert_eq!(calls.load(Ordering::SeqCst), attempt);
            assert_eq!(manager.ref_count(), 0);
            assert!(!manager.is_active());
        }
    }

    #[test]
    fn test_unmatched_release_is_noop() {
        let (manager, _) = failing_manager();
        manager.release();
        manager.release();
        assert_eq!(manager.ref_count(), 0);
        assert_eq!(manager.state(), HostState::Uninitialized);
    }

    #[test]
    fn test_resolve_before_acquire_is_not_ready() {
        let (manager, _) = failing_manager();
        let err = manager
            .resolve(Path::new("App.dll"), "App.Type, App", "Method")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
    }
}
