//! # fxbridge-host — Host Exports Table
//!
//! Opens the host library and binds the three entry points it guarantees:
//! `hostfxr_initialize_for_runtime_config`, `hostfxr_get_runtime_delegate`
//! and `hostfxr_close`. The table is all-or-nothing.

use crate::config::HostConfig;
use crate::locator::{locator_for, HostLocator};
use fxbridge_shared::{BridgeError, Result};
use libloading::Library;
use netcorehost::pdcstring::{PdCStr, PdCString, PdChar};
use std::ffi::{c_void, OsStr};
use std::fmt;
use std::path::Path;
use tracing::{debug, error, info};

pub use netcorehost::bindings::hostfxr::{
    hostfxr_delegate_type as DelegateType,
    load_assembly_and_get_function_pointer_fn as LoadAssemblyAndGetFunctionPointerFn,
};

/// Opaque hosting context handle.
pub type HostContextHandle = *mut c_void;

// The three exports are bound from our own `RTLD_GLOBAL` handle, so their
// signatures are spelled out here rather than taken from a loader wrapper.
pub type InitializeForRuntimeConfigFn = unsafe extern "C" fn(
    runtime_config_path: *const PdChar,
    parameters: *const c_void,
    host_context_handle: *mut HostContextHandle,
) -> i32;

pub type GetRuntimeDelegateFn = unsafe extern "C" fn(
    host_context_handle: HostContextHandle,
    delegate_type: DelegateType,
    delegate: *mut *mut c_void,
) -> i32;

pub type CloseFn = unsafe extern "C" fn(host_context_handle: HostContextHandle) -> i32;

/// Encodes a path or string as the host's `char_t` string.
pub fn host_string(s: impl AsRef<OsStr>) -> Result<PdCString> {
    let s = s.as_ref();
    PdCString::from_os_str(s)
        .map_err(|_| BridgeError::InvalidString(format!("{s:?} contains a NUL character")))
}

const INITIALIZE_SYMBOL: &str = "hostfxr_initialize_for_runtime_config";
const GET_DELEGATE_SYMBOL: &str = "hostfxr_get_runtime_delegate";
const CLOSE_SYMBOL: &str = "hostfxr_close";

/// The resolved host entry points plus the library that backs them.
///
/// The function pointers are valid only while `library` is open; dropping the
/// table unloads the library.
pub struct HostExports {
    initialize: InitializeForRuntimeConfigFn,
    get_delegate: GetRuntimeDelegateFn,
    close: CloseFn,
    library: Option<Library>,
}

impl fmt::Debug for HostExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostExports")
            .field("initialize", &(self.initialize as *const c_void))
            .field("get_delegate", &(self.get_delegate as *const c_void))
            .field("close", &(self.close as *const c_void))
            .field("owns_library", &self.library.is_some())
            .finish()
    }
}

impl HostExports {
    /// Locates, opens and binds the host library.
    pub fn load(reference: &Path, locator: &dyn HostLocator) -> Result<Self> {
        let path = locator.locate(reference)?;
        let library = open_global(&path).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to open host library");
            BridgeError::Load {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        // Any early return drops `library`, which closes it again.
        let initialize = bind::<InitializeForRuntimeConfigFn>(&library, INITIALIZE_SYMBOL)?;
        let get_delegate = bind::<GetRuntimeDelegateFn>(&library, GET_DELEGATE_SYMBOL)?;
        let close = bind::<CloseFn>(&library, CLOSE_SYMBOL)?;

        info!(path = %path.display(), "Host library loaded");
        Ok(Self {
            initialize,
            get_delegate,
            close,
            library: Some(library),
        })
    }

    /// Builds a table from entry points that are already in memory.
    ///
    /// # Safety
    ///
    /// The pointers must follow the host library contract for their types and
    /// stay callable for as long as the table is alive.
    pub unsafe fn from_raw(
        initialize: InitializeForRuntimeConfigFn,
        get_delegate: GetRuntimeDelegateFn,
        close: CloseFn,
    ) -> Self {
        Self {
            initialize,
            get_delegate,
            close,
            library: None,
        }
    }

    /// Creates a hosting context for `runtime_config`.
    pub fn initialize(&self, runtime_config: &PdCStr) -> Result<HostContextHandle> {
        let mut handle: HostContextHandle = std::ptr::null_mut();
        let rc = unsafe { (self.initialize)(runtime_config.as_ptr(), std::ptr::null(), &mut handle) };
        if rc != 0 || handle.is_null() {
            error!(status = %format!("{rc:#010x}"), "hostfxr_initialize_for_runtime_config failed");
            if !handle.is_null() {
                self.close(handle);
            }
            return Err(BridgeError::Initialize { status: rc });
        }
        Ok(handle)
    }

    /// Fetches a runtime delegate of the given kind from a live context.
    pub fn runtime_delegate(
        &self,
        context: HostContextHandle,
        kind: DelegateType,
    ) -> Result<*mut c_void> {
        let mut delegate: *mut c_void = std::ptr::null_mut();
        let rc = unsafe { (self.get_delegate)(context, kind, &mut delegate) };
        if rc != 0 || delegate.is_null() {
            error!(status = %format!("{rc:#010x}"), kind = kind as i32, "hostfxr_get_runtime_delegate failed");
            return Err(BridgeError::Delegate { status: rc });
        }
        Ok(delegate)
    }

    /// Closes a context. The handle must not be used afterwards.
    pub fn close(&self, context: HostContextHandle) -> i32 {
        let rc = unsafe { (self.close)(context) };
        if rc != 0 {
            error!(status = %format!("{rc:#010x}"), "hostfxr_close failed");
        }
        rc
    }

    pub fn owns_library(&self) -> bool {
        self.library.is_some()
    }
}

impl Drop for HostExports {
    fn drop(&mut self) {
        if self.library.take().is_some() {
            debug!("Host library unloaded");
        }
    }
}

#[cfg(unix)]
fn open_global(path: &Path) -> std::result::Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_LAZY};
    // Plugins the host loads later resolve against these symbols.
    unsafe { UnixLibrary::open(Some(path), RTLD_LAZY | RTLD_GLOBAL) }.map(Library::from)
}

#[cfg(windows)]
fn open_global(path: &Path) -> std::result::Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}

fn bind<T: Copy>(library: &Library, name: &str) -> Result<T> {
    let mut symbol = Vec::with_capacity(name.len() + 1);
    symbol.extend_from_slice(name.as_bytes());
    symbol.push(0);
    match unsafe { library.get::<T>(&symbol) } {
        Ok(f) => Ok(*f),
        Err(e) => {
            error!(symbol = name, error = %e, "Missing host library export");
            Err(BridgeError::MissingExport {
                symbol: name.to_string(),
            })
        }
    }
}

/// Produces a fresh exports table each time a context generation starts.
pub trait HostLoader: Send + Sync {
    fn load(&self, reference: &Path) -> Result<HostExports>;
}

/// Production loader: locate, then open with global symbol visibility.
pub struct HostfxrLoader {
    locator: Box<dyn HostLocator>,
}

impl HostfxrLoader {
    pub fn new(locator: Box<dyn HostLocator>) -> Self {
        Self { locator }
    }

    pub fn from_config(config: &HostConfig) -> Self {
        Self::new(locator_for(config))
    }
}

impl HostLoader for HostfxrLoader {
    fn load(&self, reference: &Path) -> Result<HostExports> {
        HostExports::load(reference, self.locator.as_ref())
    }
}
