//! # fxbridge-host — Entry-Point Resolver
//!
//! Turns an (assembly, type, method) triple into a raw callable pointer using
//! the loader delegate of the live hosting context.

use crate::context::HostingContextManager;
use crate::exports::host_string;
use fxbridge_shared::{BridgeError, Result};
use netcorehost::bindings::hostfxr::UNMANAGED_CALLERS_ONLY_METHOD as UNMANAGEDCALLERSONLY_METHOD;
use std::ffi::c_void;
use std::path::Path;
use std::ptr::NonNull;
use tracing::{debug, error};

/// A resolved managed entry point.
///
/// Nothing about the target's signature is checked at resolution time. The
/// caller states the signature when it calls [`EntryPoint::cast`] and is
/// responsible for it matching the managed declaration: primitive and pointer
/// arguments only, platform calling convention (`extern "system"`). The
/// pointer must not be called after the hosting context it came from has been
/// released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint(NonNull<c_void>);

// SAFETY: an entry point is a code address; calling it is what needs care.
unsafe impl Send for EntryPoint {}
unsafe impl Sync for EntryPoint {}

impl EntryPoint {
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// Reinterprets the entry point as a typed function pointer.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "system"` function pointer type matching the
    /// managed method's signature.
    pub unsafe fn cast<F: Copy>(self) -> F {
        assert_eq!(
            std::mem::size_of::<F>(),
            std::mem::size_of::<*mut c_void>(),
            "entry points can only be cast to function pointer types"
        );
        std::mem::transmute_copy::<*mut c_void, F>(&self.0.as_ptr())
    }
}

/// Resolves `type_name::method_name` from the assembly at `assembly_path`.
///
/// `type_name` is the assembly-qualified name (`Namespace.Type, Assembly`)
/// and is passed through verbatim. The target must be marked
/// `UnmanagedCallersOnly`; it is called with no marshalling layer.
///
/// The readiness check does not pin the context: the caller keeps its own
/// reference alive until this returns, or a concurrent final release can
/// close the context underneath the delegate call.
pub fn resolve(
    manager: &HostingContextManager,
    assembly_path: &Path,
    type_name: &str,
    method_name: &str,
) -> Result<EntryPoint> {
    let Some(load_assembly_and_get_function_pointer) = manager.loader_delegate() else {
        error!(type_name, method_name, "Entry point requested before the hosting context was initialized");
        return Err(BridgeError::NotReady);
    };

    let failed = |reason: String| {
        error!(
            assembly = %assembly_path.display(),
            type_name,
            method_name,
            %reason,
            "Entry point resolution failed"
        );
        BridgeError::Resolution {
            assembly: assembly_path.display().to_string(),
            type_name: type_name.to_string(),
            method: method_name.to_string(),
            reason,
        }
    };

    if assembly_path.as_os_str().is_empty() || type_name.is_empty() || method_name.is_empty() {
        return Err(failed("assembly path, type name and method name must be non-empty".into()));
    }

    let assembly = host_string(assembly_path).map_err(|e| failed(e.to_string()))?;
    let type_name_h = host_string(type_name).map_err(|e| failed(e.to_string()))?;
    let method_name_h = host_string(method_name).map_err(|e| failed(e.to_string()))?;

    let mut target: *const c_void = std::ptr::null();
    let rc = unsafe {
        load_assembly_and_get_function_pointer(
            assembly.as_ptr(),
            type_name_h.as_ptr(),
            method_name_h.as_ptr(),
            UNMANAGEDCALLERSONLY_METHOD,
            std::ptr::null_mut::<c_void>(),
            &mut target,
        )
    };
    if rc != 0 {
        return Err(failed(format!("loader delegate returned {rc:#010x}")));
    }

    let entry = NonNull::new(target.cast_mut())
        .map(EntryPoint)
        .ok_or_else(|| failed("loader delegate reported success but returned null".into()))?;
    debug!(type_name, method_name, ptr = ?entry.as_ptr(), "Entry point resolved");
    Ok(entry)
}
