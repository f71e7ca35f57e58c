//! # fxbridge-host — C Linkage Surface
//!
//! The only functions native callers link against, declared for C and C++ in
//! `include/fxbridge.h`. Strings are UTF-8, NUL-terminated. Failures are
//! reported through tracing and surface as `false` or a null pointer.

use crate::config::{resolve_beside_exe, BridgeConfig};
use crate::context::HostingContextManager;
use crate::logging::{LogBridge, LogTarget};
use crate::telemetry;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::path::Path;
use tracing::error;

const DEFAULT_FILTER: &str = "warn";

/// Borrows a C string argument; null and non-UTF-8 input are reported.
unsafe fn arg<'a>(ptr: *const c_char, name: &str) -> Option<&'a str> {
    if ptr.is_null() {
        error!(argument = name, "Null argument");
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Some(s),
        Err(e) => {
            error!(argument = name, error = %e, "Argument is not valid UTF-8");
            None
        }
    }
}

/// Like [`arg`], but null means "not given".
unsafe fn optional_arg<'a>(ptr: *const c_char, name: &str) -> Option<Option<&'a str>> {
    if ptr.is_null() {
        Some(None)
    } else {
        arg(ptr, name).map(Some)
    }
}

/// Initializes the hosting context from a runtime config file, or takes
/// another reference on the live one.
///
/// # Safety
///
/// `runtime_config_path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn fxbridge_init_from_runtimeconfig(runtime_config_path: *const c_char) -> bool {
    telemetry::init(DEFAULT_FILTER);
    let Some(path) = arg(runtime_config_path, "runtime_config_path") else {
        return false;
    };
    HostingContextManager::global().acquire(Path::new(path)).is_ok()
}

/// [`fxbridge_init_from_runtimeconfig`] with a runtime config file that sits
/// beside the running executable. Null uses the configured runtime config.
///
/// # Safety
///
/// `runtime_config_file_name` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn fxbridge_init_next_to_exe(runtime_config_file_name: *const c_char) -> bool {
    telemetry::init(DEFAULT_FILTER);
    let Some(file_name) = optional_arg(runtime_config_file_name, "runtime_config_file_name") else {
        return false;
    };
    let manager = HostingContextManager::global();
    let acquired = match file_name {
        Some(file_name) => manager.acquire_next_to_exe(file_name),
        None => manager.acquire(&BridgeConfig::ambient().runtime_config_path()),
    };
    acquired.is_ok()
}

/// Resolves an `UnmanagedCallersOnly` method. Returns null on failure.
///
/// `type_name` is assembly-qualified: `Namespace.Type, Assembly`.
///
/// # Safety
///
/// Every argument must be null or a valid NUL-terminated string. The returned
/// pointer must be called with the managed method's exact signature and not
/// after the matching [`fxbridge_shutdown`].
#[no_mangle]
pub unsafe extern "C" fn fxbridge_load_umco(
    assembly_path: *const c_char,
    type_name: *const c_char,
    method_name: *const c_char,
) -> *mut c_void {
    telemetry::init(DEFAULT_FILTER);
    let (Some(assembly), Some(type_name), Some(method)) = (
        arg(assembly_path, "assembly_path"),
        arg(type_name, "type_name"),
        arg(method_name, "method_name"),
    ) else {
        return std::ptr::null_mut();
    };
    HostingContextManager::global()
        .resolve(Path::new(assembly), type_name, method)
        .map_or(std::ptr::null_mut(), |entry| entry.as_ptr())
}

/// Drops one reference on the hosting context; the last one closes it.
#[no_mangle]
pub extern "C" fn fxbridge_shutdown() {
    HostingContextManager::global().release();
}

/// Installs the managed log sink. Null arguments take their value from the
/// ambient configuration. When `assembly_path` is given, the runtime config
/// is the `<stem>.runtimeconfig.json` beside it.
///
/// Returns `false` when the sink could not be installed; logging then keeps
/// going to stderr.
///
/// # Safety
///
/// Every argument must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn fxbridge_logging_init(
    assembly_path: *const c_char,
    type_name: *const c_char,
    method_name: *const c_char,
) -> bool {
    telemetry::init(DEFAULT_FILTER);
    let (Some(assembly), Some(type_name), Some(method)) = (
        optional_arg(assembly_path, "assembly_path"),
        optional_arg(type_name, "type_name"),
        optional_arg(method_name, "method_name"),
    ) else {
        return false;
    };

    let config = BridgeConfig::ambient();
    let mut target = LogTarget::from_config(&config);
    if let Some(assembly) = assembly {
        let assembly = resolve_beside_exe(Path::new(assembly));
        target = LogTarget {
            runtime_config: assembly.with_extension("runtimeconfig.json"),
            assembly,
            ..target
        };
    }
    if let Some(type_name) = type_name {
        target.type_name = type_name.to_string();
    }
    if let Some(method) = method {
        target.log_method = method.to_string();
    }

    LogBridge::global().init(&target).is_ok()
}

/// Sends one record to the managed sink, or to stderr followed by a newline
/// when no sink is installed. Empty records are ignored.
///
/// # Safety
///
/// `message` must be null or point at `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn fxbridge_log(level: c_int, message: *const c_char, len: usize) {
    log_through(LogBridge::global(), level, message, len);
}

unsafe fn log_through(bridge: &LogBridge, level: c_int, message: *const c_char, len: usize) {
    if message.is_null() || len == 0 {
        return;
    }
    let bytes = std::slice::from_raw_parts(message.cast::<u8>(), len);
    bridge.log_raw(level, bytes);
}

/// Notifies the managed sink, reverts to stderr and releases the hosting
/// context reference taken by [`fxbridge_logging_init`].
#[no_mangle]
pub extern "C" fn fxbridge_logging_shutdown() {
    LogBridge::global().shutdown();
}
