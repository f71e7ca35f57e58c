//! In-process stand-in for the host library.
//!
//! The entry points are real `extern` functions with the host's calling
//! conventions, so the bridge drives them exactly as it drives the real
//! library. Each test registers its own `StubHost` under a unique runtime
//! config path; contexts carry that key, so tests running in parallel never
//! see each other's counters.

#![allow(dead_code)]

use fxbridge_host::exports::{DelegateType, HostContextHandle, HostExports, HostLoader};
use fxbridge_host::logging::DiagnosticStream;
use fxbridge_host::{BridgeError, Result};
use netcorehost::pdcstring::{PdCStr, PdChar};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const TYPE_NAME: &str = "Stub.Interop.NativeLogBridge, Stub";

const STATUS_INIT_FAILED: i32 = 0x8000_8083_u32 as i32;
const STATUS_DELEGATE_FAILED: i32 = 0x8000_8085_u32 as i32;
const STATUS_TYPE_LOAD: i32 = 0x8013_1522_u32 as i32;

static HOSTS: Lazy<Mutex<HashMap<String, Arc<StubHost>>>> = Lazy::new(Default::default);
static RESOLUTIONS: Lazy<Mutex<HashMap<String, usize>>> = Lazy::new(Default::default);
static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static LOGGED: RefCell<Vec<(i32, Vec<u8>)>> = RefCell::new(Vec::new());
    static SHUTDOWNS: RefCell<usize> = RefCell::new(0);
}

#[derive(Default)]
pub struct StubHost {
    pub loads: AtomicUsize,
    pub initializations: AtomicUsize,
    pub delegate_requests: AtomicUsize,
    pub closes: AtomicUsize,
    pub live_contexts: AtomicUsize,
    pub fail_load: AtomicBool,
    pub fail_initialize: AtomicBool,
    pub fail_delegate: AtomicBool,
}

impl StubHost {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

struct StubContext {
    key: String,
}

unsafe fn decode(ptr: *const PdChar) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let s = PdCStr::from_str_ptr(ptr);
    Some(s.to_os_string().to_string_lossy().into_owned())
}

/// A fresh runtime config path with a stub host registered behind it.
pub fn register(name: &str) -> (PathBuf, Arc<StubHost>) {
    let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
    let path = PathBuf::from(format!("/stub/{name}-{id}/app.runtimeconfig.json"));
    let host = register_at(&path);
    (path, host)
}

pub fn register_at(path: &Path) -> Arc<StubHost> {
    let host = Arc::new(StubHost::default());
    HOSTS
        .lock()
        .insert(path.to_string_lossy().into_owned(), host.clone());
    host
}

fn host_for(key: &str) -> Option<Arc<StubHost>> {
    HOSTS.lock().get(key).cloned()
}

/// A unique assembly path; resolutions against it are counted.
pub fn assembly(name: &str) -> PathBuf {
    let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
    PathBuf::from(format!("/stub/{name}-{id}/Stub.dll"))
}

pub fn resolutions(assembly: &Path) -> usize {
    RESOLUTIONS
        .lock()
        .get(assembly.to_string_lossy().as_ref())
        .copied()
        .unwrap_or(0)
}

/// Records delivered to the stub sink on the current thread.
pub fn logged() -> Vec<(i32, Vec<u8>)> {
    LOGGED.with(|l| l.borrow().clone())
}

/// Shutdown notifications delivered on the current thread.
pub fn shutdowns() -> usize {
    SHUTDOWNS.with(|s| *s.borrow())
}

/// Hands out stub exports tables and counts how often it was asked.
pub struct StubLoader;

impl HostLoader for StubLoader {
    fn load(&self, reference: &Path) -> Result<HostExports> {
        let key = reference.to_string_lossy().into_owned();
        let host = host_for(&key).ok_or_else(|| BridgeError::Discovery {
            reference: reference.to_path_buf(),
            reason: "no stub host registered".into(),
        })?;
        host.loads.fetch_add(1, Ordering::SeqCst);
        if host.fail_load.load(Ordering::SeqCst) {
            return Err(BridgeError::MissingExport {
                symbol: "hostfxr_close".into(),
            });
        }
        Ok(unsafe { HostExports::from_raw(stub_initialize, stub_get_delegate, stub_close) })
    }
}

unsafe extern "C" fn stub_initialize(
    runtime_config_path: *const PdChar,
    _parameters: *const c_void,
    host_context_handle: *mut HostContextHandle,
) -> i32 {
    let Some(key) = decode(runtime_config_path) else {
        return STATUS_INIT_FAILED;
    };
    let Some(host) = host_for(&key) else {
        return STATUS_INIT_FAILED;
    };
    host.initializations.fetch_add(1, Ordering::SeqCst);
    if host.fail_initialize.load(Ordering::SeqCst) {
        return STATUS_INIT_FAILED;
    }
    host.live_contexts.fetch_add(1, Ordering::SeqCst);
    *host_context_handle = Box::into_raw(Box::new(StubContext { key })).cast();
    0
}

unsafe extern "C" fn stub_get_delegate(
    host_context_handle: HostContextHandle,
    delegate_type: DelegateType,
    delegate: *mut *mut c_void,
) -> i32 {
    let context = &*(host_context_handle as *const StubContext);
    let Some(host) = host_for(&context.key) else {
        return STATUS_DELEGATE_FAILED;
    };
    host.delegate_requests.fetch_add(1, Ordering::SeqCst);
    if host.fail_delegate.load(Ordering::SeqCst)
        || delegate_type as i32 != DelegateType::hdt_load_assembly_and_get_function_pointer as i32
    {
        return STATUS_DELEGATE_FAILED;
    }
    *delegate = stub_load_assembly_and_get_function_pointer as *mut c_void;
    0
}

unsafe extern "C" fn stub_close(host_context_handle: HostContextHandle) -> i32 {
    let context = Box::from_raw(host_context_handle as *mut StubContext);
    if let Some(host) = host_for(&context.key) {
        host.closes.fetch_add(1, Ordering::SeqCst);
        host.live_contexts.fetch_sub(1, Ordering::SeqCst);
    }
    0
}

/// Methods: `Log` and `Shutdown` resolve to the stub sink and notifier,
/// `Null` reports success without a pointer, anything else fails to load.
unsafe extern "system" fn stub_load_assembly_and_get_function_pointer(
    assembly_path: *const PdChar,
    _type_name: *const PdChar,
    method_name: *const PdChar,
    delegate_type_name: *const PdChar,
    _reserved: *const c_void,
    delegate: *mut *mut c_void,
) -> i32 {
    let assembly = decode(assembly_path).unwrap_or_default();
    *RESOLUTIONS.lock().entry(assembly).or_default() += 1;

    if delegate_type_name as usize != usize::MAX {
        return STATUS_TYPE_LOAD;
    }
    match decode(method_name).as_deref() {
        Some("Log") => {
            *delegate = stub_log as *mut c_void;
            0
        }
        Some("Shutdown") => {
            *delegate = stub_shutdown as *mut c_void;
            0
        }
        Some("Null") => {
            *delegate = std::ptr::null_mut();
            0
        }
        _ => STATUS_TYPE_LOAD,
    }
}

unsafe extern "system" fn stub_log(level: i32, utf8: *const u8, len: i32) {
    let bytes = std::slice::from_raw_parts(utf8, len as usize).to_vec();
    LOGGED.with(|l| l.borrow_mut().push((level, bytes)));
}

unsafe extern "system" fn stub_shutdown() {
    SHUTDOWNS.with(|s| *s.borrow_mut() += 1);
}

/// Diagnostic stream that keeps what was written.
#[derive(Default)]
pub struct Capture(Mutex<Vec<u8>>);

impl Capture {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().clone()
    }
}

impl DiagnosticStream for Capture {
    fn write_line(&self, message: &[u8]) {
        let mut buf = self.0.lock();
        buf.extend_from_slice(message);
        buf.push(b'\n');
    }
}
