//! Dynamic library loading for compile-time artifacts.
//!
//! A trait seam like the process runner: the system implementation speaks
//! raw `dlopen`/`dlsym`, tests hand out function pointers directly. Handles
//! stay open for the life of the process; loaded compile-time code may be
//! invoked at any point until teardown.

use std::path::Path;

use tracing::error;

/// Opaque handle to an opened library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryHandle(pub usize);

pub trait DynamicLoader {
    fn load(&mut self, path: &Path) -> Option<LibraryHandle>;

    /// Resolves a symbol to a raw function address. The pipeline transmutes
    /// the address to the macro or generator signature recorded on the
    /// definition being loaded.
    fn lookup(&mut self, handle: LibraryHandle, symbol: &str) -> Option<*const ()>;
}

#[cfg(unix)]
pub use system::SystemDynamicLoader;

#[cfg(unix)]
mod system {
    use super::*;
    use std::ffi::{c_char, c_void, CStr, CString};

    const RTLD_NOW: i32 = 2;

    #[cfg(not(target_os = "macos"))]
    #[link(name = "dl")]
    extern "C" {
        fn dlopen(filename: *const c_char, flags: i32) -> *mut c_void;
        fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void;
        fn dlerror() -> *const c_char;
    }

    #[cfg(target_os = "macos")]
    #[link(name = "System")]
    extern "C" {
        fn dlopen(filename: *const c_char, flags: i32) -> *mut c_void;
        fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void;
        fn dlerror() -> *const c_char;
    }

    unsafe fn last_error() -> String {
        let message = dlerror();
        if message.is_null() {
            "unknown dlerror".to_string()
        } else {
            CStr::from_ptr(message).to_string_lossy().into_owned()
        }
    }

    /// Loader backed by the platform's dynamic linker. Handles are never
    /// closed; compile-time code must stay callable until process exit.
    #[derive(Default)]
    pub struct SystemDynamicLoader {
        handles: Vec<*mut c_void>,
    }

    impl SystemDynamicLoader {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DynamicLoader for SystemDynamicLoader {
        fn load(&mut self, path: &Path) -> Option<LibraryHandle> {
            let c_path = CString::new(path.to_string_lossy().as_bytes()).ok()?;
            let handle = unsafe { dlopen(c_path.as_ptr(), RTLD_NOW) };
            if handle.is_null() {
                error!(
                    target: "scone::build",
                    "dlopen {} failed: {}",
                    path.display(),
                    unsafe { last_error() }
                );
                return None;
            }
            self.handles.push(handle);
            Some(LibraryHandle(self.handles.len() - 1))
        }

        fn lookup(&mut self, handle: LibraryHandle, symbol: &str) -> Option<*const ()> {
            let library = *self.handles.get(handle.0)?;
            let c_symbol = CString::new(symbol).ok()?;
            let address = unsafe { dlsym(library, c_symbol.as_ptr()) };
            if address.is_null() {
                error!(
                    target: "scone::build",
                    "symbol {} not found: {}",
                    symbol,
                    unsafe { last_error() }
                );
                return None;
            }
            Some(address as *const ())
        }
    }
}
