use crate::{Error, Result};
use libloading::Library;
use log::*;
use once_cell::sync::OnceCell;
use std::ffi::{c_void, OsStr};
use std::mem;
use std::path::{Path, PathBuf};
use std::ptr::null;

// File names the Vulkan loader ships under, in the
// order we try them.
#[cfg(target_os = "windows")]
pub const CANDIDATES: &[&str] = &["vulkan-1.dll"];
#[cfg(target_os = "android")]
pub const CANDIDATES: &[&str] = &["libvulkan.so"];
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub const CANDIDATES: &[&str] = &["libvulkan.dylib", "libvulkan.1.dylib", "libMoltenVK.dylib"];
#[cfg(not(any(
    target_os = "windows",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
)))]
pub const CANDIDATES: &[&str] = &["libvulkan.so.1", "libvulkan.so"];

// Anything that can hand out raw entry points by name.
// `DynamicLoader` is the real one. Keeping this as a trait lets the
// dispatch code be driven by an in-process driver as well.
pub trait ProcSource {
    // Raw address of `name`, or null when it isn't exported.
    fn proc_address(&self, name: &str) -> *const c_void;

    // Typed lookup. `T` must be a function pointer type matching the
    // real signature of `name`.
    unsafe fn get<T: Copy>(&self, name: &str) -> Option<T> {
        let addr = self.proc_address(name);
        if addr.is_null() {
            return None;
        }
        debug_assert_eq!(mem::size_of::<T>(), mem::size_of::<*const c_void>());
        return Some(mem::transmute_copy::<*const c_void, T>(&addr));
    }
}

// Owns the opened loader library. The library is closed
// when this is dropped, so any pointer obtained through it
// must not outlive it.
pub struct DynamicLoader {
    library: Option<Library>,
    path: Option<PathBuf>,
}

impl DynamicLoader {
    // Try every platform candidate. Never fails; check `success()`.
    pub fn new() -> DynamicLoader {
        return match Self::open_default() {
            Ok(dl) => dl,
            Err(e) => {
                warn!("{}", e);
                DynamicLoader { library: None, path: None }
            }
        };
    }

    pub fn open_default() -> Result<DynamicLoader> {
        let mut last: Option<Error> = None;
        for name in CANDIDATES {
            match Self::open(name) {
                Ok(dl) => return Ok(dl),
                Err(e) => {
                    debug!("{}", e);
                    last = Some(e);
                }
            }
        }
        return Err(last.unwrap_or(Error::MissingEntryPoint("vulkan loader")));
    }

    pub fn open<P: AsRef<OsStr>>(name: P) -> Result<DynamicLoader> {
        let name = name.as_ref();
        let library = match unsafe { Library::new(name) } {
            Ok(lib) => lib,
            Err(e) => {
                return Err(Error::LibraryLoad {
                    name: name.to_string_lossy().into_owned(),
                    source: e,
                })
            }
        };
        info!("Loaded {}", name.to_string_lossy());
        return Ok(DynamicLoader {
            library: Some(library),
            path: Some(PathBuf::from(name)),
        });
    }

    pub fn success(&self) -> bool {
        return self.library.is_some();
    }

    pub fn path(&self) -> Option<&Path> {
        return self.path.as_deref();
    }

    pub unsafe fn get_proc_address<T: Copy>(&self, name: &str) -> Option<T> {
        return self.get::<T>(name);
    }
}

impl Default for DynamicLoader {
    fn default() -> Self {
        return Self::new();
    }
}

impl ProcSource for DynamicLoader {
    fn proc_address(&self, name: &str) -> *const c_void {
        let lib = match &self.library {
            Some(l) => l,
            None => return null(),
        };
        // A symbol that resolves to null is as good as missing.
        return match unsafe { lib.get::<*const c_void>(name.as_bytes()) } {
            Ok(sym) => *sym,
            Err(e) => {
                trace!("{}: {}", name, e);
                null()
            }
        };
    }
}

impl Drop for DynamicLoader {
    fn drop(&mut self) {
        if let Some(lib) = self.library.take() {
            match lib.close() {
                Err(e) => error!("Failed to close Vulkan loader: {}", e),
                Ok(_) => {}
            };
        }
    }
}

// Cache the default loader for the life of the process. It is never
// closed, since statics don't drop; use DynamicLoader directly when the
// library has to be released. A failed open isn't cached.
static VULKAN_LIBRARY: OnceCell<DynamicLoader> = OnceCell::new();

pub fn vulkan() -> Result<&'static DynamicLoader> {
    return VULKAN_LIBRARY.get_or_try_init(DynamicLoader::open_default);
}

// The cached loader, if vulkan() has opened one.
pub fn cached() -> Option<&'static DynamicLoader> {
    return VULKAN_LIBRARY.get();
}
