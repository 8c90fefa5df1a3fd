pub mod loader;
pub mod dispatch;
pub mod smoke;
pub mod logging;

pub use ash::vk;
pub use dispatch::DispatchLoaderDynamic;
pub use loader::{DynamicLoader, ProcSource};

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    LibraryLoad {
        name: String,
        source: libloading::Error,
    },
    MissingEntryPoint(&'static str),
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
    NoPhysicalDevices,
    NoQueueFamilies,
    DispatchMismatch(&'static str),
    InvalidName(std::ffi::NulError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            Error::LibraryLoad { name, source } => {
                write!(f, "failed to load {}: {}", name, source)
            }
            Error::MissingEntryPoint(name) => write!(f, "entry point {} is not available", name),
            Error::Vulkan { call, result } => write!(f, "{} returned {:?}", call, result),
            Error::NoPhysicalDevices => write!(f, "no physical devices found"),
            Error::NoQueueFamilies => write!(f, "physical device exposes no queues"),
            Error::DispatchMismatch(stage) => write!(f, "dispatch table mismatch: {}", stage),
            Error::InvalidName(e) => write!(f, "invalid name: {}", e),
        };
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        return match self {
            Error::LibraryLoad { source, .. } => Some(source),
            Error::InvalidName(e) => Some(e),
            _ => None,
        };
    }
}

impl From<std::ffi::NulError> for Error {
    fn from(e: std::ffi::NulError) -> Self {
        return Error::InvalidName(e);
    }
}

// Turn a raw VkResult into our error type, keeping the
// name of the call that produced it.
pub(crate) fn check(call: &'static str, result: vk::Result) -> Result<()> {
    return match result {
        vk::Result::SUCCESS => Ok(()),
        r => Err(Error::Vulkan { call: call, result: r }),
    };
}
