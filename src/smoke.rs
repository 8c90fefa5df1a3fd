use crate::dispatch::DispatchLoaderDynamic;
use crate::loader::{DynamicLoader, ProcSource};
use crate::{check, Error, Result};
use ash::vk;
use log::*;
use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr::null;

pub const DEFAULT_APP_NAME: &CStr = c"DispatchLoaderDynamic";
pub const DEFAULT_ENGINE_NAME: &CStr = c"vkdyn";

pub struct SmokeOptions {
    pub application_name: CString,
    pub engine_name: CString,
}

impl SmokeOptions {
    pub fn new(application_name: &str, engine_name: &str) -> Result<SmokeOptions> {
        return Ok(SmokeOptions {
            application_name: CString::new(application_name)?,
            engine_name: CString::new(engine_name)?,
        });
    }

    // Defaults for whatever isn't given.
    pub fn with_names(application_name: Option<&str>, engine_name: Option<&str>) -> Result<SmokeOptions> {
        let mut options = SmokeOptions::default();
        if let Some(name) = application_name {
            options.application_name = CString::new(name)?;
        }
        if let Some(name) = engine_name {
            options.engine_name = CString::new(name)?;
        }
        return Ok(options);
    }
}

impl Default for SmokeOptions {
    fn default() -> Self {
        return SmokeOptions {
            application_name: DEFAULT_APP_NAME.to_owned(),
            engine_name: DEFAULT_ENGINE_NAME.to_owned(),
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeReport {
    pub instance_version: u32,
    pub physical_devices: usize,
    pub device_name: String,
    pub instance_slots: usize,
    pub device_slots: usize,
}

// Scoped teardown for the handles the script creates.
// Declared in creation order, so the device goes first.
struct InstanceGuard {
    instance: vk::Instance,
    destroy: Option<vk::PFN_vkDestroyInstance>,
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        match self.destroy {
            Some(f) => unsafe { f(self.instance, null()) },
            None => warn!("Leaking instance: vkDestroyInstance not resolved"),
        };
    }
}

struct DeviceGuard {
    device: vk::Device,
    destroy: Option<vk::PFN_vkDestroyDevice>,
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        match self.destroy {
            Some(f) => unsafe { f(self.device, null()) },
            None => warn!("Leaking device: vkDestroyDevice not resolved"),
        };
    }
}

fn expect_differ(a: &DispatchLoaderDynamic, b: &DispatchLoaderDynamic, stage: &'static str) -> Result<()> {
    if a == b {
        return Err(Error::DispatchMismatch(stage));
    }
    return Ok(());
}

fn expect_equal(a: &DispatchLoaderDynamic, b: &DispatchLoaderDynamic, stage: &'static str) -> Result<()> {
    if a != b {
        return Err(Error::DispatchMismatch(stage));
    }
    return Ok(());
}

// Build dispatch tables two ways and check they agree, first with an
// instance only, then with a logical device as well.
// `source` must stay loaded until this returns; every handle created
// along the way is destroyed before returning, on success or failure.
pub unsafe fn run<S: ProcSource>(source: &S, options: &SmokeOptions) -> Result<SmokeReport> {
    // Empty table, brought up to date with init() later on.
    let mut dld0 = DispatchLoaderDynamic::default();

    let create_instance = match source.get::<vk::PFN_vkCreateInstance>("vkCreateInstance") {
        Some(f) => f,
        None => return Err(Error::MissingEntryPoint("vkCreateInstance")),
    };
    let app_info = vk::ApplicationInfo::default()
        .application_name(&options.application_name)
        .engine_name(&options.engine_name)
        .api_version(vk::API_VERSION_1_0);
    let instance_info = vk::InstanceCreateInfo::default().application_info(&app_info);
    let mut instance = vk::Instance::null();
    check("vkCreateInstance", create_instance(&instance_info, null(), &mut instance))?;
    debug!("Created instance {:?}", instance);

    // Until vkDestroyInstance is resolved the guard can only warn.
    let mut instance_guard = InstanceGuard { instance: instance, destroy: None };

    let gipa = match source.get::<vk::PFN_vkGetInstanceProcAddr>("vkGetInstanceProcAddr") {
        Some(f) => f,
        None => return Err(Error::MissingEntryPoint("vkGetInstanceProcAddr")),
    };
    let dld1 = DispatchLoaderDynamic::with_instance(gipa, instance);
    instance_guard.destroy = dld1.destroy_instance;
    info!("Instance dispatch: {:?}", dld1);

    expect_differ(&dld0, &dld1, "empty table matched the instance table")?;
    dld0.init_instance(gipa, instance);
    expect_equal(&dld0, &dld1, "re-initialized table differs from the instance table")?;

    let instance_version = dld1.enumerate_instance_version()?;
    let physical_devices = dld1.enumerate_physical_devices(instance)?;
    let physical_device = match physical_devices.first() {
        Some(pd) => *pd,
        None => return Err(Error::NoPhysicalDevices),
    };
    let props = dld1.get_physical_device_properties(physical_device)?;
    let device_name = CStr::from_ptr(props.device_name.as_ptr()).to_string_lossy().into_owned();
    info!("Using {} of {} physical device(s): {}", 1, physical_devices.len(), device_name);

    let families = dld1.get_physical_device_queue_family_properties(physical_device)?;
    let family = match families.iter().position(|f| f.queue_count > 0) {
        Some(i) => i as u32,
        None => return Err(Error::NoQueueFamilies),
    };
    let priorities = [1.0f32];
    let queue_info = vk::DeviceQueueCreateInfo::default()
        .queue_family_index(family)
        .queue_priorities(&priorities);
    let device_info = vk::DeviceCreateInfo::default().queue_create_infos(std::slice::from_ref(&queue_info));
    let device = dld1.create_device(physical_device, &device_info)?;
    let mut device_guard = DeviceGuard { device: device, destroy: dld1.destroy_device };
    debug!("Created device {:?} on queue family {}", device, family);

    let gdpa = match dld1.get_instance_proc_addr::<vk::PFN_vkGetDeviceProcAddr>(instance, "vkGetDeviceProcAddr")? {
        Some(f) => f,
        None => return Err(Error::MissingEntryPoint("vkGetDeviceProcAddr")),
    };
    let dld2 = DispatchLoaderDynamic::with_device(gipa, instance, device, Some(gdpa));
    // Prefer the device's own entry point for teardown.
    if dld2.destroy_device.is_some() {
        device_guard.destroy = dld2.destroy_device;
    }
    info!("Device dispatch: {:?}", dld2);

    expect_differ(&dld0, &dld2, "instance table matched the device table")?;
    dld0.init(gipa, instance, device, Some(gdpa));
    expect_equal(&dld0, &dld2, "re-initialized table differs from the device table")?;

    let report = SmokeReport {
        instance_version: instance_version,
        physical_devices: physical_devices.len(),
        device_name: device_name,
        instance_slots: dld1.loaded_count(),
        device_slots: dld2.device_slots().iter().filter(|a| **a != 0).count(),
    };

    drop(device_guard);
    drop(instance_guard);
    return Ok(report);
}

// Open the loader (the given library, or the platform default), run the
// script on it and close it again before returning. The process-wide
// loader::vulkan() is not used, so nothing stays loaded afterwards.
pub unsafe fn run_scoped(library: Option<&Path>, options: &SmokeOptions) -> Result<SmokeReport> {
    let dl = match library {
        Some(path) => DynamicLoader::open(path)?,
        None => DynamicLoader::open_default()?,
    };
    let report = run(&dl, options);
    drop(dl);
    return report;
}
