// An in-process stand-in for a Vulkan loader. Lookups through the instance
// return "trampoline" stubs and lookups through the device return "driver"
// stubs, like the real loader does, so the two tables differ by address.
#![allow(dead_code)]

use std::ffi::{c_char, c_void, CStr};
use std::ptr::null;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering::SeqCst};
use std::sync::Mutex;
use vkdyn::vk::{self, Handle};
use vkdyn::{DispatchLoaderDynamic, ProcSource};

pub const DEVICE_NAME: &str = "vkdyn fake GPU";
pub const INSTANCE_HANDLE: u64 = 0xA11CE;
pub const DEVICE_HANDLE: u64 = 0xDE71CE;

pub static PHYSICAL_DEVICES: AtomicU32 = AtomicU32::new(2);
pub static GROW_ON_FILL: AtomicBool = AtomicBool::new(false);
pub static ALWAYS_INCOMPLETE: AtomicBool = AtomicBool::new(false);
pub static FAIL_CREATE_INSTANCE: AtomicBool = AtomicBool::new(false);
pub static INSTANCES_CREATED: AtomicUsize = AtomicUsize::new(0);
pub static DEVICES_CREATED: AtomicUsize = AtomicUsize::new(0);
pub static TRAMPOLINE_CALLS: AtomicUsize = AtomicUsize::new(0);
pub static DRIVER_CALLS: AtomicUsize = AtomicUsize::new(0);
pub static ENUMERATE_FILLS: AtomicUsize = AtomicUsize::new(0);
pub static TEARDOWN: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());
pub static APP_NAME: Mutex<String> = Mutex::new(String::new());

macro_rules! void_fn {
    ($f:expr, $pfn:ty) => {
        Some(std::mem::transmute::<$pfn, unsafe extern "system" fn()>($f))
    };
}

pub fn reset(physical_devices: u32) {
    let _ = env_logger::builder().is_test(true).try_init();
    PHYSICAL_DEVICES.store(physical_devices, SeqCst);
    GROW_ON_FILL.store(false, SeqCst);
    ALWAYS_INCOMPLETE.store(false, SeqCst);
    FAIL_CREATE_INSTANCE.store(false, SeqCst);
    INSTANCES_CREATED.store(0, SeqCst);
    DEVICES_CREATED.store(0, SeqCst);
    TRAMPOLINE_CALLS.store(0, SeqCst);
    DRIVER_CALLS.store(0, SeqCst);
    ENUMERATE_FILLS.store(0, SeqCst);
    TEARDOWN.lock().unwrap().clear();
    APP_NAME.lock().unwrap().clear();
}

pub fn teardown() -> Vec<&'static str> {
    return TEARDOWN.lock().unwrap().clone();
}

// The exported surface of the fake library. Names listed in `hidden`
// are reported as missing.
#[derive(Default)]
pub struct FakeDriver {
    pub hidden: Vec<&'static str>,
}

impl FakeDriver {
    pub fn without(name: &'static str) -> FakeDriver {
        return FakeDriver { hidden: vec![name] };
    }
}

impl ProcSource for FakeDriver {
    fn proc_address(&self, name: &str) -> *const c_void {
        if self.hidden.iter().any(|h| *h == name) {
            return null();
        }
        return match name {
            "vkCreateInstance" => create_instance as vk::PFN_vkCreateInstance as *const c_void,
            "vkGetInstanceProcAddr" => get_instance_proc_addr as vk::PFN_vkGetInstanceProcAddr as *const c_void,
            _ => null(),
        };
    }
}

unsafe extern "system" fn create_instance(
    info: *const vk::InstanceCreateInfo<'_>,
    _allocator: *const vk::AllocationCallbacks<'_>,
    instance: *mut vk::Instance,
) -> vk::Result {
    if FAIL_CREATE_INSTANCE.load(SeqCst) {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    let app = (*info).p_application_info;
    if !app.is_null() && !(*app).p_application_name.is_null() {
        let name = CStr::from_ptr((*app).p_application_name).to_string_lossy().into_owned();
        *APP_NAME.lock().unwrap() = name;
    }
    INSTANCES_CREATED.fetch_add(1, SeqCst);
    *instance = vk::Instance::from_raw(INSTANCE_HANDLE);
    return vk::Result::SUCCESS;
}

unsafe extern "system" fn enumerate_instance_version(version: *mut u32) -> vk::Result {
    *version = vk::API_VERSION_1_1;
    return vk::Result::SUCCESS;
}

unsafe extern "system" fn destroy_instance(_instance: vk::Instance, _allocator: *const vk::AllocationCallbacks<'_>) {
    TEARDOWN.lock().unwrap().push("instance");
}

unsafe extern "system" fn enumerate_physical_devices(
    _instance: vk::Instance,
    count: *mut u32,
    devices: *mut vk::PhysicalDevice,
) -> vk::Result {
    let available = PHYSICAL_DEVICES.load(SeqCst);
    if devices.is_null() {
        *count = available;
        return vk::Result::SUCCESS;
    }
    if ALWAYS_INCOMPLETE.load(SeqCst) {
        ENUMERATE_FILLS.fetch_add(1, SeqCst);
        return vk::Result::INCOMPLETE;
    }
    // Simulate a device showing up between the count and the fill.
    if GROW_ON_FILL.swap(false, SeqCst) {
        PHYSICAL_DEVICES.fetch_add(1, SeqCst);
        return vk::Result::INCOMPLETE;
    }
    let written = (*count).min(available);
    for i in 0..written {
        *devices.add(i as usize) = vk::PhysicalDevice::from_raw(0x100 + i as u64);
    }
    *count = written;
    if written < available {
        return vk::Result::INCOMPLETE;
    }
    return vk::Result::SUCCESS;
}

unsafe extern "system" fn get_physical_device_properties(
    _physical_device: vk::PhysicalDevice,
    props: *mut vk::PhysicalDeviceProperties,
) {
    let mut p = vk::PhysicalDeviceProperties::default();
    p.api_version = vk::API_VERSION_1_1;
    for (dst, src) in p.device_name.iter_mut().zip(DEVICE_NAME.bytes()) {
        *dst = src as c_char;
    }
    *props = p;
}

unsafe extern "system" fn get_physical_device_queue_family_properties(
    _physical_device: vk::PhysicalDevice,
    count: *mut u32,
    families: *mut vk::QueueFamilyProperties,
) {
    if families.is_null() {
        *count = 1;
        return;
    }
    let mut family = vk::QueueFamilyProperties::default();
    family.queue_flags = vk::QueueFlags::GRAPHICS;
    family.queue_count = 1;
    *families = family;
    *count = 1;
}

unsafe extern "system" fn create_device(
    _physical_device: vk::PhysicalDevice,
    info: *const vk::DeviceCreateInfo<'_>,
    _allocator: *const vk::AllocationCallbacks<'_>,
    device: *mut vk::Device,
) -> vk::Result {
    if (*info).queue_create_info_count == 0 {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    DEVICES_CREATED.fetch_add(1, SeqCst);
    *device = vk::Device::from_raw(DEVICE_HANDLE);
    return vk::Result::SUCCESS;
}

unsafe extern "system" fn trampoline_destroy_device(_device: vk::Device, _allocator: *const vk::AllocationCallbacks<'_>) {
    TEARDOWN.lock().unwrap().push("device via trampoline");
}

unsafe extern "system" fn driver_destroy_device(_device: vk::Device, _allocator: *const vk::AllocationCallbacks<'_>) {
    TEARDOWN.lock().unwrap().push("device");
}

unsafe extern "system" fn trampoline_wait_idle(_device: vk::Device) -> vk::Result {
    trampoline();
    return vk::Result::SUCCESS;
}

unsafe extern "system" fn driver_wait_idle(_device: vk::Device) -> vk::Result {
    driver();
    return vk::Result::SUCCESS;
}

unsafe extern "system" fn trampoline() {
    TRAMPOLINE_CALLS.fetch_add(1, SeqCst);
}

unsafe extern "system" fn driver() {
    DRIVER_CALLS.fetch_add(1, SeqCst);
}

pub unsafe extern "system" fn get_instance_proc_addr(
    instance: vk::Instance,
    name: *const c_char,
) -> vk::PFN_vkVoidFunction {
    let name = match CStr::from_ptr(name).to_str() {
        Ok(n) => n,
        Err(_) => return None,
    };
    if instance == vk::Instance::null() {
        return match name {
            "vkCreateInstance" => void_fn!(create_instance, vk::PFN_vkCreateInstance),
            "vkEnumerateInstanceVersion" => void_fn!(enumerate_instance_version, vk::PFN_vkEnumerateInstanceVersion),
            _ => None,
        };
    }
    return match name {
        "vkDestroyInstance" => void_fn!(destroy_instance, vk::PFN_vkDestroyInstance),
        "vkEnumeratePhysicalDevices" => void_fn!(enumerate_physical_devices, vk::PFN_vkEnumeratePhysicalDevices),
        "vkGetPhysicalDeviceProperties" => {
            void_fn!(get_physical_device_properties, vk::PFN_vkGetPhysicalDeviceProperties)
        }
        "vkGetPhysicalDeviceQueueFamilyProperties" => void_fn!(
            get_physical_device_queue_family_properties,
            vk::PFN_vkGetPhysicalDeviceQueueFamilyProperties
        ),
        "vkCreateDevice" => void_fn!(create_device, vk::PFN_vkCreateDevice),
        "vkGetDeviceProcAddr" => void_fn!(get_device_proc_addr, vk::PFN_vkGetDeviceProcAddr),
        "vkDestroyDevice" => void_fn!(trampoline_destroy_device, vk::PFN_vkDestroyDevice),
        "vkDeviceWaitIdle" => void_fn!(trampoline_wait_idle, vk::PFN_vkDeviceWaitIdle),
        n if is_device_command(n) => Some(trampoline as unsafe extern "system" fn()),
        _ => None,
    };
}

pub unsafe extern "system" fn get_device_proc_addr(_device: vk::Device, name: *const c_char) -> vk::PFN_vkVoidFunction {
    let name = match CStr::from_ptr(name).to_str() {
        Ok(n) => n,
        Err(_) => return None,
    };
    return match name {
        "vkDestroyDevice" => void_fn!(driver_destroy_device, vk::PFN_vkDestroyDevice),
        "vkDeviceWaitIdle" => void_fn!(driver_wait_idle, vk::PFN_vkDeviceWaitIdle),
        n if is_device_command(n) => Some(driver as unsafe extern "system" fn()),
        _ => None,
    };
}

fn is_device_command(name: &str) -> bool {
    return DispatchLoaderDynamic::DEVICE_NAMES.iter().any(|n| *n == name);
}

pub fn instance() -> vk::Instance {
    return vk::Instance::from_raw(INSTANCE_HANDLE);
}

pub fn device() -> vk::Device {
    return vk::Device::from_raw(DEVICE_HANDLE);
}
