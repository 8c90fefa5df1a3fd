// Dynamic dispatch table for Vulkan commands.
// Every command is a nullable function pointer slot filled in through
// vkGetInstanceProcAddr and, once a device exists, vkGetDeviceProcAddr.
// Nothing is linked statically.

use crate::loader::ProcSource;
use crate::{check, Error, Result};
use ash::vk;
use log::warn;
use std::ffi::{c_char, CString};
use std::fmt;
use std::mem;
use std::ptr::{null, null_mut};

macro_rules! cname {
    ($name:literal) => {
        concat!($name, "\0").as_ptr() as *const c_char
    };
}

unsafe fn resolve<T: Copy>(f: vk::PFN_vkVoidFunction) -> Option<T> {
    return f.map(|p| {
        debug_assert_eq!(mem::size_of::<T>(), mem::size_of_val(&p));
        mem::transmute_copy::<unsafe extern "system" fn(), T>(&p)
    });
}

// Give up on a device list that keeps changing under us.
pub const ENUMERATE_ATTEMPTS: usize = 8;

fn slot<T>(f: Option<T>, name: &'static str) -> Result<T> {
    return match f {
        Some(f) => Ok(f),
        None => Err(Error::MissingEntryPoint(name)),
    };
}

// Declares the table and the three loading passes from a single command
// list, so fields, loading and slot order always agree.
macro_rules! dispatch_table {
    (
        global { $($g:ident: $gpfn:ident = $gname:literal,)* }
        instance { $($i:ident: $ipfn:ident = $iname:literal,)* }
        device { $($d:ident: $dpfn:ident = $dname:literal,)* }
    ) => {
        #[derive(Clone, Copy, Default)]
        pub struct DispatchLoaderDynamic {
            pub get_instance_proc_addr: Option<vk::PFN_vkGetInstanceProcAddr>,
            pub get_device_proc_addr: Option<vk::PFN_vkGetDeviceProcAddr>,
            $(pub $g: Option<vk::$gpfn>,)*
            $(pub $i: Option<vk::$ipfn>,)*
            $(pub $d: Option<vk::$dpfn>,)*
        }

        impl DispatchLoaderDynamic {
            // Command names in slot order.
            pub const NAMES: &'static [&'static str] = &[
                "vkGetInstanceProcAddr",
                "vkGetDeviceProcAddr",
                $($gname,)*
                $($iname,)*
                $($dname,)*
            ];

            // Names of the commands that get re-resolved per device.
            pub const DEVICE_NAMES: &'static [&'static str] = &[$($dname,)*];

            unsafe fn load_global(&mut self, gipa: vk::PFN_vkGetInstanceProcAddr) {
                let none = vk::Instance::null();
                $(self.$g = resolve(gipa(none, cname!($gname)));)*
            }

            // Device commands are loaded here too. Through the instance
            // they come back as loader trampolines that work for any device.
            unsafe fn load_instance(&mut self, gipa: vk::PFN_vkGetInstanceProcAddr, instance: vk::Instance) {
                $(self.$i = resolve(gipa(instance, cname!($iname)));)*
                $(self.$d = resolve(gipa(instance, cname!($dname)));)*
            }

            unsafe fn load_device(&mut self, gdpa: vk::PFN_vkGetDeviceProcAddr, device: vk::Device) {
                $(self.$d = resolve(gdpa(device, cname!($dname)));)*
            }

            // Raw address of every slot, 0 for null, in `NAMES` order.
            // Two tables compare equal exactly when these match.
            pub fn slots(&self) -> Vec<usize> {
                return vec![
                    self.get_instance_proc_addr.map_or(0, |f| f as usize),
                    self.get_device_proc_addr.map_or(0, |f| f as usize),
                    $(self.$g.map_or(0, |f| f as usize),)*
                    $(self.$i.map_or(0, |f| f as usize),)*
                    $(self.$d.map_or(0, |f| f as usize),)*
                ];
            }

            // Addresses of the per-device slots only, in `DEVICE_NAMES` order.
            pub fn device_slots(&self) -> Vec<usize> {
                return vec![$(self.$d.map_or(0, |f| f as usize),)*];
            }
        }
    };
}

dispatch_table! {
    global {
        create_instance: PFN_vkCreateInstance = "vkCreateInstance",
        enumerate_instance_extension_properties: PFN_vkEnumerateInstanceExtensionProperties = "vkEnumerateInstanceExtensionProperties",
        enumerate_instance_layer_properties: PFN_vkEnumerateInstanceLayerProperties = "vkEnumerateInstanceLayerProperties",
        enumerate_instance_version: PFN_vkEnumerateInstanceVersion = "vkEnumerateInstanceVersion",
    }
    instance {
        destroy_instance: PFN_vkDestroyInstance = "vkDestroyInstance",
        enumerate_physical_devices: PFN_vkEnumeratePhysicalDevices = "vkEnumeratePhysicalDevices",
        get_physical_device_properties: PFN_vkGetPhysicalDeviceProperties = "vkGetPhysicalDeviceProperties",
        get_physical_device_features: PFN_vkGetPhysicalDeviceFeatures = "vkGetPhysicalDeviceFeatures",
        get_physical_device_format_properties: PFN_vkGetPhysicalDeviceFormatProperties = "vkGetPhysicalDeviceFormatProperties",
        get_physical_device_queue_family_properties: PFN_vkGetPhysicalDeviceQueueFamilyProperties = "vkGetPhysicalDeviceQueueFamilyProperties",
        get_physical_device_memory_properties: PFN_vkGetPhysicalDeviceMemoryProperties = "vkGetPhysicalDeviceMemoryProperties",
        create_device: PFN_vkCreateDevice = "vkCreateDevice",
        enumerate_device_extension_properties: PFN_vkEnumerateDeviceExtensionProperties = "vkEnumerateDeviceExtensionProperties",
        enumerate_device_layer_properties: PFN_vkEnumerateDeviceLayerProperties = "vkEnumerateDeviceLayerProperties",
    }
    device {
        destroy_device: PFN_vkDestroyDevice = "vkDestroyDevice",
        get_device_queue: PFN_vkGetDeviceQueue = "vkGetDeviceQueue",
        device_wait_idle: PFN_vkDeviceWaitIdle = "vkDeviceWaitIdle",
        queue_submit: PFN_vkQueueSubmit = "vkQueueSubmit",
        queue_wait_idle: PFN_vkQueueWaitIdle = "vkQueueWaitIdle",
        allocate_memory: PFN_vkAllocateMemory = "vkAllocateMemory",
        free_memory: PFN_vkFreeMemory = "vkFreeMemory",
        map_memory: PFN_vkMapMemory = "vkMapMemory",
        unmap_memory: PFN_vkUnmapMemory = "vkUnmapMemory",
        create_buffer: PFN_vkCreateBuffer = "vkCreateBuffer",
        destroy_buffer: PFN_vkDestroyBuffer = "vkDestroyBuffer",
        get_buffer_memory_requirements: PFN_vkGetBufferMemoryRequirements = "vkGetBufferMemoryRequirements",
        bind_buffer_memory: PFN_vkBindBufferMemory = "vkBindBufferMemory",
        create_fence: PFN_vkCreateFence = "vkCreateFence",
        destroy_fence: PFN_vkDestroyFence = "vkDestroyFence",
        reset_fences: PFN_vkResetFences = "vkResetFences",
        wait_for_fences: PFN_vkWaitForFences = "vkWaitForFences",
        create_semaphore: PFN_vkCreateSemaphore = "vkCreateSemaphore",
        destroy_semaphore: PFN_vkDestroySemaphore = "vkDestroySemaphore",
        create_command_pool: PFN_vkCreateCommandPool = "vkCreateCommandPool",
        destroy_command_pool: PFN_vkDestroyCommandPool = "vkDestroyCommandPool",
        allocate_command_buffers: PFN_vkAllocateCommandBuffers = "vkAllocateCommandBuffers",
        free_command_buffers: PFN_vkFreeCommandBuffers = "vkFreeCommandBuffers",
        begin_command_buffer: PFN_vkBeginCommandBuffer = "vkBeginCommandBuffer",
        end_command_buffer: PFN_vkEndCommandBuffer = "vkEndCommandBuffer",
        cmd_copy_buffer: PFN_vkCmdCopyBuffer = "vkCmdCopyBuffer",
    }
}

impl DispatchLoaderDynamic {
    // Table with only the global commands, which need no instance.
    pub unsafe fn new(gipa: vk::PFN_vkGetInstanceProcAddr) -> DispatchLoaderDynamic {
        return Self::with_instance(gipa, vk::Instance::null());
    }

    // Pull `vkGetInstanceProcAddr` out of a loaded library and load globals.
    pub unsafe fn from_loader<S: ProcSource>(source: &S) -> Result<DispatchLoaderDynamic> {
        let gipa = slot(
            source.get::<vk::PFN_vkGetInstanceProcAddr>("vkGetInstanceProcAddr"),
            "vkGetInstanceProcAddr",
        )?;
        return Ok(Self::new(gipa));
    }

    pub unsafe fn with_instance(
        gipa: vk::PFN_vkGetInstanceProcAddr,
        instance: vk::Instance,
    ) -> DispatchLoaderDynamic {
        return Self::with_device(gipa, instance, vk::Device::null(), None);
    }

    pub unsafe fn with_device(
        gipa: vk::PFN_vkGetInstanceProcAddr,
        instance: vk::Instance,
        device: vk::Device,
        gdpa: Option<vk::PFN_vkGetDeviceProcAddr>,
    ) -> DispatchLoaderDynamic {
        let mut dld = DispatchLoaderDynamic::default();
        dld.init(gipa, instance, device, gdpa);
        return dld;
    }

    // Re-initialize in place. Every slot is overwritten, so the result is
    // identical to a table built by `with_device` from the same inputs.
    // An explicit `gdpa` wins over the one the instance reports. Device
    // commands are re-resolved only if both a device and a
    // `vkGetDeviceProcAddr` are available.
    pub unsafe fn init(
        &mut self,
        gipa: vk::PFN_vkGetInstanceProcAddr,
        instance: vk::Instance,
        device: vk::Device,
        gdpa: Option<vk::PFN_vkGetDeviceProcAddr>,
    ) {
        *self = DispatchLoaderDynamic::default();
        self.get_instance_proc_addr = Some(gipa);
        self.load_global(gipa);
        self.get_device_proc_addr = gdpa;
        if instance == vk::Instance::null() {
            return;
        }
        self.load_instance(gipa, instance);
        if self.get_device_proc_addr.is_none() {
            self.get_device_proc_addr = resolve(gipa(instance, cname!("vkGetDeviceProcAddr")));
        }
        if device != vk::Device::null() {
            match self.get_device_proc_addr {
                Some(gdpa) => self.load_device(gdpa, device),
                None => warn!("No vkGetDeviceProcAddr; device commands stay on trampolines"),
            }
        }
    }

    pub unsafe fn init_instance(&mut self, gipa: vk::PFN_vkGetInstanceProcAddr, instance: vk::Instance) {
        self.init(gipa, instance, vk::Device::null(), None);
    }

    pub fn loaded_count(&self) -> usize {
        return self.slots().iter().filter(|a| **a != 0).count();
    }

    pub fn is_empty(&self) -> bool {
        return self.loaded_count() == 0;
    }

    pub unsafe fn get_instance_proc_addr<T: Copy>(
        &self,
        instance: vk::Instance,
        name: &str,
    ) -> Result<Option<T>> {
        let gipa = slot(self.get_instance_proc_addr, "vkGetInstanceProcAddr")?;
        let cname = CString::new(name)?;
        return Ok(resolve(gipa(instance, cname.as_ptr())));
    }

    pub unsafe fn get_device_proc_addr<T: Copy>(&self, device: vk::Device, name: &str) -> Result<Option<T>> {
        let gdpa = slot(self.get_device_proc_addr, "vkGetDeviceProcAddr")?;
        let cname = CString::new(name)?;
        return Ok(resolve(gdpa(device, cname.as_ptr())));
    }

    pub unsafe fn create_instance(&self, info: &vk::InstanceCreateInfo<'_>) -> Result<vk::Instance> {
        let f = slot(self.create_instance, "vkCreateInstance")?;
        let mut instance = vk::Instance::null();
        check("vkCreateInstance", f(info, null(), &mut instance))?;
        return Ok(instance);
    }

    pub unsafe fn destroy_instance(&self, instance: vk::Instance) -> Result<()> {
        let f = slot(self.destroy_instance, "vkDestroyInstance")?;
        f(instance, null());
        return Ok(());
    }

    // Vulkan 1.0 loaders don't export vkEnumerateInstanceVersion.
    pub unsafe fn enumerate_instance_version(&self) -> Result<u32> {
        return match self.enumerate_instance_version {
            Some(f) => {
                let mut version = 0;
                check("vkEnumerateInstanceVersion", f(&mut version))?;
                Ok(version)
            }
            None => Ok(vk::API_VERSION_1_0),
        };
    }

    pub unsafe fn enumerate_physical_devices(&self, instance: vk::Instance) -> Result<Vec<vk::PhysicalDevice>> {
        const NAME: &str = "vkEnumeratePhysicalDevices";
        let f = slot(self.enumerate_physical_devices, NAME)?;
        // The count can change between the two calls; INCOMPLETE means retry.
        for _ in 0..ENUMERATE_ATTEMPTS {
            let mut count = 0u32;
            check(NAME, f(instance, &mut count, null_mut()))?;
            let mut devices = Vec::with_capacity(count as usize);
            let r = f(instance, &mut count, devices.as_mut_ptr());
            if r == vk::Result::INCOMPLETE {
                continue;
            }
            check(NAME, r)?;
            devices.set_len(count as usize);
            return Ok(devices);
        }
        warn!("{} still INCOMPLETE after {} attempts", NAME, ENUMERATE_ATTEMPTS);
        return Err(Error::Vulkan { call: NAME, result: vk::Result::INCOMPLETE });
    }

    pub unsafe fn get_physical_device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::PhysicalDeviceProperties> {
        let f = slot(self.get_physical_device_properties, "vkGetPhysicalDeviceProperties")?;
        let mut props = vk::PhysicalDeviceProperties::default();
        f(physical_device, &mut props);
        return Ok(props);
    }

    pub unsafe fn get_physical_device_queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::QueueFamilyProperties>> {
        let f = slot(
            self.get_physical_device_queue_family_properties,
            "vkGetPhysicalDeviceQueueFamilyProperties",
        )?;
        let mut count = 0u32;
        f(physical_device, &mut count, null_mut());
        let mut families = vec![vk::QueueFamilyProperties::default(); count as usize];
        f(physical_device, &mut count, families.as_mut_ptr());
        families.truncate(count as usize);
        return Ok(families);
    }

    pub unsafe fn create_device(
        &self,
        physical_device: vk::PhysicalDevice,
        info: &vk::DeviceCreateInfo<'_>,
    ) -> Result<vk::Device> {
        let f = slot(self.create_device, "vkCreateDevice")?;
        let mut device = vk::Device::null();
        check("vkCreateDevice", f(physical_device, info, null(), &mut device))?;
        return Ok(device);
    }

    pub unsafe fn destroy_device(&self, device: vk::Device) -> Result<()> {
        let f = slot(self.destroy_device, "vkDestroyDevice")?;
        f(device, null());
        return Ok(());
    }
}

impl PartialEq for DispatchLoaderDynamic {
    fn eq(&self, other: &Self) -> bool {
        return self.slots() == other.slots();
    }
}

impl Eq for DispatchLoaderDynamic {}

impl fmt::Debug for DispatchLoaderDynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let missing: Vec<&str> = Self::NAMES
            .iter()
            .zip(self.slots())
            .filter(|(_, addr)| *addr == 0)
            .map(|(name, _)| *name)
            .collect();
        return f
            .debug_struct("DispatchLoaderDynamic")
            .field("loaded", &self.loaded_count())
            .field("total", &Self::NAMES.len())
            .field("missing", &missing)
            .finish();
    }
}
