// Vulkan instance - library loading, validation, adapter enumeration
//
// The library is loaded at runtime, so a machine without a Vulkan loader
// gets `BackendUnavailable` instead of a link failure.

use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::adapter::{Adapter, AdapterSupports};
use crate::error::{GpuError, Result};
use crate::instance::InstanceDescription;

use super::conv;
use super::device::VulkanDevice;
use super::result::VkResultExt;
use super::surface::{SurfaceShared, VulkanSurface};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Surface extensions enabled whenever the loader offers them, so surfaces
/// can be created later for whatever window system the caller uses.
const SURFACE_EXTENSIONS: &[&CStr] = &[
    ash::khr::surface::NAME,
    ash::khr::win32_surface::NAME,
    ash::khr::xlib_surface::NAME,
    ash::khr::xcb_surface::NAME,
    ash::khr::wayland_surface::NAME,
    ash::khr::android_surface::NAME,
    ash::ext::metal_surface::NAME,
];

pub(crate) struct InstanceShared {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub surface_loader: ash::khr::surface::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Drop for InstanceShared {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance");
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

pub struct VulkanInstance {
    shared: Arc<InstanceShared>,
}

impl VulkanInstance {
    pub(crate) fn new(desc: &InstanceDescription) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::BackendUnavailable(format!("failed to load the Vulkan library: {e}")))?;

        let available = unsafe { entry.enumerate_instance_extension_properties(None) }
            .or_gpu("enumerate instance extensions")?;
        let has_extension = |name: &CStr| {
            available.iter().any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == name))
        };

        if !has_extension(ash::khr::surface::NAME) {
            log::warn!("Vulkan loader offers no surface extension; only headless devices will work");
        }
        let mut extensions: Vec<*const c_char> = SURFACE_EXTENSIONS
            .iter()
            .filter(|name| has_extension(name))
            .map(|name| name.as_ptr())
            .collect();

        let debug = desc.debug && has_extension(ash::ext::debug_utils::NAME);
        if desc.debug && !debug {
            log::warn!("Debug requested but VK_EXT_debug_utils is missing; validation output disabled");
        }
        if debug {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let mut flags = vk::InstanceCreateFlags::empty();
        if has_extension(ash::khr::portability_enumeration::NAME) {
            extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let layers = if debug && Self::has_validation_layer(&entry) {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            if debug {
                log::warn!("{:?} is not installed", VALIDATION_LAYER);
            }
            Vec::new()
        };

        let app_name = CString::new(desc.app_name.replace('\0', ""))
            .map_err(|e| GpuError::invalid_description(format!("application name: {e}")))?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"gpu-bridge")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers)
            .flags(flags);

        let instance = unsafe { entry.create_instance(&create_info, None) }.or_gpu("create instance")?;

        let debug_utils = if debug {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(debug_callback));
            match unsafe { loader.create_debug_utils_messenger(&info, None) } {
                Ok(messenger) => Some((loader, messenger)),
                Err(e) => {
                    log::warn!("Failed to create debug messenger: {e}");
                    None
                }
            }
        } else {
            None
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        log::info!("Vulkan instance created for {:?} (validation: {})", desc.app_name, !layers.is_empty());

        Ok(Self {
            shared: Arc::new(InstanceShared { entry, instance, surface_loader, debug_utils }),
        })
    }

    fn has_validation_layer(entry: &ash::Entry) -> bool {
        unsafe { entry.enumerate_instance_layer_properties() }
            .map(|layers| {
                layers
                    .iter()
                    .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER))
            })
            .unwrap_or(false)
    }

    pub(crate) fn physical_devices(&self) -> Result<Vec<vk::PhysicalDevice>> {
        unsafe { self.shared.instance.enumerate_physical_devices() }.or_gpu("enumerate physical devices")
    }

    pub fn enumerate_adapters(&self) -> Result<Vec<Adapter>> {
        let instance = &self.shared.instance;
        let adapters = self
            .physical_devices()?
            .into_iter()
            .enumerate()
            .map(|(index, pd)| {
                let props = unsafe { instance.get_physical_device_properties(pd) };
                let features = unsafe { instance.get_physical_device_features(pd) };
                let memory = unsafe { instance.get_physical_device_memory_properties(pd) };
                let dedicated_memory = memory.memory_heaps[..memory.memory_heap_count as usize]
                    .iter()
                    .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
                    .map(|h| h.size)
                    .sum();
                let name = props
                    .device_name_as_c_str()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| format!("Vulkan adapter {index}"));
                Adapter {
                    index,
                    name,
                    kind: conv::adapter_kind(props.device_type),
                    dedicated_memory,
                    supports: AdapterSupports {
                        geometry_shader: features.geometry_shader == vk::TRUE,
                        anisotropy: features.sampler_anisotropy == vk::TRUE,
                        max_anisotropy: props.limits.max_sampler_anisotropy,
                    },
                }
            })
            .collect();
        Ok(adapters)
    }

    pub(crate) fn create_device(&self, surface: Option<&VulkanSurface>, adapter_index: usize) -> Result<VulkanDevice> {
        let physical_devices = self.physical_devices()?;
        let adapters = self.enumerate_adapters()?;
        let (Some(&physical_device), Some(adapter)) =
            (physical_devices.get(adapter_index), adapters.into_iter().nth(adapter_index))
        else {
            return Err(GpuError::InvalidAdapterIndex { index: adapter_index, count: physical_devices.len() });
        };
        VulkanDevice::new(Arc::clone(&self.shared), physical_device, adapter, surface)
    }

    pub(crate) fn create_surface<W>(&self, window: &W) -> Result<VulkanSurface>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceLost(format!("display handle unavailable: {e}")))?;
        let handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceLost(format!("window handle unavailable: {e}")))?;
        let surface = unsafe {
            ash_window::create_surface(
                &self.shared.entry,
                &self.shared.instance,
                display.as_raw(),
                handle.as_raw(),
                None,
            )
        }
        .or_gpu("create surface")?;
        log::info!("Vulkan surface created");
        Ok(VulkanSurface { shared: Arc::new(SurfaceShared { surface, instance: Arc::clone(&self.shared) }) })
    }
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("[Vulkan {:?}] {}", message_type, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("[Vulkan {:?}] {}", message_type, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::debug!("[Vulkan {:?}] {}", message_type, message),
        _ => log::trace!("[Vulkan {:?}] {}", message_type, message),
    }

    vk::FALSE
}
