// Vulkan device - queues, command pool, allocator
//
// Responsibilities:
// - Queue family selection (graphics, plus present when a surface is given)
// - Logical device with swapchain + dynamic rendering
// - Memory allocator and the shared command pool
// - One-time submissions for uploads and layout transitions

use std::ffi::{c_char, CStr};
use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;

use crate::adapter::Adapter;
use crate::buffer::BufferDescription;
use crate::device::{DeviceId, DeviceLimits};
use crate::error::{GpuError, Result};
use crate::pipeline::PipelineDescription;
use crate::shader::ShaderModuleDescription;
use crate::swapchain::SwapchainDescription;

use super::buffer::VulkanBuffer;
use super::command_list::VulkanCommandList;
use super::instance::InstanceShared;
use super::pipeline::VulkanPipeline;
use super::result::{translate_allocation, VkResultExt};
use super::shader::VulkanShaderModule;
use super::surface::VulkanSurface;
use super::swapchain::VulkanSwapchain;
use super::sync;

const REQUIRED_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME, ash::khr::dynamic_rendering::NAME];

pub(crate) struct DeviceShared {
    pub id: DeviceId,
    pub instance: Arc<InstanceShared>,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub dynamic_rendering: ash::khr::dynamic_rendering::Device,

    pub graphics_queue: vk::Queue,
    pub graphics_family: u32,
    pub present_queue: vk::Queue,
    pub present_family: u32,
    /// Queue submission and presentation need external synchronization.
    pub queue_lock: Mutex<()>,

    pub command_pool: Mutex<vk::CommandPool>,
    pub allocator: ManuallyDrop<Mutex<Allocator>>,
}

impl DeviceShared {
    pub fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer> {
        let pool = self.command_pool.lock();
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&info) }.or_gpu("allocate command buffer")?;
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::backend("allocate command buffer", "driver returned no command buffer"))
    }

    pub fn free_command_buffer(&self, buffer: vk::CommandBuffer) {
        let pool = self.command_pool.lock();
        unsafe { self.device.free_command_buffers(*pool, &[buffer]) };
    }

    pub fn submit(&self, buffer: vk::CommandBuffer, fence: vk::Fence) -> Result<()> {
        let buffers = [buffer];
        let submit = vk::SubmitInfo::default().command_buffers(&buffers);
        let _queue = self.queue_lock.lock();
        unsafe { self.device.queue_submit(self.graphics_queue, &[submit], fence) }.or_gpu("queue submit")
    }

    /// Record with `record`, submit to the graphics queue and wait for it.
    pub fn one_time_submit<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let buffer = self.allocate_command_buffer()?;
        let result = self.record_and_wait(buffer, record);
        self.free_command_buffer(buffer);
        result
    }

    fn record_and_wait<F>(&self, buffer: vk::CommandBuffer, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let begin = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(buffer, &begin) }.or_gpu("begin command buffer")?;
        record(&self.device, buffer);
        unsafe { self.device.end_command_buffer(buffer) }.or_gpu("end command buffer")?;

        let fence = sync::create_fence(&self.device, false)?;
        let result = self.submit(buffer, fence).and_then(|_| sync::wait(&self.device, fence));
        unsafe { self.device.destroy_fence(fence, None) };
        result
    }

    pub fn wait_idle(&self) -> Result<()> {
        let _queue = self.queue_lock.lock();
        unsafe { self.device.device_wait_idle() }.or_gpu("wait idle")
    }
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device");
        if let Err(e) = self.wait_idle() {
            log::error!("Device did not go idle before destruction: {e}");
        }
        unsafe {
            // Allocations are freed by their owners; the allocator itself
            // must go before the device.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_command_pool(*self.command_pool.get_mut(), None);
            self.device.destroy_device(None);
        }
    }
}

pub struct VulkanDevice {
    shared: Arc<DeviceShared>,
    adapter: Adapter,
    max_buffer_size: u64,
}

struct QueueFamilies {
    graphics: u32,
    present: u32,
}

impl VulkanDevice {
    pub(crate) fn new(
        instance: Arc<InstanceShared>,
        physical_device: vk::PhysicalDevice,
        adapter: Adapter,
        surface: Option<&VulkanSurface>,
    ) -> Result<Self> {
        let raw = &instance.instance;
        Self::check_extensions(raw, physical_device, &adapter)?;
        let families = Self::select_queue_families(&instance, physical_device, &adapter, surface)?;

        let priorities = [1.0];
        let mut queue_infos = vec![vk::DeviceQueueCreateInfo::default()
            .queue_family_index(families.graphics)
            .queue_priorities(&priorities)];
        if families.present != families.graphics {
            queue_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(families.present)
                    .queue_priorities(&priorities),
            );
        }

        let supported = unsafe { raw.get_physical_device_features(physical_device) };
        let features = vk::PhysicalDeviceFeatures::default()
            .fill_mode_non_solid(supported.fill_mode_non_solid == vk::TRUE)
            .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE)
            .geometry_shader(supported.geometry_shader == vk::TRUE);
        let mut dynamic_rendering = vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true);

        let extensions: Vec<*const c_char> = REQUIRED_EXTENSIONS.iter().map(|e| e.as_ptr()).collect();
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features)
            .push_next(&mut dynamic_rendering);

        let device = unsafe { raw.create_device(physical_device, &create_info, None) }.or_gpu("create device")?;
        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(families.graphics)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(super::result::translate("create command pool", e));
            }
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: raw.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(a) => a,
            Err(e) => {
                unsafe {
                    device.destroy_command_pool(command_pool, None);
                    device.destroy_device(None);
                }
                return Err(translate_allocation("create allocator", e));
            }
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(raw, &device);
        let dynamic_rendering = ash::khr::dynamic_rendering::Device::new(raw, &device);

        let memory = unsafe { raw.get_physical_device_memory_properties(physical_device) };
        let max_buffer_size = memory.memory_heaps[..memory.memory_heap_count as usize]
            .iter()
            .map(|h| h.size)
            .max()
            .unwrap_or(0);

        log::info!(
            "Vulkan device created on {} (graphics family {}, present family {})",
            adapter,
            families.graphics,
            families.present
        );

        Ok(Self {
            shared: Arc::new(DeviceShared {
                id: DeviceId::next(),
                instance,
                physical_device,
                device,
                swapchain_loader,
                dynamic_rendering,
                graphics_queue,
                graphics_family: families.graphics,
                present_queue,
                present_family: families.present,
                queue_lock: Mutex::new(()),
                command_pool: Mutex::new(command_pool),
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
            }),
            adapter,
            max_buffer_size,
        })
    }

    fn check_extensions(raw: &ash::Instance, physical_device: vk::PhysicalDevice, adapter: &Adapter) -> Result<()> {
        let supported = unsafe { raw.enumerate_device_extension_properties(physical_device) }
            .or_gpu("enumerate device extensions")?;
        for required in REQUIRED_EXTENSIONS {
            let found = supported
                .iter()
                .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == *required));
            if !found {
                return Err(GpuError::BackendUnavailable(format!(
                    "adapter {} does not support {:?}",
                    adapter.name, required
                )));
            }
        }
        Ok(())
    }

    /// A graphics family that can also present is preferred; otherwise
    /// present goes through a separate family.
    fn select_queue_families(
        instance: &InstanceShared,
        physical_device: vk::PhysicalDevice,
        adapter: &Adapter,
        surface: Option<&VulkanSurface>,
    ) -> Result<QueueFamilies> {
        let props = unsafe { instance.instance.get_physical_device_queue_family_properties(physical_device) };
        let graphics: Vec<u32> = props
            .iter()
            .enumerate()
            .filter(|(_, p)| p.queue_count > 0 && p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|(i, _)| i as u32)
            .collect();
        let Some(&first_graphics) = graphics.first() else {
            return Err(GpuError::NoSuitableQueue(format!("{} has no graphics queue family", adapter.name)));
        };

        let Some(surface) = surface else {
            return Ok(QueueFamilies { graphics: first_graphics, present: first_graphics });
        };

        let can_present = |family: u32| {
            unsafe {
                instance.surface_loader.get_physical_device_surface_support(
                    physical_device,
                    family,
                    surface.shared.surface,
                )
            }
            .unwrap_or(false)
        };

        if let Some(&both) = graphics.iter().find(|&&f| can_present(f)) {
            return Ok(QueueFamilies { graphics: both, present: both });
        }
        let present = (0..props.len() as u32)
            .filter(|&f| props[f as usize].queue_count > 0)
            .find(|&f| can_present(f))
            .ok_or_else(|| {
                GpuError::NoSuitableQueue(format!("{} has no queue family that can present to the surface", adapter.name))
            })?;
        Ok(QueueFamilies { graphics: first_graphics, present })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub(crate) fn id(&self) -> DeviceId {
        self.shared.id
    }

    /// Swapchain image bounds come from the surface; none are imposed here.
    pub fn limits(&self) -> DeviceLimits {
        DeviceLimits { max_buffer_size: self.max_buffer_size, min_swapchain_images: 1, max_swapchain_images: 0 }
    }

    pub(crate) fn create_swapchain(
        &self,
        desc: &SwapchainDescription,
        surface: &VulkanSurface,
    ) -> Result<VulkanSwapchain> {
        VulkanSwapchain::new(Arc::clone(&self.shared), desc, surface)
    }

    pub(crate) fn create_command_list(&self) -> Result<VulkanCommandList> {
        VulkanCommandList::new(Arc::clone(&self.shared))
    }

    pub(crate) fn create_buffer(&self, desc: &BufferDescription, initial_data: Option<&[u8]>) -> Result<VulkanBuffer> {
        VulkanBuffer::new(Arc::clone(&self.shared), desc, initial_data)
    }

    pub(crate) fn create_shader_module(
        &self,
        desc: &ShaderModuleDescription,
        words: &[u32],
    ) -> Result<VulkanShaderModule> {
        VulkanShaderModule::new(Arc::clone(&self.shared), desc, words)
    }

    pub(crate) fn create_pipeline(&self, desc: &PipelineDescription<'_>) -> Result<VulkanPipeline> {
        VulkanPipeline::new(Arc::clone(&self.shared), desc)
    }

    pub(crate) fn submit_command_list(&self, list: &mut VulkanCommandList) -> Result<()> {
        list.submit()
    }

    pub(crate) fn wait_idle(&self) -> Result<()> {
        self.shared.wait_idle()
    }
}
