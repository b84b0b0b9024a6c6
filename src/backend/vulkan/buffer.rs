// Buffers through gpu-allocator
//
// CPU-visible buffers are written through their persistent mapping.
// GPU-only buffers receive initial data through a staging buffer and a
// one-time copy that completes before creation returns.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use crate::buffer::{BufferDescription, CpuAccess};
use crate::device::DeviceId;
use crate::error::{GpuError, Result};

use super::conv;
use super::device::DeviceShared;
use super::result::{translate_allocation, VkResultExt};

pub(crate) struct BufferRaw {
    device: Arc<DeviceShared>,
    pub buffer: vk::Buffer,
    allocation: Mutex<Option<Allocation>>,
}

impl BufferRaw {
    fn new(
        device: Arc<DeviceShared>,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self> {
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.device.create_buffer(&info, None) }.or_gpu("create buffer")?;
        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator.lock().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        // From here on, Drop cleans up whatever exists.
        let raw = Self { device, buffer, allocation: Mutex::new(None) };
        let allocation = allocation.map_err(|e| translate_allocation("allocate buffer memory", e))?;
        let bound = unsafe {
            raw.device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        }
        .or_gpu("bind buffer memory");
        *raw.allocation.lock() = Some(allocation);
        bound?;
        Ok(raw)
    }

    fn with_mapping<T>(&self, f: impl FnOnce(&mut [u8]) -> T) -> Result<T> {
        let mut allocation = self.allocation.lock();
        let mapped = allocation
            .as_mut()
            .and_then(|a| a.mapped_slice_mut())
            .ok_or_else(|| GpuError::invalid_state("buffer memory is not host-mapped"))?;
        Ok(f(mapped))
    }
}

impl Drop for BufferRaw {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.get_mut().take() {
            if let Err(e) = self.device.allocator.lock().free(allocation) {
                log::error!("Failed to free buffer memory: {e}");
            }
        }
        unsafe { self.device.device.destroy_buffer(self.buffer, None) };
    }
}

/// A zero-sized buffer has no native buffer or memory behind it.
pub struct VulkanBuffer {
    device: DeviceId,
    raw: Option<Arc<BufferRaw>>,
    desc: BufferDescription,
}

impl VulkanBuffer {
    pub(crate) fn new(
        device: Arc<DeviceShared>,
        desc: &BufferDescription,
        initial_data: Option<&[u8]>,
    ) -> Result<Self> {
        if desc.size == 0 {
            return Ok(Self { device: device.id, raw: None, desc: *desc });
        }

        let location = match desc.cpu_access {
            CpuAccess::None => MemoryLocation::GpuOnly,
            CpuAccess::Write => MemoryLocation::CpuToGpu,
            CpuAccess::ReadWrite => MemoryLocation::GpuToCpu,
        };
        let mut usage = conv::buffer_usage(desc.usage);
        let staged = location == MemoryLocation::GpuOnly && initial_data.is_some();
        if staged {
            usage |= vk::BufferUsageFlags::TRANSFER_DST;
        }

        let raw = BufferRaw::new(Arc::clone(&device), desc.size, usage, location, "buffer")?;

        match initial_data {
            Some(data) if staged => Self::upload_staged(&device, &raw, data, desc.size)?,
            Some(data) => raw.with_mapping(|mapped| {
                mapped[..data.len()].copy_from_slice(data);
                mapped[data.len()..desc.size as usize].fill(0);
            })?,
            None => {}
        }

        log::debug!("Vulkan buffer created: {} bytes, {:?}, {:?}", desc.size, desc.usage, location);
        Ok(Self { device: device.id, raw: Some(Arc::new(raw)), desc: *desc })
    }

    /// Copies `data` zero-padded to `size` bytes through a staging buffer.
    fn upload_staged(device: &Arc<DeviceShared>, dst: &BufferRaw, data: &[u8], size: u64) -> Result<()> {
        let staging = BufferRaw::new(
            Arc::clone(device),
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "staging",
        )?;
        staging.with_mapping(|mapped| {
            mapped[..data.len()].copy_from_slice(data);
            mapped[data.len()..size as usize].fill(0);
        })?;

        let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size };
        device.one_time_submit(|d, cb| unsafe { d.cmd_copy_buffer(cb, staging.buffer, dst.buffer, &[region]) })
    }

    pub(crate) fn raw(&self) -> Option<&Arc<BufferRaw>> {
        self.raw.as_ref()
    }

    pub(crate) fn device_id(&self) -> DeviceId {
        self.device
    }

    pub fn description(&self) -> &BufferDescription {
        &self.desc
    }

    pub(crate) fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let Some(raw) = &self.raw else { return Ok(()) };
        let start = offset as usize;
        raw.with_mapping(|mapped| mapped[start..start + data.len()].copy_from_slice(data))
    }

    pub(crate) fn read(&self) -> Result<Vec<u8>> {
        let Some(raw) = &self.raw else { return Ok(Vec::new()) };
        let size = self.desc.size as usize;
        raw.with_mapping(|mapped| mapped[..size].to_vec())
    }
}
