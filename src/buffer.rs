// Buffers - vertex, index, uniform and storage memory
//
// A buffer is created fully initialized: initial data is copied in before
// `Device::create_buffer` returns, so it is usable by the next command list.

use bitflags::bitflags;

use crate::backend::software::SoftwareBuffer;
use crate::backend::vulkan::VulkanBuffer;
use crate::device::{DeviceId, DeviceLimits};
use crate::error::{GpuError, Result};
use crate::instance::Backend;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CpuAccess {
    /// GPU-only memory; initial data goes through a staging copy.
    #[default]
    None,
    Write,
    ReadWrite,
}

impl CpuAccess {
    pub fn can_write(self) -> bool {
        matches!(self, CpuAccess::Write | CpuAccess::ReadWrite)
    }

    pub fn can_read(self) -> bool {
        self == CpuAccess::ReadWrite
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescription {
    pub size: u64,
    pub usage: BufferUsage,
    pub cpu_access: CpuAccess,
}

impl BufferDescription {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self { size, usage, cpu_access: CpuAccess::None }
    }

    pub fn with_cpu_access(mut self, cpu_access: CpuAccess) -> Self {
        self.cpu_access = cpu_access;
        self
    }

    pub(crate) fn validate(&self, initial_data: Option<&[u8]>, limits: &DeviceLimits) -> Result<()> {
        if self.usage.is_empty() {
            return Err(GpuError::invalid_description("buffer usage must not be empty"));
        }
        if self.size > limits.max_buffer_size {
            return Err(GpuError::invalid_description(format!(
                "buffer size {} exceeds the device maximum of {}",
                self.size, limits.max_buffer_size
            )));
        }
        if let Some(data) = initial_data {
            if data.len() as u64 > self.size {
                return Err(GpuError::invalid_description(format!(
                    "initial data ({} bytes) does not fit in a {} byte buffer",
                    data.len(),
                    self.size
                )));
            }
        }
        Ok(())
    }
}

/// Fails unless `offset..offset + len` lies inside a buffer of `size` bytes.
pub(crate) fn check_range(offset: u64, len: u64, size: u64, what: &str) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(GpuError::invalid_state(format!(
            "{what}: range {offset}+{len} is outside a {size} byte buffer"
        ))),
    }
}

/// GPU buffer owned by the caller; the native allocation is released on drop.
///
/// The caller must not `write` or `read` while a submitted command list may
/// still be using the buffer.
pub enum Buffer {
    Vulkan(VulkanBuffer),
    Software(SoftwareBuffer),
}

impl Buffer {
    pub fn backend(&self) -> Backend {
        match self {
            Buffer::Vulkan(_) => Backend::Vulkan,
            Buffer::Software(_) => Backend::Software,
        }
    }

    pub(crate) fn device_id(&self) -> DeviceId {
        match self {
            Buffer::Vulkan(b) => b.device_id(),
            Buffer::Software(b) => b.device_id(),
        }
    }

    pub fn description(&self) -> &BufferDescription {
        match self {
            Buffer::Vulkan(b) => b.description(),
            Buffer::Software(b) => b.description(),
        }
    }

    pub fn size(&self) -> u64 {
        self.description().size
    }

    /// Copy `data` into the buffer at `offset`. Requires CPU write access.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let desc = *self.description();
        if !desc.cpu_access.can_write() {
            return Err(GpuError::invalid_state("buffer was created without CPU write access"));
        }
        check_range(offset, data.len() as u64, desc.size, "buffer write")?;
        match self {
            Buffer::Vulkan(b) => b.write(offset, data),
            Buffer::Software(b) => b.write(offset, data),
        }
    }

    /// Read back the whole buffer. Requires `CpuAccess::ReadWrite`.
    pub fn read(&self) -> Result<Vec<u8>> {
        if !self.description().cpu_access.can_read() {
            return Err(GpuError::invalid_state("buffer was created without CPU read access"));
        }
        match self {
            Buffer::Vulkan(b) => b.read(),
            Buffer::Software(b) => b.read(),
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("backend", &self.backend())
            .field("description", self.description())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> DeviceLimits {
        DeviceLimits { max_buffer_size: 1024, min_swapchain_images: 1, max_swapchain_images: 3 }
    }

    #[test]
    fn validate_rejects_oversized_initial_data() {
        let desc = BufferDescription::new(4, BufferUsage::VERTEX);
        assert!(desc.validate(Some(&[0; 4]), &limits()).is_ok());
        assert!(matches!(
            desc.validate(Some(&[0; 5]), &limits()),
            Err(GpuError::InvalidDescription(_))
        ));
    }

    #[test]
    fn validate_enforces_device_maximum() {
        let desc = BufferDescription::new(1025, BufferUsage::STORAGE);
        assert!(desc.validate(None, &limits()).is_err());
        let empty_usage = BufferDescription::new(16, BufferUsage::empty());
        assert!(empty_usage.validate(None, &limits()).is_err());
    }

    #[test]
    fn zero_sized_buffers_are_valid() {
        let desc = BufferDescription::new(0, BufferUsage::UNIFORM);
        assert!(desc.validate(Some(&[]), &limits()).is_ok());
    }

    #[test]
    fn check_range_catches_overflow() {
        assert!(check_range(0, 16, 16, "t").is_ok());
        assert!(check_range(8, 9, 16, "t").is_err());
        assert!(check_range(u64::MAX, 2, 16, "t").is_err());
    }
}
