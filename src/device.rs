// Device - resource factory and submission point
//
// Every resource is created here and keeps a shared reference to the
// backend state it needs to release itself, so resources may be dropped in
// any order relative to each other. The device state itself lives until the
// last resource created from it is gone.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::adapter::Adapter;
use crate::backend::software::SoftwareDevice;
use crate::backend::vulkan::VulkanDevice;
use crate::buffer::{Buffer, BufferDescription};
use crate::command_list::{CommandList, CommandListState, NativeCommandList};
use crate::error::{GpuError, Result};
use crate::instance::Backend;
use crate::pipeline::{Pipeline, PipelineDescription};
use crate::shader::{decode_spirv, validate_entry_point, ShaderModule, ShaderModuleDescription};
use crate::surface::Surface;
use crate::swapchain::{Swapchain, SwapchainDescription};

/// Identity of one device. Every resource records the device that created
/// it, and is only accepted by that device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct DeviceId(u64);

impl DeviceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// `InvalidState` for a resource that another device created.
pub(crate) fn foreign(what: &str) -> GpuError {
    GpuError::invalid_state(format!("{what} was created by a different device"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_buffer_size: u64,
    pub min_swapchain_images: u32,
    /// 0 means the backend imposes no upper bound.
    pub max_swapchain_images: u32,
}

pub enum Device {
    Vulkan(VulkanDevice),
    Software(SoftwareDevice),
}

impl Device {
    pub fn backend(&self) -> Backend {
        match self {
            Device::Vulkan(_) => Backend::Vulkan,
            Device::Software(_) => Backend::Software,
        }
    }

    /// The adapter this device was created on.
    pub fn adapter(&self) -> &Adapter {
        match self {
            Device::Vulkan(d) => d.adapter(),
            Device::Software(d) => d.adapter(),
        }
    }

    pub(crate) fn id(&self) -> DeviceId {
        match self {
            Device::Vulkan(d) => d.id(),
            Device::Software(d) => d.id(),
        }
    }

    pub fn limits(&self) -> DeviceLimits {
        match self {
            Device::Vulkan(d) => d.limits(),
            Device::Software(d) => d.limits(),
        }
    }

    pub fn as_software(&self) -> Option<&SoftwareDevice> {
        match self {
            Device::Software(d) => Some(d),
            Device::Vulkan(_) => None,
        }
    }

    pub fn create_swapchain(&self, desc: &SwapchainDescription, surface: &Surface) -> Result<Swapchain> {
        if surface.backend() != self.backend() {
            return Err(GpuError::IncompatibleSurface {
                expected: self.backend().name(),
                surface: surface.backend().name(),
            });
        }
        if desc.size.is_empty() {
            return Err(GpuError::invalid_description(format!("swapchain size {} is empty", desc.size)));
        }
        if !desc.format.is_color_target() {
            return Err(GpuError::invalid_description(format!(
                "{:?} cannot be used for swapchain images",
                desc.format
            )));
        }

        match (self, surface) {
            (Device::Vulkan(d), Surface::Vulkan(s)) => d.create_swapchain(desc, s).map(Swapchain::Vulkan),
            (Device::Software(d), Surface::Software(s)) => d.create_swapchain(desc, s).map(Swapchain::Software),
            _ => unreachable!("surface backend checked above"),
        }
    }

    pub fn create_command_list(&self) -> Result<CommandList> {
        let native = match self {
            Device::Vulkan(d) => NativeCommandList::Vulkan(d.create_command_list()?),
            Device::Software(d) => NativeCommandList::Software(d.create_command_list()),
        };
        Ok(CommandList::new(native))
    }

    /// Create a buffer. When `initial_data` is given it is copied in before
    /// this returns; bytes past its end are zero.
    pub fn create_buffer(&self, desc: &BufferDescription, initial_data: Option<&[u8]>) -> Result<Buffer> {
        desc.validate(initial_data, &self.limits())?;
        match self {
            Device::Vulkan(d) => d.create_buffer(desc, initial_data).map(Buffer::Vulkan),
            Device::Software(d) => d.create_buffer(desc, initial_data).map(Buffer::Software),
        }
    }

    pub fn create_shader_module(&self, desc: &ShaderModuleDescription) -> Result<ShaderModule> {
        let words = decode_spirv(&desc.bytecode)?;
        validate_entry_point(&desc.entry_point)?;
        match self {
            Device::Vulkan(d) => d.create_shader_module(desc, &words).map(ShaderModule::Vulkan),
            Device::Software(d) => d.create_shader_module(desc, words).map(ShaderModule::Software),
        }
    }

    pub fn create_pipeline(&self, desc: &PipelineDescription<'_>) -> Result<Pipeline> {
        desc.validate()?;
        for module in [desc.vertex_shader, desc.fragment_shader] {
            if module.backend() != self.backend() {
                return Err(GpuError::invalid_state(format!(
                    "shader module from the {} backend passed to a {} device",
                    module.backend().name(),
                    self.backend().name()
                )));
            }
            if module.device_id() != self.id() {
                return Err(foreign("shader module"));
            }
        }
        match self {
            Device::Vulkan(d) => d.create_pipeline(desc).map(Pipeline::Vulkan),
            Device::Software(d) => d.create_pipeline(desc).map(Pipeline::Software),
        }
    }

    /// Hand a recorded list to the device queue.
    ///
    /// A list that never recorded anything fails with `NullArgument`; one
    /// that is still recording or was already submitted fails with
    /// `InvalidState`, as does a list created by another device. Rejected
    /// submissions leave the device untouched.
    pub fn submit_command_list(&self, list: &mut CommandList) -> Result<()> {
        if list.backend() != self.backend() {
            return Err(GpuError::invalid_state(format!(
                "command list from the {} backend submitted to a {} device",
                list.backend().name(),
                self.backend().name()
            )));
        }
        if list.device_id() != self.id() {
            return Err(foreign("command list"));
        }
        list.state.check_submittable()?;

        match (self, &mut list.native) {
            (Device::Vulkan(d), NativeCommandList::Vulkan(l)) => d.submit_command_list(l)?,
            (Device::Software(d), NativeCommandList::Software(l)) => d.submit_command_list(l)?,
            _ => unreachable!("command list backend checked above"),
        }
        list.state = CommandListState::Submitted;
        Ok(())
    }

    /// Block until all submitted work has finished.
    pub fn wait_idle(&self) -> Result<()> {
        match self {
            Device::Vulkan(d) => d.wait_idle(),
            Device::Software(d) => d.wait_idle(),
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("backend", &self.backend())
            .field("adapter", &self.adapter().name)
            .finish()
    }
}
