use std::sync::Arc;

use crate::adapter::Adapter;
use crate::buffer::BufferDescription;
use crate::device::{DeviceId, DeviceLimits};
use crate::error::{GpuError, Result};
use crate::instance::InstanceDescription;
use crate::pipeline::PipelineDescription;
use crate::shader::{ShaderModule, ShaderModuleDescription};
use crate::swapchain::SwapchainDescription;

use super::command_list::SoftwareCommandList;
use super::driver::{self, Driver, DriverReport, PipelineObject};
use super::resources::{SoftwareBuffer, SoftwarePipeline, SoftwareShaderModule};
use super::surface::SoftwareSurface;
use super::swapchain::SoftwareSwapchain;

pub struct SoftwareInstance {
    app_name: String,
    debug: bool,
}

impl SoftwareInstance {
    pub(crate) fn new(desc: &InstanceDescription) -> Self {
        log::info!("Software instance created for {:?}", desc.app_name);
        Self { app_name: desc.app_name.clone(), debug: desc.debug }
    }

    pub fn enumerate_adapters(&self) -> Result<Vec<Adapter>> {
        Ok(driver::enumerate_adapters())
    }

    pub(crate) fn create_device(&self, adapter_index: usize) -> Result<SoftwareDevice> {
        let mut adapters = driver::enumerate_adapters();
        if adapter_index >= adapters.len() {
            return Err(GpuError::InvalidAdapterIndex { index: adapter_index, count: adapters.len() });
        }
        let adapter = adapters.swap_remove(adapter_index);
        log::info!("Software device created on {} for {:?}", adapter.name, self.app_name);
        Ok(SoftwareDevice { driver: Arc::new(Driver::new(self.debug)), adapter })
    }
}

pub struct SoftwareDevice {
    driver: Arc<Driver>,
    adapter: Adapter,
}

impl SoftwareDevice {
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    pub(crate) fn id(&self) -> DeviceId {
        self.driver.id()
    }

    pub fn limits(&self) -> DeviceLimits {
        DeviceLimits {
            max_buffer_size: driver::MAX_BUFFER_SIZE,
            min_swapchain_images: driver::MIN_SWAP_CHAIN_BUFFERS,
            max_swapchain_images: driver::MAX_SWAP_CHAIN_BUFFERS,
        }
    }

    /// Live objects, release history and context counters of this device.
    pub fn report(&self) -> DriverReport {
        self.driver.report()
    }

    pub(crate) fn create_swapchain(
        &self,
        desc: &SwapchainDescription,
        surface: &SoftwareSurface,
    ) -> Result<SoftwareSwapchain> {
        SoftwareSwapchain::new(Arc::clone(&self.driver), desc, surface)
    }

    pub(crate) fn create_command_list(&self) -> SoftwareCommandList {
        SoftwareCommandList::new(Arc::clone(&self.driver))
    }

    pub(crate) fn create_buffer(
        &self,
        desc: &BufferDescription,
        initial_data: Option<&[u8]>,
    ) -> Result<SoftwareBuffer> {
        Ok(SoftwareBuffer::new(Arc::clone(&self.driver), desc, initial_data))
    }

    pub(crate) fn create_shader_module(
        &self,
        desc: &ShaderModuleDescription,
        words: Vec<u32>,
    ) -> Result<SoftwareShaderModule> {
        Ok(SoftwareShaderModule::new(Arc::clone(&self.driver), desc.stage, &desc.entry_point, words))
    }

    pub(crate) fn create_pipeline(&self, desc: &PipelineDescription<'_>) -> Result<SoftwarePipeline> {
        let (ShaderModule::Software(vs), ShaderModule::Software(fs)) = (desc.vertex_shader, desc.fragment_shader)
        else {
            return Err(GpuError::invalid_state("pipeline shaders must come from the software backend"));
        };
        let handle = self.driver.create_pipeline(PipelineObject {
            vertex_shader: vs.handle(),
            fragment_shader: fs.handle(),
            vertex_buffers: desc.vertex_buffers.clone(),
            topology: desc.topology,
            color_formats: desc.color_formats.clone(),
        })?;
        log::debug!("Software pipeline {} created ({:?})", handle, desc.topology);
        Ok(SoftwarePipeline::new(
            Arc::clone(&self.driver),
            handle,
            desc.vertex_buffers.clone(),
            desc.color_formats.clone(),
        ))
    }

    /// Execute on the immediate context. Work is complete when this returns.
    pub(crate) fn submit_command_list(&self, list: &mut SoftwareCommandList) -> Result<()> {
        let native = list
            .finished()
            .ok_or(GpuError::NullArgument("command list has no native list"))?;
        self.driver.execute_command_list(native)
    }

    pub(crate) fn wait_idle(&self) -> Result<()> {
        Ok(())
    }
}
