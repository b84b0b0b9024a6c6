use std::ffi::{CStr, CString};
use std::sync::Arc;

use ash::vk;

use crate::device::DeviceId;
use crate::error::{GpuError, Result};
use crate::shader::{ShaderModuleDescription, ShaderStage};

use super::device::DeviceShared;

pub struct VulkanShaderModule {
    device: Arc<DeviceShared>,
    pub(crate) module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl VulkanShaderModule {
    pub(crate) fn new(device: Arc<DeviceShared>, desc: &ShaderModuleDescription, words: &[u32]) -> Result<Self> {
        let entry_point = CString::new(desc.entry_point.as_str())
            .map_err(|e| GpuError::ShaderCompilationError(format!("entry point: {e}")))?;
        let info = vk::ShaderModuleCreateInfo::default().code(words);
        let module = unsafe { device.device.create_shader_module(&info, None) }.map_err(|e| match e {
            vk::Result::ERROR_INVALID_SHADER_NV => GpuError::ShaderCompilationError(e.to_string()),
            other => super::result::translate("create shader module", other),
        })?;
        log::debug!("Vulkan shader module created ({:?}, {} words)", desc.stage, words.len());
        Ok(Self { device, module, stage: desc.stage, entry_point })
    }

    pub(crate) fn device_id(&self) -> DeviceId {
        self.device.id
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn entry_point(&self) -> &str {
        self.entry_point.to_str().unwrap_or_default()
    }

    pub(crate) fn entry_point_c(&self) -> &CStr {
        &self.entry_point
    }
}

impl Drop for VulkanShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_shader_module(self.module, None) };
    }
}
