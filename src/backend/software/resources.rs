use std::sync::Arc;

use crate::buffer::BufferDescription;
use crate::device::DeviceId;
use crate::error::Result;
use crate::format::Format;
use crate::pipeline::VertexBufferLayout;
use crate::shader::ShaderStage;

use super::driver::{Driver, Handle};

/// Buffer backed by driver memory. Zero-sized buffers hold no native object.
pub struct SoftwareBuffer {
    driver: Arc<Driver>,
    handle: Option<Handle>,
    desc: BufferDescription,
}

impl SoftwareBuffer {
    pub(crate) fn new(driver: Arc<Driver>, desc: &BufferDescription, initial_data: Option<&[u8]>) -> Self {
        let handle = (desc.size > 0).then(|| driver.create_buffer(desc.size, initial_data));
        Self { driver, handle, desc: *desc }
    }

    pub(crate) fn handle(&self) -> Option<Handle> {
        self.handle
    }

    pub(crate) fn device_id(&self) -> DeviceId {
        self.driver.id()
    }

    pub fn description(&self) -> &BufferDescription {
        &self.desc
    }

    pub(crate) fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        match self.handle {
            Some(h) => self.driver.write_buffer(h, offset, data),
            None => Ok(()),
        }
    }

    pub(crate) fn read(&self) -> Result<Vec<u8>> {
        match self.handle {
            Some(h) => self.driver.read_buffer(h),
            None => Ok(Vec::new()),
        }
    }
}

impl Drop for SoftwareBuffer {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            self.driver.release(h);
        }
    }
}

pub struct SoftwareShaderModule {
    driver: Arc<Driver>,
    handle: Handle,
    stage: ShaderStage,
    entry_point: String,
}

impl SoftwareShaderModule {
    pub(crate) fn new(driver: Arc<Driver>, stage: ShaderStage, entry_point: &str, words: Vec<u32>) -> Self {
        let handle = driver.create_shader(stage, words);
        Self { driver, handle, stage, entry_point: entry_point.to_string() }
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle
    }

    pub(crate) fn device_id(&self) -> DeviceId {
        self.driver.id()
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

impl Drop for SoftwareShaderModule {
    fn drop(&mut self) {
        self.driver.release(self.handle);
    }
}

pub struct SoftwarePipeline {
    driver: Arc<Driver>,
    handle: Handle,
    vertex_buffers: Vec<VertexBufferLayout>,
    color_formats: Vec<Format>,
}

impl SoftwarePipeline {
    pub(crate) fn new(
        driver: Arc<Driver>,
        handle: Handle,
        vertex_buffers: Vec<VertexBufferLayout>,
        color_formats: Vec<Format>,
    ) -> Self {
        Self { driver, handle, vertex_buffers, color_formats }
    }

    pub(crate) fn handle(&self) -> Handle {
        self.handle
    }

    pub(crate) fn device_id(&self) -> DeviceId {
        self.driver.id()
    }

    pub fn vertex_buffers(&self) -> &[VertexBufferLayout] {
        &self.vertex_buffers
    }

    pub fn color_formats(&self) -> &[Format] {
        &self.color_formats
    }
}

impl Drop for SoftwarePipeline {
    fn drop(&mut self) {
        self.driver.release(self.handle);
    }
}
