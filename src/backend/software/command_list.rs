use std::sync::Arc;

use crate::command_list::{IndexFormat, LoadOp};
use crate::device::DeviceId;
use crate::error::Result;
use crate::format::{Rect, Size2D, Viewport};

use super::driver::{Command, Driver, Handle};
use super::resources::{SoftwareBuffer, SoftwarePipeline};

/// Deferred command list: commands are collected on the CPU and turned into
/// a native list object by `end`.
pub struct SoftwareCommandList {
    driver: Arc<Driver>,
    commands: Vec<Command>,
    finished: Option<Handle>,
}

impl SoftwareCommandList {
    pub(crate) fn new(driver: Arc<Driver>) -> Self {
        Self { driver, commands: Vec::new(), finished: None }
    }

    pub(crate) fn device_id(&self) -> DeviceId {
        self.driver.id()
    }

    pub(crate) fn finished(&self) -> Option<Handle> {
        self.finished
    }

    pub(crate) fn begin(&mut self) -> Result<()> {
        if let Some(old) = self.finished.take() {
            self.driver.release(old);
        }
        self.commands.clear();
        Ok(())
    }

    pub(crate) fn end(&mut self) -> Result<()> {
        let commands = std::mem::take(&mut self.commands);
        log::trace!("Finishing software command list with {} commands", commands.len());
        self.finished = Some(self.driver.finish_command_list(commands));
        Ok(())
    }

    pub(crate) fn begin_render_pass(&mut self, targets: &[(Handle, LoadOp)], area: Size2D) {
        self.commands.push(Command::BeginRenderPass { targets: targets.to_vec(), area });
    }

    pub(crate) fn end_render_pass(&mut self) {
        self.commands.push(Command::EndRenderPass);
    }

    pub(crate) fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(Command::SetViewport(viewport));
    }

    pub(crate) fn set_scissor(&mut self, scissor: Rect) {
        self.commands.push(Command::SetScissor(scissor));
    }

    pub(crate) fn set_pipeline(&mut self, pipeline: &SoftwarePipeline) {
        self.commands.push(Command::SetPipeline(pipeline.handle()));
    }

    pub(crate) fn set_vertex_buffer(&mut self, slot: u32, buffer: &SoftwareBuffer, offset: u64) {
        if let Some(buffer) = buffer.handle() {
            self.commands.push(Command::SetVertexBuffer { slot, buffer, offset });
        }
    }

    pub(crate) fn set_index_buffer(&mut self, buffer: &SoftwareBuffer, format: IndexFormat, offset: u64) {
        if let Some(buffer) = buffer.handle() {
            self.commands.push(Command::SetIndexBuffer { buffer, format, offset });
        }
    }

    pub(crate) fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        self.commands.push(Command::Draw { vertex_count, first_vertex });
    }

    pub(crate) fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        self.commands.push(Command::DrawIndexed { index_count, first_index, base_vertex });
    }

    pub(crate) fn copy_buffer(
        &mut self,
        src: &SoftwareBuffer,
        dst: &SoftwareBuffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        if let (Some(src), Some(dst)) = (src.handle(), dst.handle()) {
            self.commands.push(Command::CopyBuffer { src, dst, src_offset, dst_offset, size });
        }
    }
}

impl Drop for SoftwareCommandList {
    fn drop(&mut self) {
        if let Some(list) = self.finished.take() {
            self.driver.release(list);
        }
    }
}
