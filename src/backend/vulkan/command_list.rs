// Command buffers with a fence each
//
// Re-recording waits for the previous submission of the same list. The
// list keeps the buffers and pipelines it references alive until it is
// re-recorded or dropped.

use std::sync::Arc;

use ash::vk;

use crate::command_list::{IndexFormat, LoadOp};
use crate::device::DeviceId;
use crate::error::Result;
use crate::format::{Rect, Size2D, Viewport};

use super::buffer::{BufferRaw, VulkanBuffer};
use super::conv;
use super::device::DeviceShared;
use super::pipeline::{PipelineRaw, VulkanPipeline};
use super::result::VkResultExt;
use super::sync;

pub struct VulkanCommandList {
    device: Arc<DeviceShared>,
    buffer: vk::CommandBuffer,
    fence: vk::Fence,
    in_flight: bool,
    retained_buffers: Vec<Arc<BufferRaw>>,
    retained_pipelines: Vec<Arc<PipelineRaw>>,
}

impl VulkanCommandList {
    pub(crate) fn new(device: Arc<DeviceShared>) -> Result<Self> {
        let buffer = device.allocate_command_buffer()?;
        let fence = match sync::create_fence(&device.device, true) {
            Ok(fence) => fence,
            Err(e) => {
                device.free_command_buffer(buffer);
                return Err(e);
            }
        };
        Ok(Self {
            device,
            buffer,
            fence,
            in_flight: false,
            retained_buffers: Vec::new(),
            retained_pipelines: Vec::new(),
        })
    }

    pub(crate) fn device_id(&self) -> DeviceId {
        self.device.id
    }

    fn wait_if_in_flight(&mut self) -> Result<()> {
        if self.in_flight {
            sync::wait(&self.device.device, self.fence)?;
            self.in_flight = false;
        }
        Ok(())
    }

    pub(crate) fn begin(&mut self) -> Result<()> {
        self.wait_if_in_flight()?;
        self.retained_buffers.clear();
        self.retained_pipelines.clear();
        let device = &self.device.device;
        unsafe { device.reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty()) }
            .or_gpu("reset command buffer")?;
        let info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(self.buffer, &info) }.or_gpu("begin command buffer")
    }

    pub(crate) fn end(&mut self) -> Result<()> {
        unsafe { self.device.device.end_command_buffer(self.buffer) }.or_gpu("end command buffer")
    }

    pub(crate) fn submit(&mut self) -> Result<()> {
        sync::reset(&self.device.device, self.fence)?;
        self.device.submit(self.buffer, self.fence)?;
        self.in_flight = true;
        Ok(())
    }

    /// Binds every target with its load op. Viewport and scissor default to
    /// the full render area.
    pub(crate) fn begin_render_pass(&mut self, targets: &[(vk::ImageView, LoadOp)], area: Size2D) {
        let attachments: Vec<vk::RenderingAttachmentInfo> = targets
            .iter()
            .map(|(view, load)| {
                let info = vk::RenderingAttachmentInfo::default()
                    .image_view(*view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .store_op(vk::AttachmentStoreOp::STORE);
                match load {
                    LoadOp::Clear(color) => {
                        info.load_op(vk::AttachmentLoadOp::CLEAR).clear_value(conv::clear_value(*color))
                    }
                    LoadOp::Load => info.load_op(vk::AttachmentLoadOp::LOAD),
                }
            })
            .collect();
        let render_area = vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent: conv::extent(area) };
        let info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&attachments);
        unsafe {
            self.device.dynamic_rendering.cmd_begin_rendering(self.buffer, &info);
        }
        self.set_viewport(Viewport::from_size(area));
        self.set_scissor(Rect { x: 0, y: 0, width: area.width, height: area.height });
    }

    pub(crate) fn end_render_pass(&mut self) {
        unsafe { self.device.dynamic_rendering.cmd_end_rendering(self.buffer) };
    }

    pub(crate) fn set_viewport(&mut self, viewport: Viewport) {
        unsafe { self.device.device.cmd_set_viewport(self.buffer, 0, &[conv::viewport(viewport)]) };
    }

    pub(crate) fn set_scissor(&mut self, scissor: Rect) {
        unsafe { self.device.device.cmd_set_scissor(self.buffer, 0, &[conv::rect(scissor)]) };
    }

    pub(crate) fn set_pipeline(&mut self, pipeline: &VulkanPipeline) {
        let raw = pipeline.raw();
        unsafe {
            self.device
                .device
                .cmd_bind_pipeline(self.buffer, vk::PipelineBindPoint::GRAPHICS, raw.pipeline)
        };
        self.retained_pipelines.push(Arc::clone(raw));
    }

    pub(crate) fn set_vertex_buffer(&mut self, slot: u32, buffer: &VulkanBuffer, offset: u64) {
        let Some(raw) = buffer.raw() else { return };
        unsafe {
            self.device
                .device
                .cmd_bind_vertex_buffers(self.buffer, slot, &[raw.buffer], &[offset])
        };
        self.retained_buffers.push(Arc::clone(raw));
    }

    pub(crate) fn set_index_buffer(&mut self, buffer: &VulkanBuffer, format: IndexFormat, offset: u64) {
        let Some(raw) = buffer.raw() else { return };
        unsafe {
            self.device
                .device
                .cmd_bind_index_buffer(self.buffer, raw.buffer, offset, conv::index_type(format))
        };
        self.retained_buffers.push(Arc::clone(raw));
    }

    pub(crate) fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        unsafe { self.device.device.cmd_draw(self.buffer, vertex_count, 1, first_vertex, 0) };
    }

    pub(crate) fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) {
        unsafe {
            self.device
                .device
                .cmd_draw_indexed(self.buffer, index_count, 1, first_index, base_vertex, 0)
        };
    }

    /// Copy followed by a barrier so later commands in the list see it.
    pub(crate) fn copy_buffer(
        &mut self,
        src: &VulkanBuffer,
        dst: &VulkanBuffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        let (Some(s), Some(d)) = (src.raw(), dst.raw()) else { return };
        let region = vk::BufferCopy { src_offset, dst_offset, size };
        let barrier = vk::MemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE | vk::AccessFlags::HOST_READ);
        unsafe {
            let device = &self.device.device;
            device.cmd_copy_buffer(self.buffer, s.buffer, d.buffer, &[region]);
            device.cmd_pipeline_barrier(
                self.buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::ALL_COMMANDS | vk::PipelineStageFlags::HOST,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            );
        }
        self.retained_buffers.push(Arc::clone(s));
        self.retained_buffers.push(Arc::clone(d));
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        if let Err(e) = self.wait_if_in_flight() {
            log::error!("Command list dropped while its submission failed to finish: {e}");
        }
        self.device.free_command_buffer(self.buffer);
        unsafe { self.device.device.destroy_fence(self.fence, None) };
    }
}
