// Command lists - recorded GPU work
//
// Lifecycle: Empty -> Recording -> Recorded -> Submitted. `begin` may be
// called again from Recorded or Submitted to re-record; on the Vulkan
// backend that waits for the previous submission to finish first.
//
// The wrapper tracks binding state itself so that both backends reject the
// same mistakes at record time: draws without a pipeline, vertex ranges
// past the end of a buffer, and resources from another backend or device.
// Submission checks the list's own device.

use std::collections::HashMap;

use crate::backend::software::SoftwareCommandList;
use crate::backend::vulkan::VulkanCommandList;
use crate::buffer::{check_range, Buffer};
use crate::device::{foreign, DeviceId};
use crate::error::{GpuError, Result};
use crate::format::{ColorF, Format, Rect, Size2D, Viewport};
use crate::instance::Backend;
use crate::pipeline::{Pipeline, VertexBufferLayout, VertexStepMode};
use crate::swapchain::{NativeTexture, Texture};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandListState {
    /// Nothing has ever been recorded; there is no native list to submit.
    Empty,
    Recording,
    Recorded,
    /// Handed to the device; must be re-recorded before it can be submitted again.
    Submitted,
}

impl CommandListState {
    pub(crate) fn check_submittable(self) -> Result<()> {
        match self {
            CommandListState::Recorded => Ok(()),
            CommandListState::Empty => Err(GpuError::NullArgument("command list holds no recorded commands")),
            CommandListState::Recording => {
                Err(GpuError::invalid_state("command list is still recording; call end() first"))
            }
            CommandListState::Submitted => Err(GpuError::invalid_state(
                "command list was already submitted; record it again before resubmitting",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    Clear(ColorF),
    Load,
}

#[derive(Debug, Clone, Copy)]
pub struct ColorAttachment<'a> {
    pub texture: &'a Texture,
    pub load: LoadOp,
}

#[derive(Debug, Clone)]
pub struct RenderPassDescription<'a> {
    pub color_attachments: Vec<ColorAttachment<'a>>,
}

impl<'a> RenderPassDescription<'a> {
    /// Single attachment cleared to `color`.
    pub fn clear(texture: &'a Texture, color: ColorF) -> Self {
        Self { color_attachments: vec![ColorAttachment { texture, load: LoadOp::Clear(color) }] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn size_bytes(self) -> u64 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

pub(crate) enum NativeCommandList {
    Vulkan(VulkanCommandList),
    Software(SoftwareCommandList),
}

#[derive(Debug, Clone, Copy)]
struct BoundBuffer {
    size: u64,
    offset: u64,
}

struct BoundPipeline {
    vertex_buffers: Vec<VertexBufferLayout>,
    color_formats: Vec<Format>,
}

pub struct CommandList {
    pub(crate) native: NativeCommandList,
    pub(crate) state: CommandListState,
    pass_formats: Option<Vec<Format>>,
    pipeline: Option<BoundPipeline>,
    vertex_buffers: HashMap<u32, BoundBuffer>,
    index_buffer: Option<(BoundBuffer, IndexFormat)>,
}

fn mismatch(what: &str, expected: Backend, got: Backend) -> GpuError {
    GpuError::invalid_state(format!(
        "{what} belongs to the {} backend but the command list records for {}",
        got.name(),
        expected.name()
    ))
}

impl CommandList {
    pub(crate) fn new(native: NativeCommandList) -> Self {
        Self {
            native,
            state: CommandListState::Empty,
            pass_formats: None,
            pipeline: None,
            vertex_buffers: HashMap::new(),
            index_buffer: None,
        }
    }

    pub fn backend(&self) -> Backend {
        match self.native {
            NativeCommandList::Vulkan(_) => Backend::Vulkan,
            NativeCommandList::Software(_) => Backend::Software,
        }
    }

    pub(crate) fn device_id(&self) -> DeviceId {
        match &self.native {
            NativeCommandList::Vulkan(l) => l.device_id(),
            NativeCommandList::Software(l) => l.device_id(),
        }
    }

    pub fn state(&self) -> CommandListState {
        self.state
    }

    /// Start recording. Discards whatever was recorded before.
    pub fn begin(&mut self) -> Result<()> {
        if self.state == CommandListState::Recording {
            return Err(GpuError::invalid_state("command list is already recording"));
        }
        match &mut self.native {
            NativeCommandList::Vulkan(l) => l.begin()?,
            NativeCommandList::Software(l) => l.begin()?,
        }
        self.state = CommandListState::Recording;
        self.pass_formats = None;
        self.pipeline = None;
        self.vertex_buffers.clear();
        self.index_buffer = None;
        Ok(())
    }

    pub fn end(&mut self) -> Result<()> {
        self.require_recording("end")?;
        if self.pass_formats.is_some() {
            return Err(GpuError::invalid_state("end() called inside a render pass"));
        }
        match &mut self.native {
            NativeCommandList::Vulkan(l) => l.end()?,
            NativeCommandList::Software(l) => l.end()?,
        }
        self.state = CommandListState::Recorded;
        Ok(())
    }

    pub fn begin_render_pass(&mut self, desc: &RenderPassDescription<'_>) -> Result<()> {
        self.require_recording("begin_render_pass")?;
        if self.pass_formats.is_some() {
            return Err(GpuError::invalid_state("render passes cannot nest"));
        }
        if desc.color_attachments.is_empty() {
            return Err(GpuError::invalid_description("render pass needs at least one color attachment"));
        }

        let mut area = Size2D::new(u32::MAX, u32::MAX);
        for attachment in &desc.color_attachments {
            let texture = attachment.texture;
            self.check_owner("color attachment", texture.backend(), texture.device)?;
            area.width = area.width.min(texture.size().width);
            area.height = area.height.min(texture.size().height);
        }

        match &mut self.native {
            NativeCommandList::Vulkan(l) => {
                let targets: Vec<_> = desc
                    .color_attachments
                    .iter()
                    .filter_map(|a| match a.texture.native {
                        NativeTexture::Vulkan { view, .. } => Some((view, a.load)),
                        NativeTexture::Software { .. } => None,
                    })
                    .collect();
                l.begin_render_pass(&targets, area);
            }
            NativeCommandList::Software(l) => {
                let targets: Vec<_> = desc
                    .color_attachments
                    .iter()
                    .filter_map(|a| match a.texture.native {
                        NativeTexture::Software { view } => Some((view, a.load)),
                        NativeTexture::Vulkan { .. } => None,
                    })
                    .collect();
                l.begin_render_pass(&targets, area);
            }
        }

        self.pass_formats = Some(desc.color_attachments.iter().map(|a| a.texture.format()).collect());
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<()> {
        self.require_recording("end_render_pass")?;
        if self.pass_formats.take().is_none() {
            return Err(GpuError::invalid_state("end_render_pass() without begin_render_pass()"));
        }
        match &mut self.native {
            NativeCommandList::Vulkan(l) => l.end_render_pass(),
            NativeCommandList::Software(l) => l.end_render_pass(),
        }
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.require_recording("set_viewport")?;
        match &mut self.native {
            NativeCommandList::Vulkan(l) => l.set_viewport(viewport),
            NativeCommandList::Software(l) => l.set_viewport(viewport),
        }
        Ok(())
    }

    pub fn set_scissor(&mut self, scissor: Rect) -> Result<()> {
        self.require_recording("set_scissor")?;
        match &mut self.native {
            NativeCommandList::Vulkan(l) => l.set_scissor(scissor),
            NativeCommandList::Software(l) => l.set_scissor(scissor),
        }
        Ok(())
    }

    pub fn set_pipeline(&mut self, pipeline: &Pipeline) -> Result<()> {
        self.require_recording("set_pipeline")?;
        self.check_owner("pipeline", pipeline.backend(), pipeline.device_id())?;
        let backend = self.backend();
        match (&mut self.native, pipeline) {
            (NativeCommandList::Vulkan(l), Pipeline::Vulkan(p)) => l.set_pipeline(p),
            (NativeCommandList::Software(l), Pipeline::Software(p)) => l.set_pipeline(p),
            _ => return Err(mismatch("pipeline", backend, pipeline.backend())),
        }
        self.pipeline = Some(BoundPipeline {
            vertex_buffers: pipeline.vertex_buffers().to_vec(),
            color_formats: pipeline.color_formats().to_vec(),
        });
        Ok(())
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &Buffer, offset: u64) -> Result<()> {
        self.require_recording("set_vertex_buffer")?;
        Self::check_bindable(buffer, offset)?;
        self.check_owner("vertex buffer", buffer.backend(), buffer.device_id())?;
        let backend = self.backend();
        match (&mut self.native, buffer) {
            (NativeCommandList::Vulkan(l), Buffer::Vulkan(b)) => l.set_vertex_buffer(slot, b, offset),
            (NativeCommandList::Software(l), Buffer::Software(b)) => l.set_vertex_buffer(slot, b, offset),
            _ => return Err(mismatch("vertex buffer", backend, buffer.backend())),
        }
        self.vertex_buffers.insert(slot, BoundBuffer { size: buffer.size(), offset });
        Ok(())
    }

    pub fn set_index_buffer(&mut self, buffer: &Buffer, format: IndexFormat, offset: u64) -> Result<()> {
        self.require_recording("set_index_buffer")?;
        Self::check_bindable(buffer, offset)?;
        self.check_owner("index buffer", buffer.backend(), buffer.device_id())?;
        let backend = self.backend();
        match (&mut self.native, buffer) {
            (NativeCommandList::Vulkan(l), Buffer::Vulkan(b)) => l.set_index_buffer(b, format, offset),
            (NativeCommandList::Software(l), Buffer::Software(b)) => l.set_index_buffer(b, format, offset),
            _ => return Err(mismatch("index buffer", backend, buffer.backend())),
        }
        self.index_buffer = Some((BoundBuffer { size: buffer.size(), offset }, format));
        Ok(())
    }

    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32) -> Result<()> {
        self.check_draw("draw")?;
        self.check_vertex_range(first_vertex, vertex_count)?;
        match &mut self.native {
            NativeCommandList::Vulkan(l) => l.draw(vertex_count, first_vertex),
            NativeCommandList::Software(l) => l.draw(vertex_count, first_vertex),
        }
        Ok(())
    }

    pub fn draw_indexed(&mut self, index_count: u32, first_index: u32, base_vertex: i32) -> Result<()> {
        self.check_draw("draw_indexed")?;
        let (bound, format) = self
            .index_buffer
            .ok_or_else(|| GpuError::invalid_state("draw_indexed() without an index buffer"))?;
        let bytes = index_count as u64 * format.size_bytes();
        let start = bound.offset.checked_add(first_index as u64 * format.size_bytes());
        check_range(start.unwrap_or(u64::MAX), bytes, bound.size, "draw_indexed")?;
        // Which vertices get fetched depends on the index values, so only the
        // bindings themselves can be checked here.
        self.check_vertex_range(0, 0)?;
        match &mut self.native {
            NativeCommandList::Vulkan(l) => l.draw_indexed(index_count, first_index, base_vertex),
            NativeCommandList::Software(l) => l.draw_indexed(index_count, first_index, base_vertex),
        }
        Ok(())
    }

    /// Buffer-to-buffer copy. Not allowed inside a render pass.
    pub fn copy_buffer(
        &mut self,
        src: &Buffer,
        dst: &Buffer,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        self.require_recording("copy_buffer")?;
        if self.pass_formats.is_some() {
            return Err(GpuError::invalid_state("copy_buffer() inside a render pass"));
        }
        self.check_owner("copy source", src.backend(), src.device_id())?;
        self.check_owner("copy destination", dst.backend(), dst.device_id())?;
        check_range(src_offset, size, src.size(), "copy_buffer source")?;
        check_range(dst_offset, size, dst.size(), "copy_buffer destination")?;
        if size == 0 {
            return Ok(());
        }
        let backend = self.backend();
        match (&mut self.native, src, dst) {
            (NativeCommandList::Vulkan(l), Buffer::Vulkan(s), Buffer::Vulkan(d)) => {
                l.copy_buffer(s, d, src_offset, dst_offset, size)
            }
            (NativeCommandList::Software(l), Buffer::Software(s), Buffer::Software(d)) => {
                l.copy_buffer(s, d, src_offset, dst_offset, size)
            }
            _ => {
                let other = if src.backend() != backend { src.backend() } else { dst.backend() };
                return Err(mismatch("copy buffer", backend, other));
            }
        }
        Ok(())
    }

    fn require_recording(&self, op: &str) -> Result<()> {
        if self.state != CommandListState::Recording {
            return Err(GpuError::invalid_state(format!(
                "{op}() requires a recording command list (state is {:?})",
                self.state
            )));
        }
        Ok(())
    }

    /// Resources must come from this list's backend and device.
    fn check_owner(&self, what: &str, backend: Backend, device: DeviceId) -> Result<()> {
        if backend != self.backend() {
            return Err(mismatch(what, self.backend(), backend));
        }
        if device != self.device_id() {
            return Err(foreign(what));
        }
        Ok(())
    }

    fn check_bindable(buffer: &Buffer, offset: u64) -> Result<()> {
        if buffer.size() == 0 {
            return Err(GpuError::invalid_state("cannot bind an empty buffer"));
        }
        if offset >= buffer.size() {
            return Err(GpuError::invalid_state(format!(
                "bind offset {offset} is outside a {} byte buffer",
                buffer.size()
            )));
        }
        Ok(())
    }

    fn check_draw(&self, op: &str) -> Result<()> {
        self.require_recording(op)?;
        let pass = self
            .pass_formats
            .as_ref()
            .ok_or_else(|| GpuError::invalid_state(format!("{op}() outside a render pass")))?;
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| GpuError::invalid_state(format!("{op}() without a pipeline")))?;
        if &pipeline.color_formats != pass {
            return Err(GpuError::invalid_state(format!(
                "pipeline renders to {:?} but the render pass targets {:?}",
                pipeline.color_formats, pass
            )));
        }
        Ok(())
    }

    /// Every slot the pipeline reads must be bound and large enough for
    /// vertices `first..first + count` (instance-rate slots for instance 0).
    fn check_vertex_range(&self, first: u32, count: u32) -> Result<()> {
        let Some(pipeline) = &self.pipeline else { return Ok(()) };
        for (slot, layout) in pipeline.vertex_buffers.iter().enumerate() {
            if layout.attributes.is_empty() {
                continue;
            }
            let bound = self.vertex_buffers.get(&(slot as u32)).ok_or_else(|| {
                GpuError::invalid_state(format!("vertex buffer slot {slot} is not bound"))
            })?;
            let extent = layout
                .attributes
                .iter()
                .map(|a| a.offset as u64 + a.format.size_bytes() as u64)
                .max()
                .unwrap_or(0);
            let last = match layout.step_mode {
                VertexStepMode::Vertex if count == 0 => continue,
                VertexStepMode::Vertex => (first as u64 + count as u64 - 1).checked_mul(layout.stride as u64),
                VertexStepMode::Instance => Some(0),
            };
            // An offset that does not fit in u64 is out of range of any buffer.
            let start = last.and_then(|last| bound.offset.checked_add(last)).unwrap_or(u64::MAX);
            check_range(start, extent, bound.size, "vertex fetch")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandList")
            .field("backend", &self.backend())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_recorded_lists_are_submittable() {
        assert!(CommandListState::Recorded.check_submittable().is_ok());
        assert!(matches!(
            CommandListState::Empty.check_submittable(),
            Err(GpuError::NullArgument(_))
        ));
        assert!(matches!(
            CommandListState::Recording.check_submittable(),
            Err(GpuError::InvalidState(_))
        ));
        assert!(matches!(
            CommandListState::Submitted.check_submittable(),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn index_formats_have_their_widths() {
        assert_eq!(IndexFormat::U16.size_bytes(), 2);
        assert_eq!(IndexFormat::U32.size_bytes(), 4);
    }
}
