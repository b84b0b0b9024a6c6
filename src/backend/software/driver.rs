// Software driver - the native layer behind the software backend
//
// Mirrors the shape of an immediate-context graphics API:
// - every native object lives in a handle table and is released explicitly
// - command lists are recorded elsewhere (deferred) and executed here, one at
//   a time, on the single immediate context
// - swap chains own their back buffers; views are separate objects
//
// The driver keeps a release log and can report live objects, which is what
// leak and destruction-order checks are built on.
//
// Clears, copies and presentation are carried out on the CPU. Draws are
// validated against the bound state and counted; shading is not emulated.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::adapter::{Adapter, AdapterKind, AdapterSupports};
use crate::command_list::{IndexFormat, LoadOp};
use crate::device::DeviceId;
use crate::error::{GpuError, Result};
use crate::format::{ColorF, Format, PresentMode, Rect, Size2D, Viewport};
use crate::pipeline::{PrimitiveTopology, VertexBufferLayout};
use crate::shader::ShaderStage;

pub const ADAPTER_NAME: &str = "Software Rasterizer (CPU)";
/// Largest buffer the driver allocates (128 MiB).
pub const MAX_BUFFER_SIZE: u64 = 128 * 1024 * 1024;
pub const MIN_SWAP_CHAIN_BUFFERS: u32 = 1;
pub const MAX_SWAP_CHAIN_BUFFERS: u32 = 16;
/// Largest width or height of a swap chain image.
pub const MAX_TEXTURE_DIMENSION: u32 = 16384;
/// Total pixel memory one swap chain may hold (1 GiB).
pub const MAX_SWAP_CHAIN_MEMORY: u64 = 1024 * 1024 * 1024;
pub const MAX_ANISOTROPY: f32 = 16.0;
/// In preference order; the first entry is the fallback.
pub const SUPPORTED_PRESENT_MODES: [PresentMode; 2] = [PresentMode::Fifo, PresentMode::Immediate];

/// Adapters the driver exposes. There is exactly one: the CPU.
pub(crate) fn enumerate_adapters() -> Vec<Adapter> {
    vec![Adapter {
        index: 0,
        name: ADAPTER_NAME.to_string(),
        kind: AdapterKind::Cpu,
        dedicated_memory: 0,
        supports: AdapterSupports {
            geometry_shader: true,
            anisotropy: true,
            max_anisotropy: MAX_ANISOTROPY,
        },
    }]
}

/// Native object handle. Never reused within one driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Buffer,
    Texture,
    RenderTargetView,
    SwapChain,
    Shader,
    Pipeline,
    CommandList,
}

/// A command as stored in a finished native command list.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    BeginRenderPass { targets: Vec<(Handle, LoadOp)>, area: Size2D },
    EndRenderPass,
    SetViewport(Viewport),
    SetScissor(Rect),
    SetPipeline(Handle),
    SetVertexBuffer { slot: u32, buffer: Handle, offset: u64 },
    SetIndexBuffer { buffer: Handle, format: IndexFormat, offset: u64 },
    Draw { vertex_count: u32, first_vertex: u32 },
    DrawIndexed { index_count: u32, first_index: u32, base_vertex: i32 },
    CopyBuffer { src: Handle, dst: Handle, src_offset: u64, dst_offset: u64, size: u64 },
}

impl Command {
    fn references(&self) -> Vec<(Handle, ObjectKind)> {
        match self {
            Command::BeginRenderPass { targets, .. } => {
                targets.iter().map(|(h, _)| (*h, ObjectKind::RenderTargetView)).collect()
            }
            Command::SetPipeline(h) => vec![(*h, ObjectKind::Pipeline)],
            Command::SetVertexBuffer { buffer, .. } | Command::SetIndexBuffer { buffer, .. } => {
                vec![(*buffer, ObjectKind::Buffer)]
            }
            Command::CopyBuffer { src, dst, .. } => {
                vec![(*src, ObjectKind::Buffer), (*dst, ObjectKind::Buffer)]
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PipelineObject {
    pub vertex_shader: Handle,
    pub fragment_shader: Handle,
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub topology: PrimitiveTopology,
    pub color_formats: Vec<Format>,
}

struct TextureObject {
    size: Size2D,
    format: Format,
    pixels: Vec<u8>,
}

enum Object {
    Buffer(Vec<u8>),
    Texture(TextureObject),
    RenderTargetView { texture: Handle },
    SwapChain { buffers: Vec<Handle> },
    Shader { stage: ShaderStage, words: Vec<u32> },
    Pipeline(PipelineObject),
    CommandList(Arc<[Command]>),
}

impl Object {
    fn kind(&self) -> ObjectKind {
        match self {
            Object::Buffer(_) => ObjectKind::Buffer,
            Object::Texture(_) => ObjectKind::Texture,
            Object::RenderTargetView { .. } => ObjectKind::RenderTargetView,
            Object::SwapChain { .. } => ObjectKind::SwapChain,
            Object::Shader { .. } => ObjectKind::Shader,
            Object::Pipeline(_) => ObjectKind::Pipeline,
            Object::CommandList(_) => ObjectKind::CommandList,
        }
    }
}

/// Counters kept by the immediate context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextStats {
    pub command_lists_executed: u64,
    pub commands_executed: u64,
    pub clears: u64,
    pub draws: u64,
    pub vertices: u64,
    pub indices: u64,
    pub copies: u64,
    pub presents: u64,
}

/// Snapshot of the driver's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverReport {
    /// Objects still alive, in creation order.
    pub live: Vec<(Handle, ObjectKind)>,
    /// Every release so far, in release order.
    pub released: Vec<(Handle, ObjectKind)>,
    pub stats: ContextStats,
}

impl DriverReport {
    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.live.iter().filter(|(_, k)| *k == kind).count()
    }
}

/// State bound on the immediate context while one command list executes.
#[derive(Default)]
struct Bindings {
    targets: Option<Vec<Handle>>,
    pipeline: Option<Handle>,
    vertex_buffers: BTreeMap<u32, (Handle, u64)>,
    index_buffer: Option<(Handle, IndexFormat, u64)>,
    viewport: Option<Viewport>,
    scissor: Option<Rect>,
}

struct State {
    objects: BTreeMap<Handle, Object>,
    next_handle: u64,
    released: Vec<(Handle, ObjectKind)>,
    stats: ContextStats,
}

impl State {
    fn insert(&mut self, object: Object) -> Handle {
        self.next_handle += 1;
        let handle = Handle(self.next_handle);
        self.objects.insert(handle, object);
        handle
    }

    fn buffer(&self, handle: Handle) -> Result<&Vec<u8>> {
        match self.objects.get(&handle) {
            Some(Object::Buffer(data)) => Ok(data),
            _ => Err(released(handle, ObjectKind::Buffer)),
        }
    }

    fn buffer_mut(&mut self, handle: Handle) -> Result<&mut Vec<u8>> {
        match self.objects.get_mut(&handle) {
            Some(Object::Buffer(data)) => Ok(data),
            _ => Err(released(handle, ObjectKind::Buffer)),
        }
    }

    fn view_texture(&self, view: Handle) -> Result<Handle> {
        match self.objects.get(&view) {
            Some(Object::RenderTargetView { texture }) => Ok(*texture),
            _ => Err(released(view, ObjectKind::RenderTargetView)),
        }
    }

    fn texture_mut(&mut self, handle: Handle) -> Result<&mut TextureObject> {
        match self.objects.get_mut(&handle) {
            Some(Object::Texture(t)) => Ok(t),
            _ => Err(released(handle, ObjectKind::Texture)),
        }
    }
}

fn released(handle: Handle, kind: ObjectKind) -> GpuError {
    GpuError::invalid_state(format!("{kind:?} {handle} does not exist or was released"))
}

pub(crate) struct Driver {
    id: DeviceId,
    debug: bool,
    state: Mutex<State>,
}

impl Driver {
    pub fn new(debug: bool) -> Self {
        Self {
            id: DeviceId::next(),
            debug,
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                next_handle: 0,
                released: Vec::new(),
                stats: ContextStats::default(),
            }),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Release one object. Swap chains take their back buffers with them.
    pub fn release(&self, handle: Handle) {
        let mut state = self.state.lock();
        let Some(object) = state.objects.remove(&handle) else {
            log::error!("Release of unknown software object {}", handle);
            return;
        };
        state.released.push((handle, object.kind()));
        if let Object::SwapChain { buffers } = object {
            for buffer in buffers {
                if let Some(texture) = state.objects.remove(&buffer) {
                    state.released.push((buffer, texture.kind()));
                }
            }
        }
    }

    pub fn report(&self) -> DriverReport {
        let state = self.state.lock();
        DriverReport {
            live: state.objects.iter().map(|(h, o)| (*h, o.kind())).collect(),
            released: state.released.clone(),
            stats: state.stats,
        }
    }

    pub fn create_buffer(&self, size: u64, initial_data: Option<&[u8]>) -> Handle {
        let mut data = vec![0u8; size as usize];
        if let Some(initial) = initial_data {
            data[..initial.len()].copy_from_slice(initial);
        }
        self.state.lock().insert(Object::Buffer(data))
    }

    pub fn write_buffer(&self, handle: Handle, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let data = state.buffer_mut(handle)?;
        let start = offset as usize;
        data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_buffer(&self, handle: Handle) -> Result<Vec<u8>> {
        self.state.lock().buffer(handle).cloned()
    }

    /// Create a swap chain with `count` back buffers, all cleared to zero.
    pub fn create_swap_chain(&self, size: Size2D, format: Format, count: u32) -> Result<(Handle, Vec<Handle>)> {
        let bytes = size
            .area()
            .checked_mul(format.size_bytes() as u64)
            .filter(|b| b.checked_mul(count as u64).is_some_and(|total| total <= MAX_SWAP_CHAIN_MEMORY))
            .ok_or(GpuError::OutOfMemory("software swap chain allocation"))? as usize;
        let mut state = self.state.lock();
        let buffers: Vec<Handle> = (0..count)
            .map(|_| {
                state.insert(Object::Texture(TextureObject { size, format, pixels: vec![0; bytes] }))
            })
            .collect();
        let swap_chain = state.insert(Object::SwapChain { buffers: buffers.clone() });
        Ok((swap_chain, buffers))
    }

    pub fn create_render_target_view(&self, texture: Handle) -> Result<Handle> {
        let mut state = self.state.lock();
        state.texture_mut(texture)?;
        Ok(state.insert(Object::RenderTargetView { texture }))
    }

    /// Copy of a back buffer's pixels, as handed to the presentation target.
    pub fn present_buffer(&self, texture: Handle) -> Result<(Size2D, Format, Vec<u8>)> {
        let mut state = self.state.lock();
        let t = state.texture_mut(texture)?;
        let frame = (t.size, t.format, t.pixels.clone());
        state.stats.presents += 1;
        Ok(frame)
    }

    pub fn create_shader(&self, stage: ShaderStage, words: Vec<u32>) -> Handle {
        self.state.lock().insert(Object::Shader { stage, words })
    }

    pub fn create_pipeline(&self, pipeline: PipelineObject) -> Result<Handle> {
        let mut state = self.state.lock();
        for (shader, expected) in [
            (pipeline.vertex_shader, ShaderStage::Vertex),
            (pipeline.fragment_shader, ShaderStage::Fragment),
        ] {
            match state.objects.get(&shader) {
                Some(Object::Shader { stage, words }) if *stage == expected && !words.is_empty() => {}
                Some(Object::Shader { stage, .. }) => {
                    return Err(GpuError::invalid_description(format!(
                        "shader {shader} has stage {stage:?}, expected {expected:?}"
                    )))
                }
                _ => return Err(released(shader, ObjectKind::Shader)),
            }
        }
        Ok(state.insert(Object::Pipeline(pipeline)))
    }

    /// Turn deferred commands into a native command list object.
    pub fn finish_command_list(&self, commands: Vec<Command>) -> Handle {
        self.state.lock().insert(Object::CommandList(commands.into()))
    }

    /// Run a finished command list on the immediate context.
    ///
    /// Every handle the list references is checked before the first command
    /// runs, so a list that refers to a released object fails without doing
    /// any work.
    pub fn execute_command_list(&self, list: Handle) -> Result<()> {
        let mut state = self.state.lock();
        let commands = match state.objects.get(&list) {
            Some(Object::CommandList(commands)) => Arc::clone(commands),
            _ => return Err(released(list, ObjectKind::CommandList)),
        };

        for command in commands.iter() {
            for (handle, kind) in command.references() {
                match state.objects.get(&handle) {
                    Some(object) if object.kind() == kind => {}
                    _ => return Err(released(handle, kind)),
                }
            }
        }

        let mut bindings = Bindings::default();
        for command in commands.iter() {
            if self.debug {
                log::trace!("[software] {:?}", command);
            }
            execute(&mut state, &mut bindings, command)?;
            state.stats.commands_executed += 1;
        }
        state.stats.command_lists_executed += 1;
        Ok(())
    }
}

fn execute(state: &mut State, bindings: &mut Bindings, command: &Command) -> Result<()> {
    match command {
        Command::BeginRenderPass { targets, area } => {
            log::trace!("[software] render pass over {} with {} targets", area, targets.len());
            for (view, load) in targets {
                if let LoadOp::Clear(color) = load {
                    let texture = state.view_texture(*view)?;
                    clear_texture(state.texture_mut(texture)?, *color)?;
                    state.stats.clears += 1;
                }
            }
            bindings.targets = Some(targets.iter().map(|(v, _)| *v).collect());
        }
        Command::EndRenderPass => bindings.targets = None,
        Command::SetViewport(viewport) => bindings.viewport = Some(*viewport),
        Command::SetScissor(rect) => bindings.scissor = Some(*rect),
        Command::SetPipeline(pipeline) => bindings.pipeline = Some(*pipeline),
        Command::SetVertexBuffer { slot, buffer, offset } => {
            bindings.vertex_buffers.insert(*slot, (*buffer, *offset));
        }
        Command::SetIndexBuffer { buffer, format, offset } => {
            bindings.index_buffer = Some((*buffer, *format, *offset));
        }
        Command::Draw { vertex_count, first_vertex } => {
            let topology = check_draw_state(state, bindings)?;
            log::trace!(
                "[software] draw {} vertices from {} as {:?} (viewport {:?}, scissor {:?})",
                vertex_count,
                first_vertex,
                topology,
                bindings.viewport,
                bindings.scissor
            );
            state.stats.draws += 1;
            state.stats.vertices += *vertex_count as u64;
        }
        Command::DrawIndexed { index_count, first_index, base_vertex } => {
            let topology = check_draw_state(state, bindings)?;
            let (buffer, format, offset) = bindings
                .index_buffer
                .ok_or_else(|| GpuError::invalid_state("indexed draw without an index buffer"))?;
            let size = state.buffer(buffer)?.len() as u64;
            let end = (*first_index as u64 + *index_count as u64)
                .checked_mul(format.size_bytes())
                .and_then(|bytes| offset.checked_add(bytes));
            if end.map_or(true, |end| end > size) {
                return Err(GpuError::invalid_state("indexed draw reads past the end of the index buffer"));
            }
            log::trace!(
                "[software] draw {} indices from {} (base vertex {}) as {:?}",
                index_count,
                first_index,
                base_vertex,
                topology
            );
            state.stats.draws += 1;
            state.stats.indices += *index_count as u64;
        }
        Command::CopyBuffer { src, dst, src_offset, dst_offset, size } => {
            let (s, d, n) = (*src_offset as usize, *dst_offset as usize, *size as usize);
            if src == dst {
                state.buffer_mut(*dst)?.copy_within(s..s + n, d);
            } else {
                let bytes = state.buffer(*src)?[s..s + n].to_vec();
                state.buffer_mut(*dst)?[d..d + n].copy_from_slice(&bytes);
            }
            state.stats.copies += 1;
        }
    }
    Ok(())
}

fn check_draw_state(state: &State, bindings: &Bindings) -> Result<PrimitiveTopology> {
    let Some(targets) = &bindings.targets else {
        return Err(GpuError::invalid_state("draw outside a render pass"));
    };
    let pipeline = bindings
        .pipeline
        .ok_or_else(|| GpuError::invalid_state("draw without a pipeline"))?;
    let Some(Object::Pipeline(p)) = state.objects.get(&pipeline) else {
        return Err(released(pipeline, ObjectKind::Pipeline));
    };
    let mut target_formats = Vec::with_capacity(targets.len());
    for view in targets {
        let texture = state.view_texture(*view)?;
        match state.objects.get(&texture) {
            Some(Object::Texture(t)) => target_formats.push(t.format),
            _ => return Err(released(texture, ObjectKind::Texture)),
        }
    }
    if p.color_formats != target_formats {
        return Err(GpuError::invalid_state(format!(
            "pipeline {pipeline} renders to {:?} but the bound targets are {:?}",
            p.color_formats, target_formats
        )));
    }
    for (slot, layout) in p.vertex_buffers.iter().enumerate() {
        if !layout.attributes.is_empty() && !bindings.vertex_buffers.contains_key(&(slot as u32)) {
            return Err(GpuError::invalid_state(format!("vertex buffer slot {slot} is not bound")));
        }
    }
    Ok(p.topology)
}

fn clear_texture(texture: &mut TextureObject, color: ColorF) -> Result<()> {
    let texel = color.encode(texture.format).ok_or_else(|| {
        GpuError::invalid_state(format!("{:?} textures cannot be cleared as color targets", texture.format))
    })?;
    for chunk in texture.pixels.chunks_exact_mut(4) {
        chunk.copy_from_slice(&texel);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_chain_release_takes_back_buffers() {
        let driver = Driver::new(false);
        let (chain, buffers) = driver.create_swap_chain(Size2D::new(2, 2), Format::B8G8R8A8Unorm, 3).unwrap();
        assert_eq!(driver.report().live_count(ObjectKind::Texture), 3);

        driver.release(chain);
        let report = driver.report();
        assert!(report.live.is_empty());
        assert_eq!(report.released[0], (chain, ObjectKind::SwapChain));
        assert_eq!(&report.released[1..].iter().map(|(h, _)| *h).collect::<Vec<_>>(), &buffers);
    }

    #[test]
    fn handles_are_never_reused() {
        let driver = Driver::new(false);
        let a = driver.create_buffer(4, None);
        driver.release(a);
        let b = driver.create_buffer(4, None);
        assert_ne!(a, b);
    }

    #[test]
    fn execution_checks_references_before_running_anything() {
        let driver = Driver::new(false);
        let src = driver.create_buffer(4, Some(&[1, 2, 3, 4]));
        let dst = driver.create_buffer(4, None);
        let gone = driver.create_buffer(4, None);
        driver.release(gone);

        let list = driver.finish_command_list(vec![
            Command::CopyBuffer { src, dst, src_offset: 0, dst_offset: 0, size: 4 },
            Command::CopyBuffer { src: gone, dst, src_offset: 0, dst_offset: 0, size: 4 },
        ]);
        assert!(driver.execute_command_list(list).is_err());
        assert_eq!(driver.read_buffer(dst).unwrap(), vec![0; 4]);
        assert_eq!(driver.report().stats.commands_executed, 0);
    }

    #[test]
    fn clear_fills_the_view_texture() {
        let driver = Driver::new(false);
        let (_, buffers) = driver.create_swap_chain(Size2D::new(2, 1), Format::R8G8B8A8Unorm, 1).unwrap();
        let view = driver.create_render_target_view(buffers[0]).unwrap();
        let list = driver.finish_command_list(vec![
            Command::BeginRenderPass {
                targets: vec![(view, LoadOp::Clear(ColorF::new(0.0, 1.0, 0.0, 1.0)))],
                area: Size2D::new(2, 1),
            },
            Command::EndRenderPass,
        ]);
        driver.execute_command_list(list).unwrap();

        let (_, _, pixels) = driver.present_buffer(buffers[0]).unwrap();
        assert_eq!(pixels, vec![0, 255, 0, 255, 0, 255, 0, 255]);
    }

    fn pipeline(driver: &Driver, format: Format) -> Handle {
        let vertex_shader = driver.create_shader(ShaderStage::Vertex, vec![0x0723_0203]);
        let fragment_shader = driver.create_shader(ShaderStage::Fragment, vec![0x0723_0203]);
        driver
            .create_pipeline(PipelineObject {
                vertex_shader,
                fragment_shader,
                vertex_buffers: Vec::new(),
                topology: PrimitiveTopology::default(),
                color_formats: vec![format],
            })
            .unwrap()
    }

    fn target(driver: &Driver, format: Format) -> Handle {
        let (_, buffers) = driver.create_swap_chain(Size2D::new(2, 2), format, 1).unwrap();
        driver.create_render_target_view(buffers[0]).unwrap()
    }

    #[test]
    fn draws_need_a_pipeline_matching_the_targets() {
        let driver = Driver::new(false);
        let view = target(&driver, Format::B8G8R8A8Unorm);
        let rgba = pipeline(&driver, Format::R8G8B8A8Unorm);
        let bgra = pipeline(&driver, Format::B8G8R8A8Unorm);

        let draw_with = |pipeline| {
            driver.finish_command_list(vec![
                Command::BeginRenderPass { targets: vec![(view, LoadOp::Load)], area: Size2D::new(2, 2) },
                Command::SetPipeline(pipeline),
                Command::Draw { vertex_count: 3, first_vertex: 0 },
                Command::EndRenderPass,
            ])
        };
        assert!(driver.execute_command_list(draw_with(rgba)).is_err());
        assert_eq!(driver.report().stats.draws, 0);
        driver.execute_command_list(draw_with(bgra)).unwrap();
        assert_eq!(driver.report().stats.draws, 1);
    }

    #[test]
    fn indexed_draw_range_cannot_overflow() {
        let driver = Driver::new(false);
        let view = target(&driver, Format::B8G8R8A8Unorm);
        let pipeline = pipeline(&driver, Format::B8G8R8A8Unorm);
        let indices = driver.create_buffer(16, None);

        for (offset, first_index, index_count) in [(u64::MAX - 1, 0, 1), (0, u32::MAX, u32::MAX), (8, 1, 2)] {
            let list = driver.finish_command_list(vec![
                Command::BeginRenderPass { targets: vec![(view, LoadOp::Load)], area: Size2D::new(2, 2) },
                Command::SetPipeline(pipeline),
                Command::SetIndexBuffer { buffer: indices, format: IndexFormat::U32, offset },
                Command::DrawIndexed { index_count, first_index, base_vertex: 0 },
                Command::EndRenderPass,
            ]);
            assert!(driver.execute_command_list(list).is_err(), "{offset} {first_index} {index_count}");
        }
        assert_eq!(driver.report().stats.draws, 0);
    }

    #[test]
    fn oversized_swap_chains_fail_before_allocating() {
        let driver = Driver::new(false);
        let huge = Size2D::new(u32::MAX, u32::MAX);
        assert!(matches!(
            driver.create_swap_chain(huge, Format::B8G8R8A8Unorm, 2),
            Err(GpuError::OutOfMemory(_))
        ));
        assert!(driver.report().live.is_empty());
    }
}
