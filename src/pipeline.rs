// Graphics pipeline state objects
//
// A pipeline is built from two shader modules plus vertex layout and
// fixed-function state. The modules are only borrowed for the duration of
// `Device::create_pipeline`; dropping them afterwards is fine.

use std::collections::HashSet;

use crate::backend::software::SoftwarePipeline;
use crate::backend::vulkan::VulkanPipeline;
use crate::device::DeviceId;
use crate::error::{GpuError, Result};
use crate::format::Format;
use crate::instance::Backend;
use crate::shader::{ShaderModule, ShaderStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexStepMode {
    #[default]
    Vertex,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: Format,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub stride: u32,
    pub step_mode: VertexStepMode,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RasterizerState {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub fill_mode: FillMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DepthState {
    pub test_enabled: bool,
    pub write_enabled: bool,
    pub compare: CompareOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub op: BlendOp,
}

impl BlendComponent {
    pub const REPLACE: BlendComponent =
        BlendComponent { src: BlendFactor::One, dst: BlendFactor::Zero, op: BlendOp::Add };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub enabled: bool,
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    pub const ALPHA_BLENDING: BlendState = BlendState {
        enabled: true,
        color: BlendComponent {
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::OneMinusSrcAlpha,
            op: BlendOp::Add,
        },
        alpha: BlendComponent {
            src: BlendFactor::One,
            dst: BlendFactor::OneMinusSrcAlpha,
            op: BlendOp::Add,
        },
    };
}

impl Default for BlendState {
    fn default() -> Self {
        Self { enabled: false, color: BlendComponent::REPLACE, alpha: BlendComponent::REPLACE }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineDescription<'a> {
    pub vertex_shader: &'a ShaderModule,
    pub fragment_shader: &'a ShaderModule,
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub topology: PrimitiveTopology,
    pub rasterizer: RasterizerState,
    pub depth: DepthState,
    pub blend: BlendState,
    pub color_formats: Vec<Format>,
}

impl<'a> PipelineDescription<'a> {
    pub fn new(
        vertex_shader: &'a ShaderModule,
        fragment_shader: &'a ShaderModule,
        color_format: Format,
    ) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            vertex_buffers: Vec::new(),
            topology: PrimitiveTopology::default(),
            rasterizer: RasterizerState::default(),
            depth: DepthState::default(),
            blend: BlendState::default(),
            color_formats: vec![color_format],
        }
    }

    pub fn with_vertex_buffer(mut self, layout: VertexBufferLayout) -> Self {
        self.vertex_buffers.push(layout);
        self
    }

    /// Backend-independent checks. Backend mismatches are checked by the
    /// device that builds the pipeline.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.vertex_shader.stage() != ShaderStage::Vertex {
            return Err(GpuError::invalid_description(format!(
                "vertex_shader has stage {:?}",
                self.vertex_shader.stage()
            )));
        }
        if self.fragment_shader.stage() != ShaderStage::Fragment {
            return Err(GpuError::invalid_description(format!(
                "fragment_shader has stage {:?}",
                self.fragment_shader.stage()
            )));
        }
        if self.color_formats.is_empty() {
            return Err(GpuError::invalid_description("pipeline needs at least one color format"));
        }
        if let Some(f) = self.color_formats.iter().find(|f| !f.is_color_target()) {
            return Err(GpuError::invalid_description(format!("{f:?} is not a color target format")));
        }

        let mut locations = HashSet::new();
        for (slot, layout) in self.vertex_buffers.iter().enumerate() {
            for attr in &layout.attributes {
                if !locations.insert(attr.location) {
                    return Err(GpuError::invalid_description(format!(
                        "vertex location {} is used twice",
                        attr.location
                    )));
                }
                let end = attr.offset.checked_add(attr.format.size_bytes());
                if end.map_or(true, |end| end > layout.stride) {
                    return Err(GpuError::invalid_description(format!(
                        "attribute at location {} overruns the {} byte stride of slot {slot}",
                        attr.location, layout.stride
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Built pipeline. Keeps the parts of its description that command
/// recording needs to validate draws.
pub enum Pipeline {
    Vulkan(VulkanPipeline),
    Software(SoftwarePipeline),
}

impl Pipeline {
    pub fn backend(&self) -> Backend {
        match self {
            Pipeline::Vulkan(_) => Backend::Vulkan,
            Pipeline::Software(_) => Backend::Software,
        }
    }

    pub(crate) fn device_id(&self) -> DeviceId {
        match self {
            Pipeline::Vulkan(p) => p.device_id(),
            Pipeline::Software(p) => p.device_id(),
        }
    }

    pub fn vertex_buffers(&self) -> &[VertexBufferLayout] {
        match self {
            Pipeline::Vulkan(p) => p.vertex_buffers(),
            Pipeline::Software(p) => p.vertex_buffers(),
        }
    }

    pub fn color_formats(&self) -> &[Format] {
        match self {
            Pipeline::Vulkan(p) => p.color_formats(),
            Pipeline::Software(p) => p.color_formats(),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("backend", &self.backend())
            .field("color_formats", &self.color_formats())
            .finish()
    }
}
