//! gpu-bridge - one GPU object model over two very different backends.
//!
//! The Software backend behaves like an implicit immediate-context API: one
//! device context, work finished when submission returns. The Vulkan backend
//! is explicit: queues, command buffers, fences and image layouts. Both sit
//! behind the same types:
//!
//! ```text
//! Instance -> Adapter -> Device -> { Swapchain, CommandList, Buffer,
//!                                    ShaderModule, Pipeline }
//! ```
//!
//! Every public type is an enum over the backends. Mixing objects from
//! different backends fails with an error instead of coercing.
//!
//! A frame looks like this:
//!
//! ```no_run
//! use gpu_bridge::*;
//!
//! # fn main() -> gpu_bridge::Result<()> {
//! let instance = Instance::new(&InstanceDescription::new("demo", BackendPreference::Software))?;
//! let surface = Surface::headless();
//! let device = instance.create_device(Some(&surface), 0)?;
//! let desc = SwapchainDescription::new(Size2D::new(640, 480), Format::B8G8R8A8Unorm, PresentMode::Fifo, 2);
//! let mut swapchain = device.create_swapchain(&desc, &surface)?;
//! let mut list = device.create_command_list()?;
//!
//! let texture = swapchain.get_next_texture()?;
//! list.begin()?;
//! list.begin_render_pass(&RenderPassDescription::clear(&texture, ColorF::BLACK))?;
//! list.end_render_pass()?;
//! list.end()?;
//! device.submit_command_list(&mut list)?;
//! swapchain.present()?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod backend;
pub mod buffer;
pub mod command_list;
pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;

pub use adapter::{Adapter, AdapterKind, AdapterSupports};
pub use buffer::{Buffer, BufferDescription, BufferUsage, CpuAccess};
pub use command_list::{
    ColorAttachment, CommandList, CommandListState, IndexFormat, LoadOp, RenderPassDescription,
};
pub use device::{Device, DeviceLimits};
pub use error::{GpuError, Result};
pub use format::{ColorF, Format, PresentMode, Rect, Size2D, Viewport};
pub use instance::{Backend, BackendPreference, Instance, InstanceDescription};
pub use pipeline::{
    BlendComponent, BlendFactor, BlendOp, BlendState, CompareOp, CullMode, DepthState, FillMode,
    FrontFace, Pipeline, PipelineDescription, PrimitiveTopology, RasterizerState, VertexAttribute,
    VertexBufferLayout, VertexStepMode,
};
pub use shader::{ShaderModule, ShaderModuleDescription, ShaderStage};
pub use surface::{Frame, PresentTarget, Surface};
pub use swapchain::{Swapchain, SwapchainDescription, Texture};
