#![allow(dead_code)]

use gpu_bridge::*;

/// A SPIR-V module header with no instructions.
pub fn minimal_spirv() -> Vec<u8> {
    [0x0723_0203u32, 0x0001_0000, 0, 1, 0]
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

pub fn software_instance() -> Instance {
    Instance::new(&InstanceDescription::new("gpu-bridge-tests", BackendPreference::Software))
        .expect("software instance")
}

pub fn software_device(instance: &Instance, surface: &Surface) -> Device {
    instance.create_device(Some(surface), 0).expect("software device")
}

pub fn swapchain_description(buffer_count: u32) -> SwapchainDescription {
    SwapchainDescription::new(Size2D::new(8, 4), Format::B8G8R8A8Unorm, PresentMode::Fifo, buffer_count)
}

pub fn shader(device: &Device, stage: ShaderStage) -> ShaderModule {
    device
        .create_shader_module(&ShaderModuleDescription::new(stage, minimal_spirv(), "main"))
        .expect("shader module")
}

/// One vec2 position per vertex.
pub fn position_layout() -> VertexBufferLayout {
    VertexBufferLayout {
        stride: 8,
        step_mode: VertexStepMode::Vertex,
        attributes: vec![VertexAttribute { location: 0, format: Format::R32G32Float, offset: 0 }],
    }
}

pub fn triangle_pipeline(device: &Device, format: Format) -> Pipeline {
    let vs = shader(device, ShaderStage::Vertex);
    let fs = shader(device, ShaderStage::Fragment);
    device
        .create_pipeline(&PipelineDescription::new(&vs, &fs, format).with_vertex_buffer(position_layout()))
        .expect("pipeline")
}
