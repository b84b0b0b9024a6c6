// Graphics pipelines for dynamic rendering
//
// No render pass objects: color formats go in through
// VkPipelineRenderingCreateInfo. Viewport and scissor are dynamic state and
// are reset to the full target at the start of every render pass.

use std::sync::Arc;

use ash::vk;

use crate::device::DeviceId;
use crate::error::{GpuError, Result};
use crate::format::Format;
use crate::pipeline::{PipelineDescription, VertexBufferLayout};
use crate::shader::ShaderModule;

use super::conv;
use super::device::DeviceShared;
use super::result::{translate, VkResultExt};

pub(crate) struct PipelineRaw {
    device: Arc<DeviceShared>,
    pub pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl Drop for PipelineRaw {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

pub struct VulkanPipeline {
    raw: Arc<PipelineRaw>,
    vertex_buffers: Vec<VertexBufferLayout>,
    color_formats: Vec<Format>,
}

impl VulkanPipeline {
    pub(crate) fn new(device: Arc<DeviceShared>, desc: &PipelineDescription<'_>) -> Result<Self> {
        let (ShaderModule::Vulkan(vs), ShaderModule::Vulkan(fs)) = (desc.vertex_shader, desc.fragment_shader) else {
            return Err(GpuError::invalid_state("pipeline shaders must come from the Vulkan backend"));
        };

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(conv::shader_stage(vs.stage()))
                .module(vs.module)
                .name(vs.entry_point_c()),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(conv::shader_stage(fs.stage()))
                .module(fs.module)
                .name(fs.entry_point_c()),
        ];

        let bindings: Vec<vk::VertexInputBindingDescription> = desc
            .vertex_buffers
            .iter()
            .enumerate()
            .map(|(slot, layout)| vk::VertexInputBindingDescription {
                binding: slot as u32,
                stride: layout.stride,
                input_rate: conv::step_mode(layout.step_mode),
            })
            .collect();
        let attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex_buffers
            .iter()
            .enumerate()
            .flat_map(|(slot, layout)| {
                layout.attributes.iter().map(move |a| vk::VertexInputAttributeDescription {
                    location: a.location,
                    binding: slot as u32,
                    format: conv::format(a.format),
                    offset: a.offset,
                })
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(conv::topology(desc.topology))
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(conv::polygon_mode(desc.rasterizer.fill_mode))
            .line_width(1.0)
            .cull_mode(conv::cull_mode(desc.rasterizer.cull_mode))
            .front_face(conv::front_face(desc.rasterizer.front_face))
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // There is no depth attachment format, so depth state only matters
        // once depth targets exist; it is still passed through as described.
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth.test_enabled)
            .depth_write_enable(desc.depth.write_enabled)
            .depth_compare_op(conv::compare_op(desc.depth.compare))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend = desc.blend;
        let blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(blend.enabled)
            .src_color_blend_factor(conv::blend_factor(blend.color.src))
            .dst_color_blend_factor(conv::blend_factor(blend.color.dst))
            .color_blend_op(conv::blend_op(blend.color.op))
            .src_alpha_blend_factor(conv::blend_factor(blend.alpha.src))
            .dst_alpha_blend_factor(conv::blend_factor(blend.alpha.dst))
            .alpha_blend_op(conv::blend_op(blend.alpha.op));
        let blend_attachments = vec![blend_attachment; desc.color_formats.len()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats: Vec<vk::Format> = desc.color_formats.iter().map(|f| conv::format(*f)).collect();
        let mut rendering = vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);

        let layout_info = vk::PipelineLayoutCreateInfo::default();
        let layout = unsafe { device.device.create_pipeline_layout(&layout_info, None) }
            .or_gpu("create pipeline layout")?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering);

        let result = unsafe {
            device
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        let pipeline = match result {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                unsafe { device.device.destroy_pipeline_layout(layout, None) };
                return Err(translate("create graphics pipeline", e));
            }
        };

        log::debug!(
            "Vulkan pipeline created ({:?}, {} vertex buffers, targets {:?})",
            desc.topology,
            desc.vertex_buffers.len(),
            desc.color_formats
        );
        Ok(Self {
            raw: Arc::new(PipelineRaw { device, pipeline, layout }),
            vertex_buffers: desc.vertex_buffers.clone(),
            color_formats: desc.color_formats.clone(),
        })
    }

    pub(crate) fn raw(&self) -> &Arc<PipelineRaw> {
        &self.raw
    }

    pub(crate) fn device_id(&self) -> DeviceId {
        self.raw.device.id
    }

    pub fn vertex_buffers(&self) -> &[VertexBufferLayout] {
        &self.vertex_buffers
    }

    pub fn color_formats(&self) -> &[Format] {
        &self.color_formats
    }
}
