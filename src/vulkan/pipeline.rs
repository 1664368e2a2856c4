//! Shader compilation and the two avatar pipelines
//!
//! The shader ships as WGSL and is compiled to SPIR-V at startup through
//! naga. Two pipelines share one layout: the opaque one draws the base
//! layer and the cape, the overlay one re-draws the clothing layer with
//! alpha blending and the depth write disabled so it never occludes the
//! base mesh underneath.

use std::mem;

use ash::vk;

use crate::error::{RenderError, RenderResult};
use crate::mesh::SkinVertex;

/// WGSL source for the avatar shader.
pub const SKIN_SHADER: &str = include_str!("../../shaders/skin.wgsl");

/// Compile one WGSL entry point to a Vulkan shader module.
pub fn compile_shader(
    device: &ash::Device,
    wgsl_source: &str,
    stage: naga::ShaderStage,
    entry_point: &str,
) -> RenderResult<vk::ShaderModule> {
    let module = naga::front::wgsl::parse_str(wgsl_source)
        .map_err(|e| RenderError::Shader(format!("WGSL parse error: {e}")))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(&module)
        .map_err(|e| RenderError::Shader(format!("validation error: {e}")))?;

    module
        .entry_points
        .iter()
        .position(|ep| ep.name == entry_point && ep.stage == stage)
        .ok_or_else(|| {
            RenderError::Shader(format!(
                "entry point '{entry_point}' not found for stage {stage:?}"
            ))
        })?;

    // The clip-space Y flip happens in the projection matrix when uniforms
    // are written, so the writer must not adjust coordinates again.
    let options = naga::back::spv::Options {
        lang_version: (1, 3),
        flags: naga::back::spv::WriterFlags::empty(),
        ..Default::default()
    };

    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: stage,
        entry_point: entry_point.to_string(),
    };

    let spv = naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
        .map_err(|e| RenderError::Shader(format!("SPIR-V generation error: {e}")))?;

    let create_info = vk::ShaderModuleCreateInfo {
        code_size: spv.len() * 4,
        p_code: spv.as_ptr(),
        ..Default::default()
    };

    unsafe {
        device
            .create_shader_module(&create_info, None)
            .map_err(|e| RenderError::Shader(e.to_string()))
    }
}

/// Descriptor interface of the avatar shader: one dynamic uniform block,
/// one sampled image and one sampler. Image and sampler are separate
/// bindings because WGSL has no combined image-samplers.
pub fn create_descriptor_set_layout(
    device: &ash::Device,
) -> RenderResult<vk::DescriptorSetLayout> {
    let bindings = [
        vk::DescriptorSetLayoutBinding {
            binding: 0,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: 1,
            descriptor_type: vk::DescriptorType::SAMPLED_IMAGE,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: 2,
            descriptor_type: vk::DescriptorType::SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
    ];

    let layout_info = vk::DescriptorSetLayoutCreateInfo {
        binding_count: bindings.len() as u32,
        p_bindings: bindings.as_ptr(),
        ..Default::default()
    };

    unsafe {
        device
            .create_descriptor_set_layout(&layout_info, None)
            .map_err(|e| RenderError::Pipeline(e.to_string()))
    }
}

/// The avatar pipelines plus their shared layout.
pub struct PipelineSet {
    pub layout: vk::PipelineLayout,
    /// Base layer and cape: opaque, depth write on.
    pub opaque: vk::Pipeline,
    /// Clothing layer: alpha blended, depth write off.
    pub overlay: vk::Pipeline,
}

impl PipelineSet {
    pub fn new(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        set_layout: vk::DescriptorSetLayout,
    ) -> RenderResult<Self> {
        let vs = compile_shader(device, SKIN_SHADER, naga::ShaderStage::Vertex, "vs_main")?;
        let fs = compile_shader(device, SKIN_SHADER, naga::ShaderStage::Fragment, "fs_main")?;
        let result = Self::build(device, render_pass, extent, set_layout, vs, fs);
        unsafe {
            device.destroy_shader_module(vs, None);
            device.destroy_shader_module(fs, None);
        }
        result
    }

    fn build(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        set_layout: vk::DescriptorSetLayout,
        vs: vk::ShaderModule,
        fs: vk::ShaderModule,
    ) -> RenderResult<Self> {
        let entry_vs = c"vs_main";
        let entry_fs = c"fs_main";

        let stages = [
            vk::PipelineShaderStageCreateInfo {
                stage: vk::ShaderStageFlags::VERTEX,
                module: vs,
                p_name: entry_vs.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: fs,
                p_name: entry_fs.as_ptr(),
                ..Default::default()
            },
        ];

        let binding = vk::VertexInputBindingDescription {
            binding: 0,
            stride: mem::size_of::<SkinVertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        };

        let attributes = [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            vertex_binding_description_count: 1,
            p_vertex_binding_descriptions: &binding,
            vertex_attribute_description_count: attributes.len() as u32,
            p_vertex_attribute_descriptions: attributes.as_ptr(),
            ..Default::default()
        };

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart_enable: vk::FALSE,
            ..Default::default()
        };

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            p_viewports: &viewport,
            scissor_count: 1,
            p_scissors: &scissor,
            ..Default::default()
        };

        let rasterizer = vk::PipelineRasterizationStateCreateInfo {
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            line_width: 1.0,
            ..Default::default()
        };

        let multisampling = vk::PipelineMultisampleStateCreateInfo {
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };

        let depth_write_on = vk::PipelineDepthStencilStateCreateInfo {
            depth_test_enable: vk::TRUE,
            depth_write_enable: vk::TRUE,
            depth_compare_op: vk::CompareOp::LESS,
            ..Default::default()
        };

        let opaque_attachment = vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::FALSE,
            color_write_mask: vk::ColorComponentFlags::RGBA,
            ..Default::default()
        };
        let opaque_blend = vk::PipelineColorBlendStateCreateInfo {
            attachment_count: 1,
            p_attachments: &opaque_attachment,
            ..Default::default()
        };

        let layout_info = vk::PipelineLayoutCreateInfo {
            set_layout_count: 1,
            p_set_layouts: &set_layout,
            ..Default::default()
        };

        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(|e| RenderError::Pipeline(e.to_string()))?
        };

        let mut pipeline_info = vk::GraphicsPipelineCreateInfo {
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &rasterizer,
            p_multisample_state: &multisampling,
            p_depth_stencil_state: &depth_write_on,
            p_color_blend_state: &opaque_blend,
            layout,
            render_pass,
            subpass: 0,
            ..Default::default()
        };

        let opaque = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| RenderError::Pipeline(e.to_string()))?[0]
        };

        let overlay_attachment = vk::PipelineColorBlendAttachmentState {
            blend_enable: vk::TRUE,
            src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        };
        let overlay_blend = vk::PipelineColorBlendStateCreateInfo {
            attachment_count: 1,
            p_attachments: &overlay_attachment,
            ..Default::default()
        };
        let depth_write_off = vk::PipelineDepthStencilStateCreateInfo {
            depth_test_enable: vk::TRUE,
            depth_write_enable: vk::FALSE,
            depth_compare_op: vk::CompareOp::LESS,
            ..Default::default()
        };

        pipeline_info.p_color_blend_state = &overlay_blend;
        pipeline_info.p_depth_stencil_state = &depth_write_off;

        let overlay = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| RenderError::Pipeline(e.to_string()))
        };
        let overlay = match overlay {
            Ok(pipelines) => pipelines[0],
            Err(e) => {
                unsafe {
                    device.destroy_pipeline(opaque, None);
                    device.destroy_pipeline_layout(layout, None);
                }
                return Err(e);
            }
        };

        Ok(PipelineSet {
            layout,
            opaque,
            overlay,
        })
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            device.destroy_pipeline(self.opaque, None);
            device.destroy_pipeline(self.overlay, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_validates_and_compiles_to_spirv() {
        let module = naga::front::wgsl::parse_str(SKIN_SHADER).expect("WGSL parses");

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        let info = validator.validate(&module).expect("module validates");

        for (entry, stage) in [
            ("vs_main", naga::ShaderStage::Vertex),
            ("fs_main", naga::ShaderStage::Fragment),
        ] {
            assert!(
                module
                    .entry_points
                    .iter()
                    .any(|ep| ep.name == entry && ep.stage == stage),
                "missing entry point {entry}"
            );

            let options = naga::back::spv::Options {
                lang_version: (1, 3),
                flags: naga::back::spv::WriterFlags::empty(),
                ..Default::default()
            };
            let pipeline_options = naga::back::spv::PipelineOptions {
                shader_stage: stage,
                entry_point: entry.to_string(),
            };
            let spv =
                naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
                    .expect("SPIR-V emits");
            assert!(!spv.is_empty());
        }
    }
}
