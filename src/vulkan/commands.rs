//! Command buffer recording
//!
//! One primary command buffer per swapchain image, re-recorded whenever the
//! resources or visibility options change. Draw order is fixed: base layer
//! first with the opaque pipeline, then the blended overlay layer, then the
//! cape. With no usable skin the pass degenerates to a background clear.

use ash::vk;
use glam::Vec4;

use crate::error::{RenderError, RenderResult};
use crate::parts::DrawUnit;
use crate::skin::SkinVariant;
use crate::vulkan::pipeline::PipelineSet;
use crate::vulkan::resources::AvatarResources;
use crate::vulkan::swapchain::SwapchainBundle;

/// What to draw this frame, resolved from the control state.
#[derive(Debug, Clone, Copy)]
pub struct DrawSettings {
    pub background: Vec4,
    pub draw_avatar: bool,
    pub draw_overlay: bool,
    pub draw_cape: bool,
    pub variant: SkinVariant,
}

/// Record the full render pass for one swapchain image.
pub fn record_frame(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    swapchain: &SwapchainBundle,
    image_index: usize,
    pipelines: &PipelineSet,
    resources: &AvatarResources,
    settings: &DrawSettings,
) -> RenderResult<()> {
    unsafe {
        device
            .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
            .map_err(|e| RenderError::Command(e.to_string()))?;

        let begin_info = vk::CommandBufferBeginInfo::default();
        device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(|e| RenderError::Command(e.to_string()))?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: settings.background.to_array(),
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let render_pass_info = vk::RenderPassBeginInfo {
            render_pass: swapchain.render_pass,
            framebuffer: swapchain.framebuffers[image_index],
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: swapchain.extent,
            },
            clear_value_count: clear_values.len() as u32,
            p_clear_values: clear_values.as_ptr(),
            ..Default::default()
        };

        device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);

        if settings.draw_avatar && !resources.skin_sets.is_empty() {
            let skin_set = resources.skin_sets[image_index];

            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipelines.opaque);
            for unit in DrawUnit::BASE_DRAW_ORDER {
                draw_unit(device, cmd, pipelines, resources, skin_set, unit);
            }

            // Overlay units stay resident but are skipped entirely for the
            // legacy layout and when the host hides the clothing layer.
            if settings.draw_overlay && settings.variant.has_limb_overlay() {
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipelines.overlay);
                for unit in DrawUnit::OVERLAY_DRAW_ORDER {
                    draw_unit(device, cmd, pipelines, resources, skin_set, unit);
                }
            }

            if settings.draw_cape && !resources.cape_sets.is_empty() {
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipelines.opaque);
                let cape_set = resources.cape_sets[image_index];
                draw_unit(device, cmd, pipelines, resources, cape_set, DrawUnit::Cape);
            }
        }

        device.cmd_end_render_pass(cmd);
        device
            .end_command_buffer(cmd)
            .map_err(|e| RenderError::Command(e.to_string()))?;
    }

    Ok(())
}

fn draw_unit(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    pipelines: &PipelineSet,
    resources: &AvatarResources,
    set: vk::DescriptorSet,
    unit: DrawUnit,
) {
    let part = &resources.parts[unit.index()];
    let offset = resources.uniform_offset(unit);

    unsafe {
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            pipelines.layout,
            0,
            &[set],
            &[offset],
        );
        device.cmd_bind_vertex_buffers(cmd, 0, &[part.vertex.buffer], &[0]);
        device.cmd_bind_index_buffer(cmd, part.index.buffer, 0, vk::IndexType::UINT16);
        device.cmd_draw_indexed(cmd, part.index_count, 1, 0, 0, 0);
    }
}
