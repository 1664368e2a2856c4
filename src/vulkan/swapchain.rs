//! Swapchain, depth buffer and framebuffers
//!
//! All of the per-surface objects that die together on a resize live here.
//! Recreation tears the whole bundle down under a device idle and rebuilds
//! it at the new extent; the render pass is recreated with it so a format
//! change on another monitor is absorbed too.

use ash::khr::swapchain;
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use crate::error::{RenderError, RenderResult};
use crate::vulkan::context::VulkanContext;

pub struct SwapchainBundle {
    pub swapchain_fn: swapchain::Device,
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
    depth_image: vk::Image,
    depth_view: vk::ImageView,
    depth_allocation: Option<Allocation>,
    vsync: bool,
}

impl SwapchainBundle {
    pub fn new(
        context: &VulkanContext,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> RenderResult<Self> {
        let swapchain_fn = swapchain::Device::new(&context.instance, &context.device);
        let mut bundle = SwapchainBundle {
            swapchain_fn,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: vk::Format::B8G8R8A8_SRGB,
            extent: vk::Extent2D { width: 0, height: 0 },
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            depth_image: vk::Image::null(),
            depth_view: vk::ImageView::null(),
            depth_allocation: None,
            vsync,
        };
        bundle.recreate(context, width, height)?;
        Ok(bundle)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Tear down and rebuild everything at the given extent. A 0x0 surface
    /// (minimized window) keeps the old bundle; the caller retries once the
    /// surface has an area again.
    pub fn recreate(
        &mut self,
        context: &VulkanContext,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        let capabilities = unsafe {
            context
                .surface_fn
                .get_physical_device_surface_capabilities(context.physical_device, context.surface)
                .map_err(|e| RenderError::Swapchain(e.to_string()))?
        };
        let Some(extent) = select_extent(&capabilities, width, height) else {
            log::debug!("surface has zero area, deferring swapchain recreation");
            return Ok(());
        };

        unsafe {
            let _ = context.device.device_wait_idle();
        }
        self.destroy_resources(context);

        let device = &context.device;
        unsafe {
            let formats = context
                .surface_fn
                .get_physical_device_surface_formats(context.physical_device, context.surface)
                .map_err(|e| RenderError::Swapchain(e.to_string()))?;

            let present_modes = context
                .surface_fn
                .get_physical_device_surface_present_modes(
                    context.physical_device,
                    context.surface,
                )
                .map_err(|e| RenderError::Swapchain(e.to_string()))?;

            let format = formats
                .iter()
                .find(|f| {
                    f.format == vk::Format::B8G8R8A8_SRGB
                        && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
                })
                .or_else(|| formats.first())
                .ok_or_else(|| RenderError::Swapchain("no surface formats".into()))?;

            let present_mode = if self.vsync {
                vk::PresentModeKHR::FIFO
            } else {
                present_modes
                    .iter()
                    .copied()
                    .find(|&m| m == vk::PresentModeKHR::MAILBOX)
                    .unwrap_or(vk::PresentModeKHR::FIFO)
            };

            let image_count = (capabilities.min_image_count + 1).min(
                if capabilities.max_image_count > 0 {
                    capabilities.max_image_count
                } else {
                    u32::MAX
                },
            );

            let swapchain_info = vk::SwapchainCreateInfoKHR {
                surface: context.surface,
                min_image_count: image_count,
                image_format: format.format,
                image_color_space: format.color_space,
                image_extent: extent,
                image_array_layers: 1,
                image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                image_sharing_mode: vk::SharingMode::EXCLUSIVE,
                pre_transform: capabilities.current_transform,
                composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                present_mode,
                clipped: vk::TRUE,
                ..Default::default()
            };

            self.swapchain = self
                .swapchain_fn
                .create_swapchain(&swapchain_info, None)
                .map_err(|e| RenderError::Swapchain(e.to_string()))?;

            self.images = self
                .swapchain_fn
                .get_swapchain_images(self.swapchain)
                .map_err(|e| RenderError::Swapchain(e.to_string()))?;

            self.format = format.format;
            self.extent = extent;

            self.image_views = self
                .images
                .iter()
                .map(|&image| {
                    let view_info = vk::ImageViewCreateInfo {
                        image,
                        view_type: vk::ImageViewType::TYPE_2D,
                        format: self.format,
                        components: vk::ComponentMapping::default(),
                        subresource_range: vk::ImageSubresourceRange {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            base_mip_level: 0,
                            level_count: 1,
                            base_array_layer: 0,
                            layer_count: 1,
                        },
                        ..Default::default()
                    };
                    device.create_image_view(&view_info, None)
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| RenderError::Swapchain(e.to_string()))?;

            let depth_format = context.find_depth_format()?;
            self.create_depth_buffer(context, depth_format)?;
            self.render_pass = Self::create_render_pass(device, self.format, depth_format)?;

            self.framebuffers = self
                .image_views
                .iter()
                .map(|&view| {
                    let attachments = [view, self.depth_view];
                    let fb_info = vk::FramebufferCreateInfo {
                        render_pass: self.render_pass,
                        attachment_count: attachments.len() as u32,
                        p_attachments: attachments.as_ptr(),
                        width: extent.width,
                        height: extent.height,
                        layers: 1,
                        ..Default::default()
                    };
                    device.create_framebuffer(&fb_info, None)
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| RenderError::Swapchain(e.to_string()))?;

            log::debug!(
                "swapchain {}x{} with {} images",
                extent.width,
                extent.height,
                self.images.len()
            );

            Ok(())
        }
    }

    fn create_depth_buffer(
        &mut self,
        context: &VulkanContext,
        format: vk::Format,
    ) -> RenderResult<()> {
        let device = &context.device;
        unsafe {
            let image_info = vk::ImageCreateInfo {
                image_type: vk::ImageType::TYPE_2D,
                format,
                extent: vk::Extent3D {
                    width: self.extent.width,
                    height: self.extent.height,
                    depth: 1,
                },
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                ..Default::default()
            };

            let image = device
                .create_image(&image_info, None)
                .map_err(|e| RenderError::Texture(e.to_string()))?;

            let requirements = device.get_image_memory_requirements(image);
            let allocation = context
                .allocator
                .as_ref()
                .ok_or_else(|| RenderError::Allocation("allocator already released".into()))?
                .lock()
                .allocate(&AllocationCreateDesc {
                    name: "depth",
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| RenderError::Allocation(e.to_string()))?;

            device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| RenderError::Texture(e.to_string()))?;

            let view_info = vk::ImageViewCreateInfo {
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::DEPTH,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };

            let view = device
                .create_image_view(&view_info, None)
                .map_err(|e| RenderError::Texture(e.to_string()))?;

            self.depth_image = image;
            self.depth_view = view;
            self.depth_allocation = Some(allocation);
            Ok(())
        }
    }

    fn create_render_pass(
        device: &ash::Device,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> RenderResult<vk::RenderPass> {
        let attachments = [
            vk::AttachmentDescription {
                format: color_format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                ..Default::default()
            },
            vk::AttachmentDescription {
                format: depth_format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                ..Default::default()
            },
        ];

        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            p_depth_stencil_attachment: &depth_ref,
            ..Default::default()
        };

        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ..Default::default()
        };

        let render_pass_info = vk::RenderPassCreateInfo {
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };

        unsafe {
            device
                .create_render_pass(&render_pass_info, None)
                .map_err(|e| RenderError::Swapchain(e.to_string()))
        }
    }

    fn destroy_resources(&mut self, context: &VulkanContext) {
        let device = &context.device;
        unsafe {
            for fb in self.framebuffers.drain(..) {
                device.destroy_framebuffer(fb, None);
            }
            if self.render_pass != vk::RenderPass::null() {
                device.destroy_render_pass(self.render_pass, None);
                self.render_pass = vk::RenderPass::null();
            }
            if self.depth_view != vk::ImageView::null() {
                device.destroy_image_view(self.depth_view, None);
                self.depth_view = vk::ImageView::null();
            }
            if self.depth_image != vk::Image::null() {
                device.destroy_image(self.depth_image, None);
                self.depth_image = vk::Image::null();
            }
            if let (Some(allocation), Some(allocator)) =
                (self.depth_allocation.take(), context.allocator.as_ref())
            {
                let _ = allocator.lock().free(allocation);
            }
            for view in self.image_views.drain(..) {
                device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_fn.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
        }
    }

    /// Explicit teardown; must run before the context is dropped.
    pub fn destroy(&mut self, context: &VulkanContext) {
        self.destroy_resources(context);
    }
}

/// Swapchain extent for the surface, or `None` while it has zero area.
/// The surface dictates the extent unless it reports the "window manager
/// decides" sentinel, in which case the requested size is clamped.
fn select_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> Option<vk::Extent2D> {
    let extent = if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    };
    if extent.width == 0 || extent.height == 0 {
        None
    } else {
        Some(extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unconstrained(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: min,
                height: min,
            },
            max_image_extent: vk::Extent2D {
                width: max,
                height: max,
            },
            ..Default::default()
        }
    }

    #[test]
    fn minimized_surface_yields_no_extent() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 0,
                height: 0,
            },
            ..Default::default()
        };
        assert!(select_extent(&capabilities, 800, 600).is_none());
    }

    #[test]
    fn zero_requested_size_yields_no_extent() {
        assert!(select_extent(&unconstrained(0, 4096), 0, 0).is_none());
    }

    #[test]
    fn surface_extent_wins_over_requested_size() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1024,
                height: 768,
            },
            ..Default::default()
        };
        let extent = select_extent(&capabilities, 1, 1).unwrap();
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn requested_size_is_clamped_when_unconstrained() {
        let extent = select_extent(&unconstrained(1, 4096), 8192, 600).unwrap();
        assert_eq!((extent.width, extent.height), (4096, 600));
    }
}
