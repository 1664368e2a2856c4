//! GPU resources for the avatar
//!
//! Owns the 13 part meshes, the skin and cape textures, the per-image
//! dynamic uniform buffers and the descriptor sets tying them together.
//! Everything here is rebuilt wholesale on a skin or topology change; the
//! caller guarantees the device is idle when that happens.

use std::mem;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use image::RgbaImage;

use crate::error::{RenderError, RenderResult};
use crate::mesh::{self, PartMesh};
use crate::parts::{DrawUnit, PART_COUNT};
use crate::skin::SkinVariant;
use crate::vulkan::context::{GpuBuffer, VulkanContext};

/// Per-draw-unit uniform block; must match the shader's `PartUniform`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PartUniform {
    pub model: Mat4,
    pub proj: Mat4,
    pub view: Mat4,
    pub part: Mat4,
    pub light_color: Vec3,
    pub _pad: f32,
}

impl Default for PartUniform {
    fn default() -> Self {
        PartUniform {
            model: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            part: Mat4::IDENTITY,
            light_color: Vec3::ONE,
            _pad: 0.0,
        }
    }
}

/// Round `size` up to the next multiple of `alignment` (a power of two).
pub fn align_up(size: u64, alignment: u64) -> u64 {
    (size + alignment - 1) & !(alignment - 1)
}

/// Vertex/index buffers for one draw unit.
pub struct PartBuffers {
    pub vertex: GpuBuffer,
    pub index: GpuBuffer,
    pub index_count: u32,
}

/// A sampled 2D texture with its view.
pub struct Texture {
    pub image: vk::Image,
    pub view: vk::ImageView,
    allocation: Option<Allocation>,
}

impl Texture {
    /// Upload an RGBA bitmap into a device-local sampled image.
    pub fn from_rgba(context: &VulkanContext, name: &str, bitmap: &RgbaImage) -> RenderResult<Self> {
        let (width, height) = bitmap.dimensions();
        let device = &context.device;

        let mut staging = context.create_buffer(
            "texture staging",
            bitmap.as_raw().len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;
        if let Some(mapped) = staging.allocation.mapped_slice_mut() {
            mapped[..bitmap.as_raw().len()].copy_from_slice(bitmap.as_raw());
        } else {
            context.destroy_buffer(staging);
            return Err(RenderError::Texture("staging buffer not mapped".into()));
        }

        let image_info = vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            format: vk::Format::R8G8B8A8_SRGB,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };

        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(|e| RenderError::Texture(e.to_string()))?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let allocation = context
            .allocator
            .as_ref()
            .ok_or_else(|| RenderError::Allocation("allocator already released".into()))?
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| RenderError::Allocation(e.to_string()))?;

        unsafe {
            device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| RenderError::Texture(e.to_string()))?;
        }

        context.with_single_time_commands(|device, cmd| {
            transition_layout(
                device,
                cmd,
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );

            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                image_extent: vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                },
            };
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }

            transition_layout(
                device,
                cmd,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        })?;

        context.destroy_buffer(staging);

        let view_info = vk::ImageViewCreateInfo {
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: vk::Format::R8G8B8A8_SRGB,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };

        let view = unsafe {
            device
                .create_image_view(&view_info, None)
                .map_err(|e| RenderError::Texture(e.to_string()))?
        };

        Ok(Texture {
            image,
            view,
            allocation: Some(allocation),
        })
    }

    pub fn destroy(mut self, context: &VulkanContext) {
        unsafe {
            context.device.destroy_image_view(self.view, None);
            context.device.destroy_image(self.image, None);
        }
        if let (Some(allocation), Some(allocator)) =
            (self.allocation.take(), context.allocator.as_ref())
        {
            let _ = allocator.lock().free(allocation);
        }
    }
}

fn transition_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        _ => (
            vk::AccessFlags::MEMORY_WRITE,
            vk::AccessFlags::MEMORY_READ,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::ALL_COMMANDS,
        ),
    };

    let barrier = vk::ImageMemoryBarrier {
        src_access_mask: src_access,
        dst_access_mask: dst_access,
        old_layout,
        new_layout,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

/// Mesh buffers, textures, uniforms and descriptor sets for the avatar.
pub struct AvatarResources {
    pub parts: Vec<PartBuffers>,
    pub skin_texture: Option<Texture>,
    pub cape_texture: Option<Texture>,
    pub sampler: vk::Sampler,
    /// One dynamic uniform buffer per swapchain image, persistently mapped.
    pub uniform_buffers: Vec<GpuBuffer>,
    /// Aligned distance between consecutive part blocks.
    pub uniform_stride: u64,
    pub descriptor_pool: vk::DescriptorPool,
    /// Per swapchain image, sampling the skin texture.
    pub skin_sets: Vec<vk::DescriptorSet>,
    /// Per swapchain image, sampling the cape texture.
    pub cape_sets: Vec<vk::DescriptorSet>,
}

impl AvatarResources {
    pub fn new(context: &VulkanContext, image_count: usize) -> RenderResult<Self> {
        let sampler = create_sampler(context)?;

        let uniform_stride = align_up(
            mem::size_of::<PartUniform>() as u64,
            context.min_uniform_offset_alignment.max(1),
        );

        let mut uniform_buffers = Vec::with_capacity(image_count);
        for i in 0..image_count {
            uniform_buffers.push(context.create_buffer(
                &format!("part uniforms {i}"),
                uniform_stride * PART_COUNT as u64,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
            )?);
        }

        let descriptor_pool = create_descriptor_pool(&context.device, image_count)?;

        Ok(AvatarResources {
            parts: Vec::new(),
            skin_texture: None,
            cape_texture: None,
            sampler,
            uniform_buffers,
            uniform_stride,
            descriptor_pool,
            skin_sets: Vec::new(),
            cape_sets: Vec::new(),
        })
    }

    /// Resize the per-image uniform buffers and descriptor pool after a
    /// swapchain recreate changed the image count. Descriptor sets must be
    /// rebuilt afterwards.
    pub fn resize_per_image(
        &mut self,
        context: &VulkanContext,
        image_count: usize,
    ) -> RenderResult<()> {
        if self.uniform_buffers.len() == image_count {
            return Ok(());
        }
        for buffer in self.uniform_buffers.drain(..) {
            context.destroy_buffer(buffer);
        }
        for i in 0..image_count {
            self.uniform_buffers.push(context.create_buffer(
                &format!("part uniforms {i}"),
                self.uniform_stride * PART_COUNT as u64,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
            )?);
        }
        unsafe {
            context
                .device
                .destroy_descriptor_pool(self.descriptor_pool, None);
        }
        self.descriptor_pool = create_descriptor_pool(&context.device, image_count)?;
        self.skin_sets.clear();
        self.cape_sets.clear();
        Ok(())
    }

    /// Regenerate every part mesh for the given variant.
    pub fn rebuild_meshes(
        &mut self,
        context: &VulkanContext,
        variant: SkinVariant,
    ) -> RenderResult<()> {
        for part in self.parts.drain(..) {
            context.destroy_buffer(part.vertex);
            context.destroy_buffer(part.index);
        }

        for unit in DrawUnit::ALL {
            let mesh = mesh::generate_part(unit, variant);
            self.parts.push(upload_mesh(context, unit, &mesh)?);
        }

        log::debug!("rebuilt {} part meshes for {variant:?}", self.parts.len());
        Ok(())
    }

    /// Replace the skin texture (or drop it).
    pub fn set_skin_texture(
        &mut self,
        context: &VulkanContext,
        bitmap: Option<&RgbaImage>,
    ) -> RenderResult<()> {
        if let Some(old) = self.skin_texture.take() {
            old.destroy(context);
        }
        if let Some(bitmap) = bitmap {
            self.skin_texture = Some(Texture::from_rgba(context, "skin", bitmap)?);
        }
        Ok(())
    }

    /// Replace the cape texture (or drop it).
    pub fn set_cape_texture(
        &mut self,
        context: &VulkanContext,
        bitmap: Option<&RgbaImage>,
    ) -> RenderResult<()> {
        if let Some(old) = self.cape_texture.take() {
            old.destroy(context);
        }
        if let Some(bitmap) = bitmap {
            self.cape_texture = Some(Texture::from_rgba(context, "cape", bitmap)?);
        }
        Ok(())
    }

    /// Throw away every descriptor set and reallocate them against the
    /// current textures. Requires an idle device.
    pub fn rebuild_descriptor_sets(
        &mut self,
        context: &VulkanContext,
        set_layout: vk::DescriptorSetLayout,
    ) -> RenderResult<()> {
        let device = &context.device;
        let image_count = self.uniform_buffers.len();

        unsafe {
            device
                .reset_descriptor_pool(self.descriptor_pool, vk::DescriptorPoolResetFlags::empty())
                .map_err(|e| RenderError::Pipeline(e.to_string()))?;
        }
        self.skin_sets.clear();
        self.cape_sets.clear();

        let layouts = vec![set_layout; image_count];
        let alloc_info = vk::DescriptorSetAllocateInfo {
            descriptor_pool: self.descriptor_pool,
            descriptor_set_count: layouts.len() as u32,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };

        // Sets exist only for textures that exist; the recorder treats an
        // empty list as "skip", so an unwritten set is never bindable.
        if let Some(skin) = &self.skin_texture {
            self.skin_sets = unsafe {
                device
                    .allocate_descriptor_sets(&alloc_info)
                    .map_err(|e| RenderError::Pipeline(e.to_string()))?
            };
            for i in 0..image_count {
                self.write_set(device, self.skin_sets[i], &self.uniform_buffers[i], skin.view);
            }
        }
        if let Some(cape) = &self.cape_texture {
            self.cape_sets = unsafe {
                device
                    .allocate_descriptor_sets(&alloc_info)
                    .map_err(|e| RenderError::Pipeline(e.to_string()))?
            };
            for i in 0..image_count {
                self.write_set(device, self.cape_sets[i], &self.uniform_buffers[i], cape.view);
            }
        }

        Ok(())
    }

    fn write_set(
        &self,
        device: &ash::Device,
        set: vk::DescriptorSet,
        uniforms: &GpuBuffer,
        view: vk::ImageView,
    ) {
        let buffer_info = vk::DescriptorBufferInfo {
            buffer: uniforms.buffer,
            offset: 0,
            range: mem::size_of::<PartUniform>() as u64,
        };
        let image_info = vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let sampler_info = vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: vk::ImageView::null(),
            image_layout: vk::ImageLayout::UNDEFINED,
        };

        let writes = [
            vk::WriteDescriptorSet {
                dst_set: set,
                dst_binding: 0,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                p_buffer_info: &buffer_info,
                ..Default::default()
            },
            vk::WriteDescriptorSet {
                dst_set: set,
                dst_binding: 1,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::SAMPLED_IMAGE,
                p_image_info: &image_info,
                ..Default::default()
            },
            vk::WriteDescriptorSet {
                dst_set: set,
                dst_binding: 2,
                descriptor_count: 1,
                descriptor_type: vk::DescriptorType::SAMPLER,
                p_image_info: &sampler_info,
                ..Default::default()
            },
        ];

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }

    /// Write this frame's 13 uniform blocks into the buffer for `image`.
    pub fn write_uniforms(
        &mut self,
        image: usize,
        uniforms: &[PartUniform; PART_COUNT],
    ) -> RenderResult<()> {
        let stride = self.uniform_stride as usize;
        let buffer = self
            .uniform_buffers
            .get_mut(image)
            .ok_or_else(|| RenderError::Buffer("uniform buffer index out of range".into()))?;
        let mapped = buffer
            .allocation
            .mapped_slice_mut()
            .ok_or_else(|| RenderError::Buffer("uniform buffer not mapped".into()))?;

        for (slot, uniform) in uniforms.iter().enumerate() {
            let bytes = bytemuck::bytes_of(uniform);
            let start = slot * stride;
            mapped[start..start + bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    /// Dynamic offset for a draw unit's uniform block.
    pub fn uniform_offset(&self, unit: DrawUnit) -> u32 {
        (unit.index() as u64 * self.uniform_stride) as u32
    }

    pub fn destroy(&mut self, context: &VulkanContext) {
        let device = &context.device;
        for part in self.parts.drain(..) {
            context.destroy_buffer(part.vertex);
            context.destroy_buffer(part.index);
        }
        if let Some(skin) = self.skin_texture.take() {
            skin.destroy(context);
        }
        if let Some(cape) = self.cape_texture.take() {
            cape.destroy(context);
        }
        for buffer in self.uniform_buffers.drain(..) {
            context.destroy_buffer(buffer);
        }
        unsafe {
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            device.destroy_sampler(self.sampler, None);
        }
    }
}

fn upload_mesh(
    context: &VulkanContext,
    unit: DrawUnit,
    mesh: &PartMesh,
) -> RenderResult<PartBuffers> {
    let vertex = context.create_buffer_init(
        "part vertices",
        vk::BufferUsageFlags::VERTEX_BUFFER,
        bytemuck::cast_slice(&mesh.vertices),
    )?;
    let index = match context.create_buffer_init(
        "part indices",
        vk::BufferUsageFlags::INDEX_BUFFER,
        bytemuck::cast_slice(&mesh.indices),
    ) {
        Ok(buffer) => buffer,
        Err(e) => {
            context.destroy_buffer(vertex);
            return Err(e);
        }
    };

    log::trace!("uploaded mesh for {unit:?}");
    Ok(PartBuffers {
        vertex,
        index,
        index_count: mesh.indices.len() as u32,
    })
}

fn create_sampler(context: &VulkanContext) -> RenderResult<vk::Sampler> {
    let properties = unsafe {
        context
            .instance
            .get_physical_device_properties(context.physical_device)
    };
    let features = unsafe {
        context
            .instance
            .get_physical_device_features(context.physical_device)
    };

    // Nearest filtering keeps the pixel-art texels crisp.
    let sampler_info = vk::SamplerCreateInfo {
        mag_filter: vk::Filter::NEAREST,
        min_filter: vk::Filter::NEAREST,
        mipmap_mode: vk::SamplerMipmapMode::NEAREST,
        address_mode_u: vk::SamplerAddressMode::REPEAT,
        address_mode_v: vk::SamplerAddressMode::REPEAT,
        address_mode_w: vk::SamplerAddressMode::REPEAT,
        anisotropy_enable: features.sampler_anisotropy,
        max_anisotropy: properties.limits.max_sampler_anisotropy,
        border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        compare_op: vk::CompareOp::ALWAYS,
        ..Default::default()
    };

    unsafe {
        context
            .device
            .create_sampler(&sampler_info, None)
            .map_err(|e| RenderError::Texture(e.to_string()))
    }
}

fn create_descriptor_pool(
    device: &ash::Device,
    image_count: usize,
) -> RenderResult<vk::DescriptorPool> {
    // Two sets per swapchain image: one sampling the skin, one the cape.
    let max_sets = (image_count * 2) as u32;
    let pool_sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            descriptor_count: max_sets,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::SAMPLED_IMAGE,
            descriptor_count: max_sets,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::SAMPLER,
            descriptor_count: max_sets,
        },
    ];

    let pool_info = vk::DescriptorPoolCreateInfo {
        max_sets,
        pool_size_count: pool_sizes.len() as u32,
        p_pool_sizes: pool_sizes.as_ptr(),
        ..Default::default()
    };

    unsafe {
        device
            .create_descriptor_pool(&pool_info, None)
            .map_err(|e| RenderError::Pipeline(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_is_tightly_packed() {
        // Four mat4s plus vec3 + pad.
        assert_eq!(mem::size_of::<PartUniform>(), 272);
    }

    #[test]
    fn align_up_rounds_to_alignment() {
        assert_eq!(align_up(272, 256), 512);
        assert_eq!(align_up(272, 64), 320);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(1, 1), 1);
    }
}
