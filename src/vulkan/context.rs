//! Device bring-up and shared GPU plumbing
//!
//! Instance, surface, device and queue selection, plus the small helpers the
//! rest of the renderer leans on: single-shot command buffers, buffer
//! creation through the allocator and staged uploads into device-local
//! memory.

use std::ffi::CStr;
use std::sync::Arc;

use ash::khr::{surface, swapchain};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::{RenderError, RenderResult};

/// Everything that outlives the swapchain: instance, device, queue,
/// allocator and the shared command pool.
pub struct VulkanContext {
    pub _entry: ash::Entry,
    pub instance: ash::Instance,
    pub surface_fn: surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue: vk::Queue,
    pub queue_family: u32,
    // Option so Drop can release the allocator before the device.
    pub allocator: Option<Arc<Mutex<Allocator>>>,
    pub command_pool: vk::CommandPool,
    pub min_uniform_offset_alignment: u64,
}

/// Buffer plus its backing allocation.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Allocation,
    pub size: u64,
}

impl VulkanContext {
    pub fn new<W>(window: &W) -> RenderResult<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| RenderError::Initialization(e.to_string()))?;

            let app_name = CStr::from_bytes_with_nul(b"Skin Renderer\0")
                .map_err(|e| RenderError::Initialization(e.to_string()))?;

            let app_info = vk::ApplicationInfo {
                p_application_name: app_name.as_ptr(),
                application_version: vk::make_api_version(0, 1, 0, 0),
                p_engine_name: app_name.as_ptr(),
                engine_version: vk::make_api_version(0, 1, 0, 0),
                api_version: vk::API_VERSION_1_2,
                ..Default::default()
            };

            let display_handle = window
                .display_handle()
                .map_err(|e| RenderError::Initialization(e.to_string()))?;
            let window_handle = window
                .window_handle()
                .map_err(|e| RenderError::Initialization(e.to_string()))?;

            let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| RenderError::Initialization(e.to_string()))?
                .to_vec();

            let instance_info = vk::InstanceCreateInfo {
                p_application_info: &app_info,
                enabled_extension_count: extensions.len() as u32,
                pp_enabled_extension_names: extensions.as_ptr(),
                ..Default::default()
            };

            let instance = entry
                .create_instance(&instance_info, None)
                .map_err(|e| RenderError::Initialization(e.to_string()))?;

            let surface_fn = surface::Instance::new(&entry, &instance);
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| RenderError::Surface(e.to_string()))?;

            let physical_devices = instance
                .enumerate_physical_devices()
                .map_err(|e| RenderError::Initialization(e.to_string()))?;

            let physical_device = physical_devices
                .into_iter()
                .find(|&pd| Self::find_queue_family(&instance, pd, &surface_fn, surface).is_some())
                .ok_or_else(|| {
                    RenderError::Initialization("no suitable physical device".into())
                })?;

            let queue_family =
                Self::find_queue_family(&instance, physical_device, &surface_fn, surface)
                    .ok_or_else(|| {
                        RenderError::Initialization("no suitable queue family".into())
                    })?;

            let queue_priorities = [1.0f32];
            let queue_info = vk::DeviceQueueCreateInfo {
                queue_family_index: queue_family,
                queue_count: 1,
                p_queue_priorities: queue_priorities.as_ptr(),
                ..Default::default()
            };

            let device_extensions = [swapchain::NAME.as_ptr()];
            let supported = instance.get_physical_device_features(physical_device);
            let device_features = vk::PhysicalDeviceFeatures {
                sampler_anisotropy: supported.sampler_anisotropy,
                ..Default::default()
            };

            let device_info = vk::DeviceCreateInfo {
                queue_create_info_count: 1,
                p_queue_create_infos: &queue_info,
                enabled_extension_count: device_extensions.len() as u32,
                pp_enabled_extension_names: device_extensions.as_ptr(),
                p_enabled_features: &device_features,
                ..Default::default()
            };

            let device = instance
                .create_device(physical_device, &device_info, None)
                .map_err(|e| RenderError::Device(e.to_string()))?;

            let queue = device.get_device_queue(queue_family, 0);

            let limits = instance
                .get_physical_device_properties(physical_device)
                .limits;

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| RenderError::Initialization(e.to_string()))?;

            let pool_info = vk::CommandPoolCreateInfo {
                queue_family_index: queue_family,
                flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
                ..Default::default()
            };

            let command_pool = device
                .create_command_pool(&pool_info, None)
                .map_err(|e| RenderError::Initialization(e.to_string()))?;

            log::info!(
                "vulkan device ready, queue family {queue_family}, ubo alignment {}",
                limits.min_uniform_buffer_offset_alignment
            );

            Ok(Self {
                _entry: entry,
                instance,
                surface_fn,
                surface,
                physical_device,
                device,
                queue,
                queue_family,
                allocator: Some(Arc::new(Mutex::new(allocator))),
                command_pool,
                min_uniform_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            })
        }
    }

    fn find_queue_family(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface_fn: &surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Option<u32> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        for (index, family) in queue_families.iter().enumerate() {
            let supports_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let supports_surface = unsafe {
                surface_fn
                    .get_physical_device_surface_support(physical_device, index as u32, surface)
                    .unwrap_or(false)
            };
            if supports_graphics && supports_surface {
                return Some(index as u32);
            }
        }
        None
    }

    fn allocator(&self) -> RenderResult<&Arc<Mutex<Allocator>>> {
        self.allocator
            .as_ref()
            .ok_or_else(|| RenderError::Allocation("allocator already released".into()))
    }

    /// First depth format the device supports as a depth attachment.
    pub fn find_depth_format(&self) -> RenderResult<vk::Format> {
        let candidates = [
            vk::Format::D32_SFLOAT,
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D24_UNORM_S8_UINT,
        ];
        for format in candidates {
            let props = unsafe {
                self.instance
                    .get_physical_device_format_properties(self.physical_device, format)
            };
            if props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            {
                return Ok(format);
            }
        }
        Err(RenderError::Initialization(
            "no supported depth format".into(),
        ))
    }

    /// Create a buffer backed by a fresh allocation.
    pub fn create_buffer(
        &self,
        name: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> RenderResult<GpuBuffer> {
        unsafe {
            let buffer_info = vk::BufferCreateInfo {
                size,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                ..Default::default()
            };

            let buffer = self
                .device
                .create_buffer(&buffer_info, None)
                .map_err(|e| RenderError::Buffer(e.to_string()))?;

            let requirements = self.device.get_buffer_memory_requirements(buffer);

            let allocation = self
                .allocator()?
                .lock()
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| RenderError::Allocation(e.to_string()))?;

            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .map_err(|e| RenderError::Buffer(e.to_string()))?;

            Ok(GpuBuffer {
                buffer,
                allocation,
                size,
            })
        }
    }

    /// Create a device-local buffer and fill it through a staging copy.
    pub fn create_buffer_init(
        &self,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[u8],
    ) -> RenderResult<GpuBuffer> {
        let size = data.len() as u64;
        let mut staging = self.create_buffer(
            "staging",
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
        )?;

        if let Some(mapped) = staging.allocation.mapped_slice_mut() {
            mapped[..data.len()].copy_from_slice(data);
        } else {
            self.destroy_buffer(staging);
            return Err(RenderError::Buffer("staging buffer not mapped".into()));
        }

        let dst = self.create_buffer(
            name,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
        )?;

        let result = self.with_single_time_commands(|device, cmd| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe { device.cmd_copy_buffer(cmd, staging.buffer, dst.buffer, &[region]) };
        });

        self.destroy_buffer(staging);

        match result {
            Ok(()) => Ok(dst),
            Err(e) => {
                self.destroy_buffer(dst);
                Err(e)
            }
        }
    }

    pub fn destroy_buffer(&self, buffer: GpuBuffer) {
        unsafe {
            self.device.destroy_buffer(buffer.buffer, None);
        }
        if let Some(allocator) = self.allocator.as_ref() {
            let _ = allocator.lock().free(buffer.allocation);
        }
    }

    /// Record and synchronously submit a one-shot command buffer.
    pub fn with_single_time_commands<F>(&self, record: F) -> RenderResult<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        unsafe {
            let alloc_info = vk::CommandBufferAllocateInfo {
                command_pool: self.command_pool,
                level: vk::CommandBufferLevel::PRIMARY,
                command_buffer_count: 1,
                ..Default::default()
            };

            let cmd = self
                .device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| RenderError::Command(e.to_string()))?[0];

            let begin_info = vk::CommandBufferBeginInfo {
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };
            self.device
                .begin_command_buffer(cmd, &begin_info)
                .map_err(|e| RenderError::Command(e.to_string()))?;

            record(&self.device, cmd);

            self.device
                .end_command_buffer(cmd)
                .map_err(|e| RenderError::Command(e.to_string()))?;

            let submit_info = vk::SubmitInfo {
                command_buffer_count: 1,
                p_command_buffers: &cmd,
                ..Default::default()
            };

            let submit = self
                .device
                .queue_submit(self.queue, &[submit_info], vk::Fence::null())
                .map_err(|e| RenderError::Command(e.to_string()))
                .and_then(|_| {
                    self.device
                        .queue_wait_idle(self.queue)
                        .map_err(|e| RenderError::Command(e.to_string()))
                });

            self.device.free_command_buffers(self.command_pool, &[cmd]);
            submit
        }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
            drop(self.allocator.take());
            self.device.destroy_device(None);
            self.surface_fn.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}
