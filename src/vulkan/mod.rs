//! Vulkan renderer
//!
//! Owns the device context, the swapchain bundle, the avatar resources and
//! the per-frame synchronization, and drives the frame loop: wait, acquire,
//! reconcile pending state changes, update transforms, record if stale,
//! submit, present. Hot swaps (skin, variant, visibility) are reconciled
//! under a full device idle before any command buffer referencing the old
//! resources can be re-submitted.

pub mod commands;
pub mod context;
pub mod pipeline;
pub mod resources;
pub mod swapchain;

use std::sync::Arc;

use ash::vk;
use glam::Vec4;
use image::RgbaImage;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::{RenderError, RenderResult};
use crate::events::{EventQueue, FpsCounter, RenderEvent};
use crate::parts::{DrawUnit, PART_COUNT};
use crate::skin::SkinVariant;
use crate::state::ControlState;
use crate::RendererConfig;

use commands::{record_frame, DrawSettings};
use context::VulkanContext;
use pipeline::{create_descriptor_set_layout, PipelineSet};
use resources::{AvatarResources, PartUniform};
use swapchain::SwapchainBundle;

/// Upper bound on frames submitted but not yet fenced.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Cloneable, thread-safe handle to the renderer's control surface.
///
/// Every mutator is fire-and-forget: it flips state under the lock and the
/// change takes effect on the next frame.
#[derive(Clone)]
pub struct RendererControl {
    state: Arc<Mutex<ControlState>>,
    events: EventQueue,
}

impl RendererControl {
    pub fn set_skin(&self, bitmap: Option<RgbaImage>) {
        self.state.lock().set_skin(bitmap);
    }

    pub fn set_cape(&self, bitmap: Option<RgbaImage>) {
        self.state.lock().set_cape(bitmap);
    }

    pub fn set_variant(&self, variant: Option<SkinVariant>) {
        self.state.lock().set_variant(variant);
    }

    pub fn set_animation(&self, enable: bool) {
        self.state.lock().set_animation(enable);
    }

    pub fn set_overlay_visible(&self, visible: bool) {
        self.state.lock().set_overlay_visible(visible);
    }

    pub fn set_cape_visible(&self, visible: bool) {
        self.state.lock().set_cape_visible(visible);
    }

    pub fn set_background(&self, color: Vec4) {
        self.state.lock().background = color;
    }

    pub fn set_light_color(&self, color: glam::Vec3) {
        self.state.lock().light_color = color;
    }

    pub fn orbit(&self, x: f32, y: f32) {
        self.state.lock().camera.orbit(x, y);
    }

    pub fn pan(&self, x: f32, y: f32) {
        self.state.lock().camera.pan(x, y);
    }

    pub fn zoom(&self, delta: f32) {
        self.state.lock().camera.zoom(delta);
    }

    pub fn reset_camera(&self) {
        self.state.lock().camera.reset();
    }

    pub fn set_arm_rotation(&self, x: f32, y: f32, z: f32) {
        self.state.lock().pose.arm = glam::Vec3::new(x, y, z);
    }

    pub fn set_leg_rotation(&self, x: f32, y: f32, z: f32) {
        self.state.lock().pose.leg = glam::Vec3::new(x, y, z);
    }

    pub fn set_head_rotation(&self, x: f32, y: f32, z: f32) {
        self.state.lock().pose.head = glam::Vec3::new(x, y, z);
    }

    /// Pop the oldest pending renderer event.
    pub fn poll_event(&self) -> Option<RenderEvent> {
        self.events.poll()
    }
}

struct FrameSync {
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
}

pub struct VulkanRenderer {
    context: VulkanContext,
    swapchain: SwapchainBundle,
    set_layout: vk::DescriptorSetLayout,
    pipelines: PipelineSet,
    resources: AvatarResources,
    command_buffers: Vec<vk::CommandBuffer>,
    commands_stale: Vec<bool>,
    frames: Vec<FrameSync>,
    /// Fence of the frame currently using each swapchain image.
    images_in_flight: Vec<vk::Fence>,
    current_frame: usize,
    surface_size: (u32, u32),
    pending_resize: Option<(u32, u32)>,
    state: Arc<Mutex<ControlState>>,
    events: EventQueue,
    fps: FpsCounter,
}

impl VulkanRenderer {
    pub fn new<W>(window: &W, config: &RendererConfig) -> RenderResult<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let context = VulkanContext::new(window)?;
        let swapchain =
            SwapchainBundle::new(&context, config.width, config.height, config.vsync)?;

        let set_layout = create_descriptor_set_layout(&context.device)?;
        let pipelines = PipelineSet::new(
            &context.device,
            swapchain.render_pass,
            swapchain.extent,
            set_layout,
        )?;

        let resources = AvatarResources::new(&context, swapchain.image_count())?;

        let command_buffers =
            Self::allocate_command_buffers(&context, swapchain.image_count())?;

        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            frames.push(Self::create_frame_sync(&context.device)?);
        }

        let images_in_flight = vec![vk::Fence::null(); swapchain.image_count()];
        let commands_stale = vec![true; swapchain.image_count()];

        let events = EventQueue::new();
        let mut control = ControlState::new(events.clone());
        control.background = config.background;
        let state = Arc::new(Mutex::new(control));

        Ok(VulkanRenderer {
            context,
            swapchain,
            set_layout,
            pipelines,
            resources,
            command_buffers,
            commands_stale,
            frames,
            images_in_flight,
            current_frame: 0,
            surface_size: (config.width, config.height),
            pending_resize: None,
            state,
            events,
            fps: FpsCounter::new(),
        })
    }

    /// Handle to the control surface; cloneable and usable from any thread.
    pub fn control(&self) -> RendererControl {
        RendererControl {
            state: self.state.clone(),
            events: self.events.clone(),
        }
    }

    pub fn events(&self) -> EventQueue {
        self.events.clone()
    }

    /// Note a surface resize; the swapchain is rebuilt on the next frame.
    /// A 0x0 size (minimized window) pauses rendering until the surface
    /// has an area again.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.pending_resize = Some((width, height));
    }

    fn allocate_command_buffers(
        context: &VulkanContext,
        count: usize,
    ) -> RenderResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            command_pool: context.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        unsafe {
            context
                .device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| RenderError::Command(e.to_string()))
        }
    }

    fn create_frame_sync(device: &ash::Device) -> RenderResult<FrameSync> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo {
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        unsafe {
            Ok(FrameSync {
                image_available: device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(|e| RenderError::Initialization(e.to_string()))?,
                render_finished: device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(|e| RenderError::Initialization(e.to_string()))?,
                in_flight: device
                    .create_fence(&fence_info, None)
                    .map_err(|e| RenderError::Initialization(e.to_string()))?,
            })
        }
    }

    /// Render one frame. `delta_seconds` advances the walk cycle and the
    /// FPS counter.
    pub fn render_frame(&mut self, delta_seconds: f64) -> RenderResult<()> {
        if let Some((width, height)) = self.pending_resize.take() {
            self.surface_size = (width, height);
            if width > 0 && height > 0 {
                self.recreate_swapchain()?;
            }
        }
        // Nothing to present to while the surface is minimized.
        if self.surface_size.0 == 0 || self.surface_size.1 == 0 {
            return Ok(());
        }

        let device = &self.context.device;
        let frame = &self.frames[self.current_frame];
        let in_flight = frame.in_flight;
        let image_available = frame.image_available;
        let render_finished = frame.render_finished;

        unsafe {
            device
                .wait_for_fences(&[in_flight], true, u64::MAX)
                .map_err(|e| RenderError::Acquire(e.to_string()))?;
        }

        let acquire = unsafe {
            self.swapchain.swapchain_fn.acquire_next_image(
                self.swapchain.swapchain,
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        };
        let (image_index, suboptimal) = match acquire {
            Ok(pair) => pair,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.recreate_swapchain()?;
                return Ok(());
            }
            Err(e) => return Err(RenderError::Acquire(e.to_string())),
        };
        let image = image_index as usize;

        self.reconcile()?;

        // Another in-flight frame may still be rendering to this image.
        let image_fence = self.images_in_flight[image];
        if image_fence != vk::Fence::null() {
            unsafe {
                self.context
                    .device
                    .wait_for_fences(&[image_fence], true, u64::MAX)
                    .map_err(|e| RenderError::Acquire(e.to_string()))?;
            }
        }
        self.images_in_flight[image] = in_flight;

        let settings = self.update_frame_state(delta_seconds, image)?;

        if self.commands_stale[image] {
            record_frame(
                &self.context.device,
                self.command_buffers[image],
                &self.swapchain,
                image,
                &self.pipelines,
                &self.resources,
                &settings,
            )?;
            self.commands_stale[image] = false;
        }

        let device = &self.context.device;
        unsafe {
            device
                .reset_fences(&[in_flight])
                .map_err(|e| RenderError::Command(e.to_string()))?;

            let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
            let submit_info = vk::SubmitInfo {
                wait_semaphore_count: 1,
                p_wait_semaphores: &image_available,
                p_wait_dst_stage_mask: &wait_stage,
                command_buffer_count: 1,
                p_command_buffers: &self.command_buffers[image],
                signal_semaphore_count: 1,
                p_signal_semaphores: &render_finished,
                ..Default::default()
            };

            device
                .queue_submit(self.context.queue, &[submit_info], in_flight)
                .map_err(|e| RenderError::Command(e.to_string()))?;

            let present_info = vk::PresentInfoKHR {
                wait_semaphore_count: 1,
                p_wait_semaphores: &render_finished,
                swapchain_count: 1,
                p_swapchains: &self.swapchain.swapchain,
                p_image_indices: &image_index,
                ..Default::default()
            };

            match self
                .swapchain
                .swapchain_fn
                .queue_present(self.context.queue, &present_info)
            {
                Ok(present_suboptimal) => {
                    if suboptimal || present_suboptimal {
                        self.recreate_swapchain()?;
                    }
                }
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    self.recreate_swapchain()?;
                }
                Err(e) => return Err(RenderError::Present(e.to_string())),
            }
        }

        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
        self.count_frame(delta_seconds);
        Ok(())
    }

    /// Apply pending hot swaps under a device-idle barrier.
    fn reconcile(&mut self) -> RenderResult<()> {
        let mut state = self.state.lock();
        if !state.dirty.any() {
            return Ok(());
        }

        unsafe {
            self.context
                .device
                .device_wait_idle()
                .map_err(|e| RenderError::Device(e.to_string()))?;
        }

        let rebuild_meshes = state.have_skin()
            && (state.dirty.topology_changed || self.resources.parts.is_empty());
        if rebuild_meshes {
            self.resources.rebuild_meshes(&self.context, state.variant)?;
        }

        if state.dirty.skin_changed || state.dirty.topology_changed {
            let skin = if state.have_skin() {
                state.skin.as_ref()
            } else {
                None
            };
            self.resources.set_skin_texture(&self.context, skin)?;
            self.resources
                .set_cape_texture(&self.context, state.cape.as_ref())?;
            self.resources
                .rebuild_descriptor_sets(&self.context, self.set_layout)?;
            if state.have_skin() {
                self.events.push(RenderEvent::SkinReloaded);
            }
            log::debug!("reconciled skin swap, variant {:?}", state.variant);
        }

        for stale in &mut self.commands_stale {
            *stale = true;
        }
        state.dirty = Default::default();
        Ok(())
    }

    /// Advance animation and camera, then write this image's uniforms.
    fn update_frame_state(
        &mut self,
        delta_seconds: f64,
        image: usize,
    ) -> RenderResult<DrawSettings> {
        let mut state = self.state.lock();

        let variant = state.variant;
        state.walk.tick(delta_seconds, variant);
        state.camera.tick();

        let angles = state.current_angles();
        let model = state.camera.model_matrix();
        let view = state.camera.view_matrix();
        let mut proj = state
            .camera
            .projection_matrix(self.surface_size.0, self.surface_size.1);
        // Vulkan clip space points Y down.
        proj.y_axis.y *= -1.0;

        let mut uniforms = [PartUniform::default(); PART_COUNT];
        for unit in DrawUnit::ALL {
            uniforms[unit.index()] = PartUniform {
                model,
                proj,
                view,
                part: crate::pose::part_transform(unit.kind(), &angles, state.variant),
                light_color: state.light_color,
                _pad: 0.0,
            };
        }
        self.resources.write_uniforms(image, &uniforms)?;

        Ok(DrawSettings {
            background: state.background,
            draw_avatar: state.have_skin(),
            draw_overlay: state.enable_overlay,
            draw_cape: state.enable_cape && state.have_cape(),
            variant: state.variant,
        })
    }

    fn count_frame(&mut self, delta_seconds: f64) {
        if let Some(fps) = self.fps.tick(delta_seconds) {
            self.events.push(RenderEvent::Fps(fps));
        }
    }

    fn recreate_swapchain(&mut self) -> RenderResult<()> {
        let (width, height) = self.surface_size;
        self.swapchain.recreate(&self.context, width, height)?;

        // Static viewport: the pipelines are baked against the extent.
        self.pipelines.destroy(&self.context.device);
        self.pipelines = PipelineSet::new(
            &self.context.device,
            self.swapchain.render_pass,
            self.swapchain.extent,
            self.set_layout,
        )?;

        // The image count can change with the extent; the per-image
        // uniforms and descriptor sets follow it.
        let image_count = self.swapchain.image_count();
        if image_count != self.command_buffers.len() {
            unsafe {
                self.context
                    .device
                    .free_command_buffers(self.context.command_pool, &self.command_buffers);
            }
            self.command_buffers = Self::allocate_command_buffers(&self.context, image_count)?;
            self.resources.resize_per_image(&self.context, image_count)?;
            self.resources
                .rebuild_descriptor_sets(&self.context, self.set_layout)?;
        }
        self.commands_stale = vec![true; image_count];
        self.images_in_flight = vec![vk::Fence::null(); image_count];
        Ok(())
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        let device = &self.context.device;
        unsafe {
            let _ = device.device_wait_idle();

            for frame in self.frames.drain(..) {
                device.destroy_semaphore(frame.image_available, None);
                device.destroy_semaphore(frame.render_finished, None);
                device.destroy_fence(frame.in_flight, None);
            }

            self.context
                .device
                .free_command_buffers(self.context.command_pool, &self.command_buffers);
        }

        self.resources.destroy(&self.context);
        self.pipelines.destroy(&self.context.device);
        unsafe {
            self.context
                .device
                .destroy_descriptor_set_layout(self.set_layout, None);
        }
        self.swapchain.destroy(&self.context);
        // The context tears itself down last via its own Drop.
    }
}
