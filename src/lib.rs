//! Real-time Vulkan renderer for Minecraft-style avatar skins.
//!
//! The avatar is thirteen textured cubes: six body parts, the same six as
//! an enlarged clothing overlay, and a cape. A skin bitmap is classified
//! into a body variant by its dimensions and alpha probes, unwrapped onto
//! the cubes through a fixed texture atlas, and drawn with a small diffuse
//! shader. Skins, capes, variant and visibility can be swapped at runtime;
//! swaps are reconciled between frames under a device-idle barrier.
//!
//! The host owns the window and the render loop: create a
//! [`VulkanRenderer`] over a raw window handle, call
//! [`VulkanRenderer::render_frame`] each refresh, and drive everything else
//! through the cloneable [`RendererControl`] handle.

pub mod atlas;
pub mod camera;
pub mod error;
pub mod events;
pub mod mesh;
pub mod parts;
pub mod pose;
pub mod skin;
pub mod state;
pub mod vulkan;

pub use error::{RenderError, RenderResult};
pub use events::{EventQueue, RenderEvent};
pub use parts::{DrawUnit, PartKind, PART_COUNT};
pub use skin::{classify, SkinVariant};
pub use vulkan::{RendererControl, VulkanRenderer, MAX_FRAMES_IN_FLIGHT};

use glam::Vec4;

/// Initial renderer settings.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub background: Vec4,
}

impl Default for RendererConfig {
    fn default() -> Self {
        RendererConfig {
            width: 800,
            height: 600,
            vsync: true,
            background: Vec4::new(0.0, 0.0, 0.0, 1.0),
        }
    }
}
