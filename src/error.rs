//! Renderer error type
//!
//! Device-object creation failures are fatal: they abort initialization or a
//! resource rebuild and are not retried. Asset problems (unclassifiable skin,
//! wrong cape dimensions) never surface here; the renderer degrades to the
//! "no skin" state and reports through the event queue instead.

use thiserror::Error;

/// Renderer error type
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to initialize renderer: {0}")]
    Initialization(String),
    #[error("Failed to create surface: {0}")]
    Surface(String),
    #[error("Failed to create device: {0}")]
    Device(String),
    #[error("Failed to create swapchain: {0}")]
    Swapchain(String),
    #[error("Failed to allocate memory: {0}")]
    Allocation(String),
    #[error("Failed to create buffer: {0}")]
    Buffer(String),
    #[error("Failed to create texture: {0}")]
    Texture(String),
    #[error("Failed to create pipeline: {0}")]
    Pipeline(String),
    #[error("Failed to compile shader: {0}")]
    Shader(String),
    #[error("Failed to acquire next image: {0}")]
    Acquire(String),
    #[error("Failed to present: {0}")]
    Present(String),
    #[error("Failed to record commands: {0}")]
    Command(String),
}

pub type RenderResult<T> = Result<T, RenderError>;
