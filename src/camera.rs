//! Orbit camera
//!
//! The view and projection are fixed; all interaction folds into the model
//! matrix. Orbit deltas accumulate between frames and are folded into a
//! persistent rotation matrix once per tick, so the avatar keeps turning
//! about its current on-screen axes no matter how it is already oriented.
//! Pan and zoom apply on top of that rotation every frame.
//!
//! Orbit angles use the same `degrees / 360`-as-radians encoding as the limb
//! rotations in [`crate::pose`].

use glam::{Mat4, Vec2, Vec3};

/// Camera eye position. The avatar stays at the origin.
const EYE: Vec3 = Vec3::new(0.0, 0.0, 7.0);

/// Accumulated camera interaction state.
#[derive(Debug, Clone)]
pub struct CameraState {
    /// Composed orbit rotation, applied innermost in the model matrix.
    last: Mat4,
    /// Orbit deltas (degrees) pending until the next tick.
    pending: Vec2,
    /// Pan offset in view-plane units.
    pan: Vec2,
    /// Zoom scalar; 1.0 is the resting distance.
    zoom: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraState {
    pub fn new() -> Self {
        CameraState {
            last: Mat4::IDENTITY,
            pending: Vec2::ZERO,
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }

    /// Queue an orbit delta in degrees (x pitches, y yaws).
    pub fn orbit(&mut self, x: f32, y: f32) {
        self.pending.x += x;
        self.pending.y += y;
    }

    pub fn pan(&mut self, x: f32, y: f32) {
        self.pan.x += x;
        self.pan.y += y;
    }

    pub fn zoom(&mut self, delta: f32) {
        self.zoom += delta;
    }

    /// Fold pending orbit deltas into the accumulated rotation.
    pub fn tick(&mut self) {
        if self.pending != Vec2::ZERO {
            self.last = Mat4::from_rotation_y(self.pending.y / 360.0)
                * Mat4::from_rotation_x(self.pending.x / 360.0)
                * self.last;
            self.pending = Vec2::ZERO;
        }
    }

    /// Restore the resting view: identity orbit, no pan, zoom 1.
    pub fn reset(&mut self) {
        *self = CameraState::new();
    }

    /// Shared model matrix: zoom, then pan, then the accumulated orbit.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale(Vec3::splat(self.zoom))
            * Mat4::from_translation(Vec3::new(self.pan.x, self.pan.y, 0.0))
            * self.last
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Y)
    }

    /// Perspective projection for the given surface size.
    ///
    /// The Y flip for downward-pointing clip space is applied later, when the
    /// matrix is written into uniform memory; this returns the upward
    /// convention.
    pub fn projection_matrix(&self, width: u32, height: u32) -> Mat4 {
        let aspect = width as f32 / height.max(1) as f32;
        Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, aspect, 0.1, 10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn fresh_camera_is_identity_model() {
        let cam = CameraState::new();
        assert_eq!(cam.model_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn orbit_accumulates_only_on_tick() {
        let mut cam = CameraState::new();
        cam.orbit(0.0, 90.0);
        assert_eq!(cam.model_matrix(), Mat4::IDENTITY);
        cam.tick();
        let expected = Mat4::from_rotation_y(0.25);
        assert!(cam.model_matrix().abs_diff_eq(expected, 1e-6));
        // A second tick with nothing pending changes nothing.
        cam.tick();
        assert!(cam.model_matrix().abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn orbit_composes_in_screen_space() {
        // Later deltas multiply on the left, so they rotate about the
        // current screen axes rather than the avatar's own.
        let mut cam = CameraState::new();
        cam.orbit(45.0, 0.0);
        cam.tick();
        cam.orbit(0.0, 90.0);
        cam.tick();
        let expected = Mat4::from_rotation_y(0.25) * Mat4::from_rotation_x(0.125);
        assert!(cam.model_matrix().abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn zoom_and_pan_order() {
        let mut cam = CameraState::new();
        cam.pan(1.0, 0.0);
        cam.zoom(0.5);
        let p = cam.model_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        // Pan applies before the zoom scale.
        assert!((p.x - 1.5).abs() < 1e-6);
    }

    #[test]
    fn reset_restores_resting_view() {
        let mut cam = CameraState::new();
        cam.orbit(10.0, 20.0);
        cam.tick();
        cam.pan(3.0, -1.0);
        cam.zoom(0.4);
        cam.reset();
        assert_eq!(cam.model_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn view_looks_down_negative_z() {
        let cam = CameraState::new();
        let eye = cam.view_matrix() * Vec4::new(0.0, 0.0, 7.0, 1.0);
        assert!(eye.abs_diff_eq(Vec4::new(0.0, 0.0, 0.0, 1.0), 1e-6));
    }
}
