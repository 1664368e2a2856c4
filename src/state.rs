//! Shared control state
//!
//! One mutex-guarded blob holds everything the public control surface can
//! touch: pending textures, visibility toggles, pose, camera and the
//! edge-triggered dirty flags. Mutators are fire-and-forget; the frame loop
//! reads the state once per tick and clears the flags after a successful
//! reconciliation.

use glam::{Vec3, Vec4};
use image::RgbaImage;

use crate::camera::CameraState;
use crate::events::{EventQueue, RenderEvent};
use crate::pose::{PoseAngles, PoseState, WalkCycle};
use crate::skin::{self, SkinVariant};

/// Edge-triggered change markers, set by mutators and cleared by the frame
/// loop after the matching rebuild.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirtyFlags {
    /// Skin or cape texture replaced; textures and descriptor sets rebuild.
    pub skin_changed: bool,
    /// Variant switched; part meshes rebuild (arm width, overlay presence).
    pub topology_changed: bool,
    /// Layer/cape visibility toggled; command buffers re-record.
    pub options_changed: bool,
}

impl DirtyFlags {
    pub fn any(&self) -> bool {
        self.skin_changed || self.topology_changed || self.options_changed
    }
}

/// Everything the control surface mutates, guarded by one lock.
#[derive(Debug)]
pub struct ControlState {
    pub skin: Option<RgbaImage>,
    pub cape: Option<RgbaImage>,
    /// Variant in effect; recomputed on skin swap unless pinned.
    pub variant: SkinVariant,
    /// Host-pinned variant; `None` means auto-detect from the texture.
    pub explicit_variant: Option<SkinVariant>,
    pub enable_overlay: bool,
    pub enable_cape: bool,
    pub animation: bool,
    pub pose: PoseState,
    pub walk: WalkCycle,
    pub camera: CameraState,
    pub background: Vec4,
    pub light_color: Vec3,
    pub dirty: DirtyFlags,
    events: EventQueue,
}

impl ControlState {
    pub fn new(events: EventQueue) -> Self {
        ControlState {
            skin: None,
            cape: None,
            variant: SkinVariant::Unknown,
            explicit_variant: None,
            enable_overlay: true,
            enable_cape: true,
            animation: false,
            pose: PoseState::default(),
            walk: WalkCycle::new(),
            camera: CameraState::new(),
            background: Vec4::new(0.0, 0.0, 0.0, 1.0),
            light_color: Vec3::ONE,
            dirty: DirtyFlags::default(),
            events,
        }
    }

    /// Whether a drawable avatar exists (classified skin present).
    pub fn have_skin(&self) -> bool {
        self.skin.is_some() && self.variant != SkinVariant::Unknown
    }

    pub fn have_cape(&self) -> bool {
        self.cape.is_some()
    }

    /// Replace (or clear) the skin texture and re-resolve the variant.
    pub fn set_skin(&mut self, skin: Option<RgbaImage>) {
        let old_variant = self.variant;
        match &skin {
            Some(image) => {
                self.variant = self.resolve_variant(image);
                if self.variant == SkinVariant::Unknown {
                    self.events.push(RenderEvent::SkinUnsupported);
                }
            }
            None => {
                self.variant = SkinVariant::Unknown;
                self.events.push(RenderEvent::SkinMissing);
            }
        }
        self.skin = skin;
        self.dirty.skin_changed = true;
        if self.variant != old_variant {
            self.dirty.topology_changed = true;
        }
    }

    /// Replace (or clear) the cape texture. The cape atlas is 64x32, so any
    /// bitmap without 2:1 proportions is rejected and reported.
    pub fn set_cape(&mut self, cape: Option<RgbaImage>) {
        if let Some(image) = &cape {
            let (width, height) = image.dimensions();
            if height == 0 || width != height * 2 {
                self.events.push(RenderEvent::CapeUnsupported);
                if self.cape.is_some() {
                    self.cape = None;
                    self.dirty.skin_changed = true;
                }
                return;
            }
        }
        self.cape = cape;
        self.dirty.skin_changed = true;
    }

    /// Pin the variant explicitly, or return to auto-detection with `None`.
    pub fn set_variant(&mut self, variant: Option<SkinVariant>) {
        self.explicit_variant = variant;
        let resolved = match (&self.skin, variant) {
            (_, Some(v)) => v,
            (Some(image), None) => skin::classify(image),
            (None, None) => SkinVariant::Unknown,
        };
        if resolved != self.variant {
            self.variant = resolved;
            self.dirty.topology_changed = true;
        }
    }

    pub fn set_animation(&mut self, enable: bool) {
        self.animation = enable;
        self.walk.running = enable;
    }

    pub fn set_overlay_visible(&mut self, visible: bool) {
        if self.enable_overlay != visible {
            self.enable_overlay = visible;
            self.dirty.options_changed = true;
        }
    }

    pub fn set_cape_visible(&mut self, visible: bool) {
        if self.enable_cape != visible {
            self.enable_cape = visible;
            self.dirty.options_changed = true;
        }
    }

    /// Angles the transform pass uses this frame: walk cycle while
    /// animating, manual pose otherwise.
    pub fn current_angles(&self) -> PoseAngles {
        if self.animation {
            self.walk.angles()
        } else {
            self.pose.into()
        }
    }

    fn resolve_variant(&self, image: &RgbaImage) -> SkinVariant {
        match self.explicit_variant {
            Some(v) => v,
            None => skin::classify(image),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn modern_skin() -> RgbaImage {
        RgbaImage::from_pixel(64, 64, Rgba([100, 100, 100, 255]))
    }

    fn state() -> (ControlState, EventQueue) {
        let events = EventQueue::new();
        (ControlState::new(events.clone()), events)
    }

    #[test]
    fn skin_swap_sets_flags_and_detects_variant() {
        let (mut st, _events) = state();
        st.set_skin(Some(modern_skin()));
        assert_eq!(st.variant, SkinVariant::Modern);
        assert!(st.dirty.skin_changed);
        assert!(st.dirty.topology_changed); // Unknown -> Modern
        assert!(st.have_skin());
    }

    #[test]
    fn clearing_skin_emits_missing() {
        let (mut st, events) = state();
        st.set_skin(Some(modern_skin()));
        st.set_skin(None);
        assert!(!st.have_skin());
        assert!(events.drain().contains(&RenderEvent::SkinMissing));
    }

    #[test]
    fn unclassifiable_skin_emits_unsupported() {
        let (mut st, events) = state();
        st.set_skin(Some(RgbaImage::new(31, 17)));
        assert_eq!(st.variant, SkinVariant::Unknown);
        assert!(!st.have_skin());
        assert_eq!(events.poll(), Some(RenderEvent::SkinUnsupported));
    }

    #[test]
    fn explicit_variant_overrides_detection() {
        let (mut st, _events) = state();
        st.set_skin(Some(modern_skin()));
        st.dirty = DirtyFlags::default();

        st.set_variant(Some(SkinVariant::ModernSlim));
        assert_eq!(st.variant, SkinVariant::ModernSlim);
        assert!(st.dirty.topology_changed);

        st.dirty = DirtyFlags::default();
        st.set_variant(None); // back to auto-detect
        assert_eq!(st.variant, SkinVariant::Modern);
        assert!(st.dirty.topology_changed);
    }

    #[test]
    fn misproportioned_cape_is_rejected() {
        let (mut st, events) = state();
        st.set_cape(Some(RgbaImage::new(64, 64)));
        assert!(!st.have_cape());
        assert!(!st.dirty.skin_changed);
        assert_eq!(events.poll(), Some(RenderEvent::CapeUnsupported));

        st.set_cape(Some(RgbaImage::new(64, 32)));
        assert!(st.have_cape());
        assert!(st.dirty.skin_changed);

        // A bad cape drops the previously accepted one.
        st.dirty = DirtyFlags::default();
        st.set_cape(Some(RgbaImage::new(22, 17)));
        assert!(!st.have_cape());
        assert!(st.dirty.skin_changed);
        assert_eq!(events.poll(), Some(RenderEvent::CapeUnsupported));
    }

    #[test]
    fn skin_restored_before_reconcile_stays_dirty() {
        let (mut st, _events) = state();
        st.set_skin(Some(modern_skin()));
        st.dirty = DirtyFlags::default();

        // Clear and immediately restore, as a producer thread racing the
        // frame loop would; the next reconciliation must still rebuild.
        st.set_skin(None);
        st.set_skin(Some(modern_skin()));
        assert!(st.dirty.skin_changed);
        assert!(st.have_skin());
    }

    #[test]
    fn visibility_toggles_are_edge_triggered() {
        let (mut st, _events) = state();
        st.set_overlay_visible(true); // already true
        assert!(!st.dirty.options_changed);
        st.set_cape_visible(false);
        assert!(st.dirty.options_changed);
    }

    #[test]
    fn animation_switches_angle_source() {
        let (mut st, _events) = state();
        st.pose.arm.y = 77.0;
        assert_eq!(st.current_angles().arm.y, 77.0);
        st.set_animation(true);
        assert!(st.walk.running);
        assert_eq!(st.current_angles().arm.x, 40.0);
    }
}
