//! Texture atlas layout
//!
//! Fixed face-to-rectangle table for the skin and cape textures. The
//! rectangles are given in pixels at base resolution (64x64 modern skin,
//! 64x32 legacy skin and cape); higher-resolution textures scale
//! proportionally, which normalized UVs absorb for free. This table is an
//! external compatibility contract: the numbers are the texture layout every
//! existing skin is painted against and must not be derived or "corrected".
//!
//! Each part is an axis-aligned box unwrapped in the standard order: top and
//! bottom along the upper row, then right side, front, left side, back along
//! the lower row.

use crate::parts::DrawUnit;
use crate::skin::SkinVariant;

/// Pixel rectangle in the source atlas at base resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Source rectangles for the six faces of one part's cube.
///
/// `mirrored` flips the U axis of every face; the legacy layout reuses the
/// right-limb rectangles for the left limbs this way.
#[derive(Debug, Clone, Copy)]
pub struct FaceRects {
    pub top: TexRect,
    pub bottom: TexRect,
    pub right: TexRect,
    pub front: TexRect,
    pub left: TexRect,
    pub back: TexRect,
    pub mirrored: bool,
}

/// Base-resolution size of the texture a unit samples from.
pub fn texture_base_size(unit: DrawUnit, variant: SkinVariant) -> (u32, u32) {
    if unit == DrawUnit::Cape || variant == SkinVariant::Classic {
        (64, 32)
    } else {
        (64, 64)
    }
}

/// Unwrap a box whose texture origin is `(x, y)` and whose pixel dimensions
/// are `w` wide, `h` tall, `d` deep.
fn unwrap_box(x: u32, y: u32, w: u32, h: u32, d: u32, mirrored: bool) -> FaceRects {
    FaceRects {
        top: TexRect { x: x + d, y, w, h: d },
        bottom: TexRect { x: x + d + w, y, w, h: d },
        right: TexRect { x, y: y + d, w: d, h },
        front: TexRect { x: x + d, y: y + d, w, h },
        left: TexRect { x: x + d + w, y: y + d, w: d, h },
        back: TexRect { x: x + d + w + d, y: y + d, w, h },
        mirrored,
    }
}

/// Look up the face rectangles for one draw unit.
///
/// Classic overlay units other than the head have no region of their own in
/// the legacy layout; they fall back to the base rectangles and are skipped
/// at draw time, keeping the 13-unit invariant intact.
pub fn face_rects(unit: DrawUnit, variant: SkinVariant) -> FaceRects {
    use DrawUnit::*;

    let arm_w = if variant == SkinVariant::ModernSlim { 3 } else { 4 };
    let classic = variant == SkinVariant::Classic;

    match unit {
        Head => unwrap_box(0, 0, 8, 8, 8, false),
        Body => unwrap_box(16, 16, 8, 12, 4, false),
        RightArm => unwrap_box(40, 16, arm_w, 12, 4, false),
        LeftArm if classic => unwrap_box(40, 16, arm_w, 12, 4, true),
        LeftArm => unwrap_box(32, 48, arm_w, 12, 4, false),
        RightLeg => unwrap_box(0, 16, 4, 12, 4, false),
        LeftLeg if classic => unwrap_box(0, 16, 4, 12, 4, true),
        LeftLeg => unwrap_box(16, 48, 4, 12, 4, false),

        OverlayHead => unwrap_box(32, 0, 8, 8, 8, false),
        OverlayBody if classic => face_rects(Body, variant),
        OverlayBody => unwrap_box(16, 32, 8, 12, 4, false),
        OverlayRightArm if classic => face_rects(RightArm, variant),
        OverlayRightArm => unwrap_box(40, 32, arm_w, 12, 4, false),
        OverlayLeftArm if classic => face_rects(LeftArm, variant),
        OverlayLeftArm => unwrap_box(48, 48, arm_w, 12, 4, false),
        OverlayRightLeg if classic => face_rects(RightLeg, variant),
        OverlayRightLeg => unwrap_box(0, 32, 4, 12, 4, false),
        OverlayLeftLeg if classic => face_rects(LeftLeg, variant),
        OverlayLeftLeg => unwrap_box(0, 48, 4, 12, 4, false),

        Cape => unwrap_box(0, 0, 10, 16, 1, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_front_contract_point() {
        // Head front = (8,8)-(16,16) at base resolution.
        let rects = face_rects(DrawUnit::Head, SkinVariant::Modern);
        assert_eq!(rects.front, TexRect { x: 8, y: 8, w: 8, h: 8 });
        assert_eq!(rects.top, TexRect { x: 8, y: 0, w: 8, h: 8 });
    }

    #[test]
    fn body_front_contract_point() {
        // Body front = (20,20)-(28,36).
        let rects = face_rects(DrawUnit::Body, SkinVariant::Modern);
        assert_eq!(rects.front, TexRect { x: 20, y: 20, w: 8, h: 12 });
    }

    #[test]
    fn slim_arms_are_three_pixels_wide() {
        let slim = face_rects(DrawUnit::RightArm, SkinVariant::ModernSlim);
        let regular = face_rects(DrawUnit::RightArm, SkinVariant::Modern);
        assert_eq!(slim.front.w, 3);
        assert_eq!(regular.front.w, 4);
    }

    #[test]
    fn classic_left_limbs_mirror_right() {
        let left = face_rects(DrawUnit::LeftArm, SkinVariant::Classic);
        let right = face_rects(DrawUnit::RightArm, SkinVariant::Classic);
        assert!(left.mirrored);
        assert_eq!(left.front, right.front);

        let modern_left = face_rects(DrawUnit::LeftArm, SkinVariant::Modern);
        assert!(!modern_left.mirrored);
        assert_eq!(modern_left.front, TexRect { x: 36, y: 52, w: 4, h: 12 });
    }

    #[test]
    fn cape_samples_its_own_texture() {
        assert_eq!(texture_base_size(DrawUnit::Cape, SkinVariant::Modern), (64, 32));
        assert_eq!(texture_base_size(DrawUnit::Head, SkinVariant::Modern), (64, 64));
        assert_eq!(texture_base_size(DrawUnit::Head, SkinVariant::Classic), (64, 32));
        let rects = face_rects(DrawUnit::Cape, SkinVariant::Modern);
        assert_eq!(rects.front, TexRect { x: 1, y: 1, w: 10, h: 16 });
    }
}
