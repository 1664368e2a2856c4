//! Skin variant classification
//!
//! A decoded skin bitmap is classified by its dimensions and by probing the
//! alpha channel in the four regions that are transparent only in the
//! slim-arm cutout of the modern (post-1.8) texture layout. Classification is
//! a pure function; a caller that receives [`SkinVariant::Unknown`] must not
//! build a mesh for the texture and should surface a "no usable skin" state.

use image::RgbaImage;

/// Avatar body variant, derived from the skin texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkinVariant {
    /// Could not be classified; no mesh may be built from this texture.
    #[default]
    Unknown,
    /// Legacy 64x32 layout: 0.5-unit arms, no body/limb overlay layer.
    Classic,
    /// Modern square layout with 0.5-unit ("regular") arms.
    Modern,
    /// Modern square layout with 0.375-unit ("slim") arms.
    ModernSlim,
}

impl SkinVariant {
    /// Arm width in model units (X scale of the arm cube).
    pub fn arm_width(self) -> f32 {
        match self {
            SkinVariant::ModernSlim => 0.375,
            _ => 0.5,
        }
    }

    /// Whether the body/limb overlay layer exists in this texture layout.
    /// The legacy format only carries the head overlay ("hat").
    pub fn has_limb_overlay(self) -> bool {
        matches!(self, SkinVariant::Modern | SkinVariant::ModernSlim)
    }
}

/// Slim-cutout probe regions at base (64px) resolution: `(x, y, w, h)`.
/// Each must contain at least one fully transparent pixel for a slim skin.
const SLIM_PROBES: [(u32, u32, u32, u32); 4] = [
    (50, 16, 2, 4),
    (54, 20, 2, 12),
    (42, 48, 2, 4),
    (46, 52, 2, 12),
];

/// Classify a decoded RGBA skin bitmap into a [`SkinVariant`].
///
/// Square textures that are at least 64px and a multiple of 64 are modern;
/// the slim probes decide between [`SkinVariant::Modern`] and
/// [`SkinVariant::ModernSlim`]. A `width == 2 * height` texture is the legacy
/// [`SkinVariant::Classic`] layout. Anything else is `Unknown`.
pub fn classify(image: &RgbaImage) -> SkinVariant {
    let (width, height) = image.dimensions();

    if width == height && width >= 64 && width % 64 == 0 {
        if is_slim(image) {
            SkinVariant::ModernSlim
        } else {
            SkinVariant::Modern
        }
    } else if width == height * 2 {
        SkinVariant::Classic
    } else {
        SkinVariant::Unknown
    }
}

fn is_slim(image: &RgbaImage) -> bool {
    let scale = image.width() / 64;
    SLIM_PROBES
        .iter()
        .all(|&(x, y, w, h)| region_has_transparency(image, x * scale, y * scale, w * scale, h * scale))
}

fn region_has_transparency(image: &RgbaImage, x: u32, y: u32, w: u32, h: u32) -> bool {
    for px in x..x + w {
        for py in y..y + h {
            if image.get_pixel(px, py).0[3] == 0 {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn opaque(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([120, 80, 40, 255]))
    }

    fn punch_probes(image: &mut RgbaImage, scale: u32) {
        for &(x, y, _, _) in &SLIM_PROBES {
            image.put_pixel(x * scale, y * scale, Rgba([0, 0, 0, 0]));
        }
    }

    #[test]
    fn opaque_square_is_modern() {
        assert_eq!(classify(&opaque(64, 64)), SkinVariant::Modern);
        assert_eq!(classify(&opaque(128, 128)), SkinVariant::Modern);
    }

    #[test]
    fn transparent_probes_mean_slim() {
        let mut img = opaque(64, 64);
        punch_probes(&mut img, 1);
        assert_eq!(classify(&img), SkinVariant::ModernSlim);
    }

    #[test]
    fn probes_scale_with_resolution() {
        let mut img = opaque(128, 128);
        punch_probes(&mut img, 2);
        assert_eq!(classify(&img), SkinVariant::ModernSlim);
    }

    #[test]
    fn partial_probes_stay_regular() {
        // Only one of the four regions transparent: not slim.
        let mut img = opaque(64, 64);
        img.put_pixel(50, 16, Rgba([0, 0, 0, 0]));
        assert_eq!(classify(&img), SkinVariant::Modern);
    }

    #[test]
    fn double_wide_is_classic() {
        assert_eq!(classify(&opaque(64, 32)), SkinVariant::Classic);
        assert_eq!(classify(&opaque(128, 64)), SkinVariant::Classic);
    }

    #[test]
    fn odd_dimensions_are_unknown() {
        assert_eq!(classify(&opaque(32, 32)), SkinVariant::Unknown);
        assert_eq!(classify(&opaque(64, 48)), SkinVariant::Unknown);
        assert_eq!(classify(&opaque(96, 96)), SkinVariant::Unknown);
    }

    #[test]
    fn arm_width_per_variant() {
        assert_eq!(SkinVariant::Modern.arm_width(), 0.5);
        assert_eq!(SkinVariant::Classic.arm_width(), 0.5);
        assert_eq!(SkinVariant::ModernSlim.arm_width(), 0.375);
    }
}
