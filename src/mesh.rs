//! Part mesh generation
//!
//! Every draw unit is a 24-vertex, 36-index cube centered at the origin,
//! scaled per part, with outward face normals and UVs taken from the fixed
//! atlas table. The overlay layer reuses the base dimensions uniformly
//! inflated by 1.125.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::atlas::{self, FaceRects, TexRect};
use crate::parts::DrawUnit;
use crate::skin::SkinVariant;

/// Full edge length of the unscaled part cube, in model units.
pub const CUBE_SIZE: f32 = 0.5;

/// Uniform inflation factor for the overlay ("second skin") layer.
pub const OVERLAY_ENLARGE: f32 = 1.125;

/// Vertex layout shared by every part mesh.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SkinVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

/// CPU-side mesh for one draw unit.
#[derive(Debug, Clone)]
pub struct PartMesh {
    pub vertices: Vec<SkinVertex>,
    pub indices: Vec<u16>,
}

/// Generate the cube for one draw unit of the given variant.
pub fn generate_part(unit: DrawUnit, variant: SkinVariant) -> PartMesh {
    let scale = part_scale(unit, variant);
    let enlarge = if unit.is_overlay() { OVERLAY_ENLARGE } else { 1.0 };
    let rects = atlas::face_rects(unit, variant);
    let tex_size = atlas::texture_base_size(unit, variant);
    generate_cube(scale, Vec3::ZERO, enlarge, &rects, tex_size)
}

/// Per-part cube scale (X, Y, Z multipliers of [`CUBE_SIZE`]).
pub fn part_scale(unit: DrawUnit, variant: SkinVariant) -> Vec3 {
    use crate::parts::PartKind::*;
    match unit.kind() {
        Head => Vec3::new(1.0, 1.0, 1.0),
        Body => Vec3::new(1.0, 1.5, 0.5),
        LeftArm | RightArm => Vec3::new(variant.arm_width(), 1.5, 0.5),
        LeftLeg | RightLeg => Vec3::new(0.5, 1.5, 0.5),
        Cape => Vec3::new(1.25, 2.0, 0.1),
    }
}

/// Generate a cube centered at `offset`, scaled by `scale * CUBE_SIZE` per
/// axis and uniformly inflated by `enlarge`, with UVs from `rects`
/// normalized against `tex_size`.
///
/// Scales must be strictly positive; that is a caller contract enforced at
/// this boundary.
pub fn generate_cube(
    scale: Vec3,
    offset: Vec3,
    enlarge: f32,
    rects: &FaceRects,
    tex_size: (u32, u32),
) -> PartMesh {
    debug_assert!(
        scale.x > 0.0 && scale.y > 0.0 && scale.z > 0.0 && enlarge > 0.0,
        "cube scale must be strictly positive"
    );

    let half = scale * (CUBE_SIZE * 0.5) * enlarge;
    let (hx, hy, hz) = (half.x, half.y, half.z);

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    // Corner order per face, viewed from outside: top-left, top-right,
    // bottom-right, bottom-left. +Z is the avatar's front, +X its left side.
    let faces: [(Vec3, [Vec3; 4], TexRect); 6] = [
        (
            Vec3::Z,
            [
                Vec3::new(-hx, hy, hz),
                Vec3::new(hx, hy, hz),
                Vec3::new(hx, -hy, hz),
                Vec3::new(-hx, -hy, hz),
            ],
            rects.front,
        ),
        (
            Vec3::NEG_Z,
            [
                Vec3::new(hx, hy, -hz),
                Vec3::new(-hx, hy, -hz),
                Vec3::new(-hx, -hy, -hz),
                Vec3::new(hx, -hy, -hz),
            ],
            rects.back,
        ),
        (
            Vec3::X,
            [
                Vec3::new(hx, hy, hz),
                Vec3::new(hx, hy, -hz),
                Vec3::new(hx, -hy, -hz),
                Vec3::new(hx, -hy, hz),
            ],
            rects.left,
        ),
        (
            Vec3::NEG_X,
            [
                Vec3::new(-hx, hy, -hz),
                Vec3::new(-hx, hy, hz),
                Vec3::new(-hx, -hy, hz),
                Vec3::new(-hx, -hy, -hz),
            ],
            rects.right,
        ),
        (
            Vec3::Y,
            [
                Vec3::new(-hx, hy, -hz),
                Vec3::new(hx, hy, -hz),
                Vec3::new(hx, hy, hz),
                Vec3::new(-hx, hy, hz),
            ],
            rects.top,
        ),
        (
            Vec3::NEG_Y,
            [
                Vec3::new(-hx, -hy, hz),
                Vec3::new(hx, -hy, hz),
                Vec3::new(hx, -hy, -hz),
                Vec3::new(-hx, -hy, -hz),
            ],
            rects.bottom,
        ),
    ];

    for (normal, corners, rect) in faces {
        let base = vertices.len() as u16;
        let uvs = rect_uvs(rect, tex_size, rects.mirrored);
        for (corner, uv) in corners.iter().zip(uvs) {
            vertices.push(SkinVertex {
                position: *corner + offset,
                normal,
                uv,
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    PartMesh { vertices, indices }
}

/// Normalized UVs for a face rectangle in TL, TR, BR, BL corner order.
fn rect_uvs(rect: TexRect, tex_size: (u32, u32), mirrored: bool) -> [Vec2; 4] {
    let (tw, th) = (tex_size.0 as f32, tex_size.1 as f32);
    let mut u0 = rect.x as f32 / tw;
    let mut u1 = (rect.x + rect.w) as f32 / tw;
    let v0 = rect.y as f32 / th;
    let v1 = (rect.y + rect.h) as f32 / th;
    if mirrored {
        std::mem::swap(&mut u0, &mut u1);
    }
    [
        Vec2::new(u0, v0),
        Vec2::new(u1, v0),
        Vec2::new(u1, v1),
        Vec2::new(u0, v1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_24_vertices_36_indices() {
        for unit in DrawUnit::ALL {
            let mesh = generate_part(unit, SkinVariant::Modern);
            assert_eq!(mesh.vertices.len(), 24);
            assert_eq!(mesh.indices.len(), 36);
        }
    }

    #[test]
    fn slim_variant_narrows_arms() {
        let slim = generate_part(DrawUnit::LeftArm, SkinVariant::ModernSlim);
        let regular = generate_part(DrawUnit::LeftArm, SkinVariant::Modern);
        let width = |m: &PartMesh| {
            let xs: Vec<f32> = m.vertices.iter().map(|v| v.position.x).collect();
            xs.iter().cloned().fold(f32::MIN, f32::max) - xs.iter().cloned().fold(f32::MAX, f32::min)
        };
        assert!((width(&slim) - 0.375 * CUBE_SIZE).abs() < 1e-6);
        assert!((width(&regular) - 0.5 * CUBE_SIZE).abs() < 1e-6);
    }

    #[test]
    fn overlay_is_uniformly_enlarged() {
        let base = generate_part(DrawUnit::Head, SkinVariant::Modern);
        let overlay = generate_part(DrawUnit::OverlayHead, SkinVariant::Modern);
        for (b, o) in base.vertices.iter().zip(&overlay.vertices) {
            assert!((o.position - b.position * OVERLAY_ENLARGE).length() < 1e-6);
        }
    }

    #[test]
    fn normals_point_outward() {
        let mesh = generate_part(DrawUnit::Body, SkinVariant::Modern);
        for v in &mesh.vertices {
            assert!(v.position.dot(v.normal) > 0.0);
        }
    }

    #[test]
    fn uvs_are_normalized() {
        for variant in [SkinVariant::Classic, SkinVariant::Modern, SkinVariant::ModernSlim] {
            for unit in DrawUnit::ALL {
                let mesh = generate_part(unit, variant);
                for v in &mesh.vertices {
                    assert!((0.0..=1.0).contains(&v.uv.x), "{unit:?} u={}", v.uv.x);
                    assert!((0.0..=1.0).contains(&v.uv.y), "{unit:?} v={}", v.uv.y);
                }
            }
        }
    }

    #[test]
    fn mirrored_face_flips_u_only() {
        let rect = TexRect { x: 8, y: 8, w: 8, h: 8 };
        let plain = rect_uvs(rect, (64, 64), false);
        let flipped = rect_uvs(rect, (64, 64), true);
        assert_eq!(plain[0].x, flipped[1].x);
        assert_eq!(plain[0].y, flipped[0].y);
    }
}
