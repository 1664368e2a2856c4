//! Pose state and the walk-cycle animation
//!
//! Manual joint rotations pass straight through while the walk cycle is
//! stopped; while it runs, the clock-driven angles override them. Every limb
//! rotates about its attachment joint: `translate(-pivot)`, then Z, X, Y
//! rotations, then `translate(+pivot)`. Right-side limbs negate the left
//! angles and mirror the pivot across X, which yields bilateral symmetry
//! without separate state.
//!
//! Angle quirk kept for visual parity with existing skins and tooling: limb
//! and head rotations interpret `degrees / 360` directly as radians. Only
//! the cape pitch uses true degrees.

use glam::{Mat4, Vec3};

use crate::mesh::CUBE_SIZE;
use crate::parts::PartKind;
use crate::skin::SkinVariant;

/// Walk-cycle period in milliseconds.
const CYCLE_MS: u32 = 1200;

/// Manual joint rotations in degrees, one vector per joint group.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseState {
    pub arm: Vec3,
    pub leg: Vec3,
    pub head: Vec3,
}

/// Resolved per-frame angles fed to [`part_transform`], either the manual
/// pose or the walk-cycle output.
#[derive(Debug, Clone, Copy)]
pub struct PoseAngles {
    pub arm: Vec3,
    pub leg: Vec3,
    pub head: Vec3,
    /// Cape pitch in true degrees.
    pub cape_pitch: f32,
}

impl From<PoseState> for PoseAngles {
    fn from(pose: PoseState) -> Self {
        PoseAngles {
            arm: pose.arm,
            leg: pose.leg,
            head: pose.head,
            cape_pitch: 6.3,
        }
    }
}

/// Looping walk-cycle timeline.
///
/// The clock accumulates milliseconds and wraps at 1200 ms; toggling the
/// cycle on and off does not reset it. `down = clock / 10` sweeps [0, 120)
/// and drives triangle waves for the arm swing, the leg stride and the head
/// sway.
#[derive(Debug, Clone)]
pub struct WalkCycle {
    clock_ms: u32,
    pub running: bool,
    arm: Vec3,
    leg: Vec3,
    head: Vec3,
    cape: f32,
}

impl Default for WalkCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl WalkCycle {
    pub fn new() -> Self {
        WalkCycle {
            clock_ms: 0,
            running: false,
            // Constant outward arm spread about Z for the whole cycle.
            arm: Vec3::new(40.0, 0.0, 0.0),
            leg: Vec3::ZERO,
            head: Vec3::ZERO,
            cape: 0.0,
        }
    }

    /// Advance the clock and recompute the cycle angles. No-op while stopped.
    pub fn tick(&mut self, delta_seconds: f64, variant: SkinVariant) {
        if !self.running {
            return;
        }

        self.clock_ms += (delta_seconds * 1000.0) as u32;
        if self.clock_ms > CYCLE_MS {
            self.clock_ms = 0;
        }

        let down = (self.clock_ms / 10) as f32;
        let sway;
        if down <= 60.0 {
            self.arm.y = down * 6.0 - 180.0;
            self.leg.y = 90.0 - down * 3.0;
            sway = down - 30.0;
        } else {
            self.arm.y = 540.0 - down * 6.0;
            self.leg.y = down * 3.0 - 270.0;
            sway = 90.0 - down;
        }

        // Variant-dependent axis swap, preserved as-is: the sway lands on X
        // normally and on Z for slim skins.
        if variant == SkinVariant::ModernSlim {
            self.head.x = 0.0;
            self.head.z = sway;
        } else {
            self.head.z = 0.0;
            self.head.x = sway;
        }

        self.cape = sway.abs() / 3.0;
    }

    /// Current clock value in milliseconds (wrapped).
    pub fn clock_ms(&self) -> u32 {
        self.clock_ms
    }

    pub fn angles(&self) -> PoseAngles {
        PoseAngles {
            arm: self.arm,
            leg: self.leg,
            head: self.head,
            cape_pitch: 11.8 + self.cape,
        }
    }
}

/// Rotation from the legacy degree encoding (degrees / 360 read as radians).
fn rot_x(deg: f32) -> Mat4 {
    Mat4::from_rotation_x(deg / 360.0)
}

fn rot_y(deg: f32) -> Mat4 {
    Mat4::from_rotation_y(deg / 360.0)
}

fn rot_z(deg: f32) -> Mat4 {
    Mat4::from_rotation_z(deg / 360.0)
}

fn translate(x: f32, y: f32, z: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(x, y, z))
}

/// Per-part transform: rotate about the part's attachment joint.
///
/// Matrices compose right-to-left; the rightmost factor moves the mesh so
/// the joint sits at the origin, then Z/X(/Y) rotations apply, then the part
/// is moved to its place on the torso.
pub fn part_transform(kind: PartKind, angles: &PoseAngles, variant: SkinVariant) -> Mat4 {
    let v = CUBE_SIZE;
    // Arm pivot distance; the slim arm sits slightly closer to the torso.
    let value = if variant == SkinVariant::ModernSlim { 1.375 } else { 1.5 };

    match kind {
        PartKind::Body => Mat4::IDENTITY,
        PartKind::Head => {
            translate(0.0, v * 1.5, 0.0)
                * rot_y(angles.head.z)
                * rot_x(angles.head.y)
                * rot_z(angles.head.x)
                * translate(0.0, v, 0.0)
        }
        PartKind::LeftArm => {
            translate(value * v - v / 2.0, value * v, 0.0)
                * rot_x(angles.arm.y)
                * rot_z(angles.arm.x)
                * translate(v / 2.0, -(value * v), 0.0)
        }
        PartKind::RightArm => {
            translate(-(value * v) + v / 2.0, value * v, 0.0)
                * rot_x(-angles.arm.y)
                * rot_z(-angles.arm.x)
                * translate(-v / 2.0, -(value * v), 0.0)
        }
        PartKind::LeftLeg => {
            translate(v * 0.5, -v * 1.5, 0.0)
                * rot_x(angles.leg.y)
                * rot_z(angles.leg.x)
                * translate(0.0, -v * 1.5, 0.0)
        }
        PartKind::RightLeg => {
            translate(-v * 0.5, -v * 1.5, 0.0)
                * rot_x(-angles.leg.y)
                * rot_z(-angles.leg.x)
                * translate(0.0, -v * 1.5, 0.0)
        }
        PartKind::Cape => {
            translate(0.0, v * 1.6, -v * 0.5)
                * Mat4::from_rotation_x(angles.cape_pitch.to_radians())
                * translate(0.0, -v * 2.0, -v * 0.1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticked(ms: u32, variant: SkinVariant) -> WalkCycle {
        let mut cycle = WalkCycle::new();
        cycle.running = true;
        cycle.tick(ms as f64 / 1000.0, variant);
        cycle
    }

    #[test]
    fn quarter_points_return_to_neutral() {
        // clock = 300ms -> down = 30 -> arm 30*6-180 = 0
        let cycle = ticked(300, SkinVariant::Modern);
        assert_eq!(cycle.angles().arm.y, 0.0);

        // clock = 900ms -> down = 90 -> arm 540-540 = 0, leg 270-270 = 0
        let cycle = ticked(900, SkinVariant::Modern);
        assert_eq!(cycle.angles().arm.y, 0.0);
        assert_eq!(cycle.angles().leg.y, 0.0);
    }

    #[test]
    fn extremes_at_cycle_ends() {
        let cycle = ticked(600, SkinVariant::Modern);
        assert_eq!(cycle.angles().arm.y, 180.0);
        assert_eq!(cycle.angles().leg.y, -90.0);
    }

    #[test]
    fn clock_wraps_and_survives_toggling() {
        let mut cycle = WalkCycle::new();
        cycle.running = true;
        cycle.tick(0.7, SkinVariant::Modern);
        cycle.running = false;
        cycle.tick(10.0, SkinVariant::Modern); // stopped: no advance
        assert_eq!(cycle.clock_ms(), 700);
        cycle.running = true;
        cycle.tick(0.6, SkinVariant::Modern); // 1300 > 1200 wraps to 0
        assert_eq!(cycle.clock_ms(), 0);
    }

    #[test]
    fn head_sway_axis_depends_on_variant() {
        let regular = ticked(100, SkinVariant::Modern);
        assert_eq!(regular.angles().head.x, -20.0);
        assert_eq!(regular.angles().head.z, 0.0);

        let slim = ticked(100, SkinVariant::ModernSlim);
        assert_eq!(slim.angles().head.x, 0.0);
        assert_eq!(slim.angles().head.z, -20.0);
    }

    #[test]
    fn arms_spread_constantly() {
        let cycle = ticked(450, SkinVariant::Modern);
        assert_eq!(cycle.angles().arm.x, 40.0);
    }

    #[test]
    fn bilateral_symmetry_of_limbs() {
        // Right(R) == Mirror(Left(-R)) across X, for the animated (Y) axis.
        let mirror = Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0));
        for theta in [-120.0f32, -35.0, 0.0, 48.0, 177.0] {
            let pos = PoseAngles {
                arm: Vec3::new(0.0, theta, 0.0),
                leg: Vec3::new(0.0, theta, 0.0),
                head: Vec3::ZERO,
                cape_pitch: 6.3,
            };
            let neg = PoseAngles {
                arm: Vec3::new(0.0, -theta, 0.0),
                leg: Vec3::new(0.0, -theta, 0.0),
                ..pos
            };
            for variant in [SkinVariant::Modern, SkinVariant::ModernSlim] {
                let right = part_transform(PartKind::RightArm, &pos, variant);
                let left = part_transform(PartKind::LeftArm, &neg, variant);
                let mirrored = mirror * left * mirror;
                assert!(right.abs_diff_eq(mirrored, 1e-5), "arm theta={theta}");

                let right = part_transform(PartKind::RightLeg, &pos, variant);
                let left = part_transform(PartKind::LeftLeg, &neg, variant);
                let mirrored = mirror * left * mirror;
                assert!(right.abs_diff_eq(mirrored, 1e-5), "leg theta={theta}");
            }
        }
    }

    #[test]
    fn limbs_rotate_about_their_joint() {
        // With zero angles every limb transform reduces to its resting
        // translation: joint pivot out and back.
        let angles = PoseAngles::from(PoseState::default());
        let m = part_transform(PartKind::LeftLeg, &angles, SkinVariant::Modern);
        let expected = translate(CUBE_SIZE * 0.5, -CUBE_SIZE * 3.0, 0.0);
        assert!(m.abs_diff_eq(expected, 1e-6));
    }
}
