//! Draw units
//!
//! The avatar is a flat list of 13 draw units: six body parts in a base
//! layer, the same six in an enlarged overlay layer, and the cape. There is
//! no scene graph; the hierarchy is exactly one level deep (limbs attach to
//! the torso origin) and is expressed by the per-part pivot table in
//! [`crate::pose`]. Unit indices double as slots in the dynamic uniform
//! buffer and must stay stable.

/// Transform role of a draw unit; overlay units share their base transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Head,
    Body,
    LeftArm,
    RightArm,
    LeftLeg,
    RightLeg,
    Cape,
}

/// One of the 13 drawable units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawUnit {
    Head,
    Body,
    LeftArm,
    RightArm,
    LeftLeg,
    RightLeg,
    OverlayHead,
    OverlayBody,
    OverlayLeftArm,
    OverlayRightArm,
    OverlayLeftLeg,
    OverlayRightLeg,
    Cape,
}

/// Total number of draw units (and dynamic uniform slots).
pub const PART_COUNT: usize = 13;

impl DrawUnit {
    /// All units in uniform-slot order.
    pub const ALL: [DrawUnit; PART_COUNT] = [
        DrawUnit::Head,
        DrawUnit::Body,
        DrawUnit::LeftArm,
        DrawUnit::RightArm,
        DrawUnit::LeftLeg,
        DrawUnit::RightLeg,
        DrawUnit::OverlayHead,
        DrawUnit::OverlayBody,
        DrawUnit::OverlayLeftArm,
        DrawUnit::OverlayRightArm,
        DrawUnit::OverlayLeftLeg,
        DrawUnit::OverlayRightLeg,
        DrawUnit::Cape,
    ];

    /// Base-layer units in draw order (body first, as recorded).
    pub const BASE_DRAW_ORDER: [DrawUnit; 6] = [
        DrawUnit::Body,
        DrawUnit::Head,
        DrawUnit::LeftArm,
        DrawUnit::RightArm,
        DrawUnit::LeftLeg,
        DrawUnit::RightLeg,
    ];

    /// Overlay-layer units in draw order.
    pub const OVERLAY_DRAW_ORDER: [DrawUnit; 6] = [
        DrawUnit::OverlayBody,
        DrawUnit::OverlayHead,
        DrawUnit::OverlayLeftArm,
        DrawUnit::OverlayRightArm,
        DrawUnit::OverlayLeftLeg,
        DrawUnit::OverlayRightLeg,
    ];

    /// Stable slot index into the dynamic uniform buffer.
    pub fn index(self) -> usize {
        match self {
            DrawUnit::Head => 0,
            DrawUnit::Body => 1,
            DrawUnit::LeftArm => 2,
            DrawUnit::RightArm => 3,
            DrawUnit::LeftLeg => 4,
            DrawUnit::RightLeg => 5,
            DrawUnit::OverlayHead => 6,
            DrawUnit::OverlayBody => 7,
            DrawUnit::OverlayLeftArm => 8,
            DrawUnit::OverlayRightArm => 9,
            DrawUnit::OverlayLeftLeg => 10,
            DrawUnit::OverlayRightLeg => 11,
            DrawUnit::Cape => 12,
        }
    }

    /// Transform role; an overlay unit moves with its base part.
    pub fn kind(self) -> PartKind {
        match self {
            DrawUnit::Head | DrawUnit::OverlayHead => PartKind::Head,
            DrawUnit::Body | DrawUnit::OverlayBody => PartKind::Body,
            DrawUnit::LeftArm | DrawUnit::OverlayLeftArm => PartKind::LeftArm,
            DrawUnit::RightArm | DrawUnit::OverlayRightArm => PartKind::RightArm,
            DrawUnit::LeftLeg | DrawUnit::OverlayLeftLeg => PartKind::LeftLeg,
            DrawUnit::RightLeg | DrawUnit::OverlayRightLeg => PartKind::RightLeg,
            DrawUnit::Cape => PartKind::Cape,
        }
    }

    pub fn is_overlay(self) -> bool {
        matches!(
            self,
            DrawUnit::OverlayHead
                | DrawUnit::OverlayBody
                | DrawUnit::OverlayLeftArm
                | DrawUnit::OverlayRightArm
                | DrawUnit::OverlayLeftLeg
                | DrawUnit::OverlayRightLeg
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_stable_and_unique() {
        for (i, unit) in DrawUnit::ALL.iter().enumerate() {
            assert_eq!(unit.index(), i);
        }
    }

    #[test]
    fn thirteen_units_exist() {
        assert_eq!(DrawUnit::ALL.len(), PART_COUNT);
        assert_eq!(DrawUnit::ALL.iter().filter(|u| u.is_overlay()).count(), 6);
    }

    #[test]
    fn overlay_shares_base_kind() {
        assert_eq!(DrawUnit::OverlayLeftArm.kind(), DrawUnit::LeftArm.kind());
        assert_eq!(DrawUnit::OverlayHead.kind(), PartKind::Head);
        assert_eq!(DrawUnit::Cape.kind(), PartKind::Cape);
    }
}
