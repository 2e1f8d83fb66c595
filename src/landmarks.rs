//! Hand landmark sets and the geometric predicates the gesture detector is built on.
//!
//! A set is always 21 points in normalized frame space (x,y in [0,1], z relative
//! depth), indexed by fixed anatomical identity.

use serde::Deserialize;

pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_FINGER_MCP: usize = 5;
pub const INDEX_FINGER_PIP: usize = 6;
pub const INDEX_FINGER_DIP: usize = 7;
pub const INDEX_FINGER_TIP: usize = 8;
pub const MIDDLE_FINGER_MCP: usize = 9;
pub const MIDDLE_FINGER_PIP: usize = 10;
pub const MIDDLE_FINGER_DIP: usize = 11;
pub const MIDDLE_FINGER_TIP: usize = 12;
pub const RING_FINGER_MCP: usize = 13;
pub const RING_FINGER_PIP: usize = 14;
pub const RING_FINGER_DIP: usize = 15;
pub const RING_FINGER_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_DIP: usize = 19;
pub const PINKY_TIP: usize = 20;

/// (x, y, z)
pub type Point3 = (f64, f64, f64);

const ORIGIN: Point3 = (0.0, 0.0, 0.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: [Point3; LANDMARK_COUNT],
    handedness: Handedness,
}

impl LandmarkSet {
    pub fn new(points: [Point3; LANDMARK_COUNT], handedness: Handedness) -> Self {
        Self { points, handedness }
    }

    /// Builds a set from a detector output; `None` unless exactly 21 points.
    pub fn from_points(points: &[Point3], handedness: Handedness) -> Option<Self> {
        let points: [Point3; LANDMARK_COUNT] = points.try_into().ok()?;
        Some(Self::new(points, handedness))
    }

    pub fn handedness(&self) -> Handedness {
        self.handedness
    }

    /// Out-of-range indices yield the origin instead of failing. The origin is
    /// not a meaningful coordinate; callers should only pass anatomical indices.
    pub fn landmark(&self, index: usize) -> Point3 {
        self.points.get(index).copied().unwrap_or(ORIGIN)
    }

    pub fn distance(&self, i: usize, j: usize) -> f64 {
        let (ax, ay, az) = self.landmark(i);
        let (bx, by, bz) = self.landmark(j);
        let (dx, dy, dz) = (ax - bx, ay - by, az - bz);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// A finger counts as extended when its tip sits above (smaller y) the joint
    /// two indices closer to the wrist.
    ///
    /// The same `tip - 2` offset is used for the thumb, whose joint topology
    /// differs; a folded thumb can read as extended.
    pub fn is_extended(&self, tip_index: usize) -> bool {
        let pip = tip_index
            .checked_sub(2)
            .map(|i| self.landmark(i))
            .unwrap_or(ORIGIN);
        self.landmark(tip_index).1 < pip.1
    }

    /// Number of extended fingers (0-5). The thumb is judged sideways, away from
    /// its MCP joint in the direction that depends on handedness.
    pub fn count_extended_fingers(&self) -> usize {
        let fingers = [INDEX_FINGER_TIP, MIDDLE_FINGER_TIP, RING_FINGER_TIP, PINKY_TIP]
            .into_iter()
            .filter(|&tip| self.is_extended(tip))
            .count();

        let thumb_tip = self.landmark(THUMB_TIP).0;
        let thumb_mcp = self.landmark(THUMB_MCP).0;
        let thumb_out = match self.handedness {
            Handedness::Right => thumb_tip < thumb_mcp,
            Handedness::Left => thumb_tip > thumb_mcp,
        };

        fingers + usize::from(thumb_out)
    }
}
