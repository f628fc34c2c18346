use glam::IVec3;
use serde::{Deserialize, Serialize};

/// Object identifier. `0` never names a live object.
pub type ObjId = u16;

/// Process identifier. `0` is the "no process" sentinel.
pub type ProcId = u16;

/// A point in world space.
pub type Point3 = IVec3;

/// Footpad extents of an item in world units.
pub type Dims = IVec3;

/// The eight compass directions used for movement and placement scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// Step along the x axis for one unit of movement in this direction.
    pub fn dx(self) -> i32 {
        match self {
            Direction::North | Direction::South => 0,
            Direction::NorthEast | Direction::East | Direction::SouthEast => 1,
            Direction::SouthWest | Direction::West | Direction::NorthWest => -1,
        }
    }

    /// Step along the y axis for one unit of movement in this direction.
    pub fn dy(self) -> i32 {
        match self {
            Direction::West | Direction::East => 0,
            Direction::North | Direction::NorthEast | Direction::NorthWest => -1,
            Direction::SouthEast | Direction::South | Direction::SouthWest => 1,
        }
    }

    /// The direction a quarter turn clockwise from this one.
    pub fn perpendicular(self) -> Direction {
        let idx = Self::ALL.iter().position(|d| *d == self).unwrap_or(0);
        Self::ALL[(idx + 2) % 8]
    }
}

/// Half-open integer rectangle `[left, right) x [top, bottom)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

/// World-space box of an item: location plus footpad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub pos: Point3,
    pub dims: Dims,
}

impl BoundingBox {
    pub fn new(pos: Point3, dims: Dims) -> Self {
        Self { pos, dims }
    }

    pub fn min_x(&self) -> i32 {
        self.pos.x - self.dims.x
    }

    pub fn max_x(&self) -> i32 {
        self.pos.x
    }

    pub fn min_y(&self) -> i32 {
        self.pos.y - self.dims.y
    }

    pub fn max_y(&self) -> i32 {
        self.pos.y
    }

    pub fn min_z(&self) -> i32 {
        self.pos.z
    }

    pub fn max_z(&self) -> i32 {
        self.pos.z + self.dims.z
    }

    /// Lower and upper bound along axis `i` (0 = x, 1 = y, 2 = z).
    pub fn axis(&self, i: usize) -> (i32, i32) {
        match i {
            0 => (self.min_x(), self.max_x()),
            1 => (self.min_y(), self.max_y()),
            _ => (self.min_z(), self.max_z()),
        }
    }

    /// Interior overlap in x and y. Boxes that only share a face do not overlap.
    pub fn overlaps_xy(&self, other: &BoundingBox) -> bool {
        !(self.max_x() <= other.min_x()
            || self.min_x() >= other.max_x()
            || self.max_y() <= other.min_y()
            || self.min_y() >= other.max_y())
    }

    /// Interior overlap on all three axes.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.overlaps_xy(other)
            && !(self.max_z() <= other.min_z() || self.min_z() >= other.max_z())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perpendicular_is_quarter_turn() {
        assert_eq!(Direction::North.perpendicular(), Direction::East);
        assert_eq!(Direction::West.perpendicular(), Direction::North);
        assert_eq!(Direction::NorthWest.perpendicular(), Direction::NorthEast);
    }

    #[test]
    fn direction_steps() {
        assert_eq!((Direction::North.dx(), Direction::North.dy()), (0, -1));
        assert_eq!((Direction::SouthWest.dx(), Direction::SouthWest.dy()), (-1, 1));
    }

    #[test]
    fn rect_intersection_is_half_open() {
        let a = Rect::new(0, 0, 10, 10);
        assert!(a.intersects(&Rect::new(9, 9, 20, 20)));
        assert!(!a.intersects(&Rect::new(10, 0, 20, 10)));
        assert!(a.contains(0, 0));
        assert!(!a.contains(10, 5));
    }

    #[test]
    fn box_extends_negative_xy_positive_z() {
        let b = BoundingBox::new(IVec3::new(100, 200, 10), IVec3::new(32, 64, 8));
        assert_eq!(b.axis(0), (68, 100));
        assert_eq!(b.axis(1), (136, 200));
        assert_eq!(b.axis(2), (10, 18));
    }

    #[test]
    fn touching_boxes_do_not_overlap() {
        let a = BoundingBox::new(IVec3::new(32, 32, 0), IVec3::new(32, 32, 16));
        let b = BoundingBox::new(IVec3::new(64, 32, 0), IVec3::new(32, 32, 16));
        assert!(!a.overlaps(&b));
        let c = BoundingBox::new(IVec3::new(40, 32, 0), IVec3::new(32, 32, 16));
        assert!(a.overlaps(&c));
    }
}
