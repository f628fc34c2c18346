//! Shared handles and integer world geometry.
//!
//! World space is integer-valued. An item's location is the corner with the
//! largest x/y and the smallest z; its footpad extends towards negative x/y and
//! positive z from there.

mod types;

pub use types::{BoundingBox, Direction, Dims, ObjId, Point3, ProcId, Rect};
