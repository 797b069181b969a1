//! Named operational frames attached to bodies.

use kinet_math::{Mat3, Vec3};

/// A named frame rigidly attached to a body (or to the world).
///
/// Constraints and sensors address geometry through frames rather than raw
/// body indices, so a model can expose semantically meaningful attachment
/// points ("left_gripper", "anchor") independently of its tree layout.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame name (unique within a model).
    pub name: String,
    /// Index of the carrying body, or -1 for a world-fixed frame.
    pub parent: i32,
    /// Frame orientation in the carrying body's frame (frame axes in body coords).
    pub rot: Mat3,
    /// Frame origin in the carrying body's frame.
    pub pos: Vec3,
}

impl Frame {
    /// Create a frame at the given pose in the carrying body's frame.
    pub fn new(name: &str, parent: i32, rot: Mat3, pos: Vec3) -> Self {
        Self {
            name: name.to_string(),
            parent,
            rot,
            pos,
        }
    }

    /// Create an axis-aligned frame at the given offset in the body frame.
    pub fn at_offset(name: &str, parent: i32, pos: Vec3) -> Self {
        Self::new(name, parent, Mat3::identity(), pos)
    }
}
