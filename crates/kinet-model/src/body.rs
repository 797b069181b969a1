//! Rigid body description.

use kinet_math::SpatialInertia;

/// A rigid body in the kinematic tree.
#[derive(Debug, Clone)]
pub struct Body {
    /// Body name (unique within a model).
    pub name: String,
    /// Spatial inertia in the body frame.
    pub inertia: SpatialInertia,
    /// Index of the parent body, or -1 for the world.
    pub parent: i32,
    /// Index of the joint connecting this body to its parent.
    pub joint_idx: usize,
}
