//! Model definition — static description of a mechanical system.

use crate::{Body, Frame, Joint};
use kinet_math::{DVec, SpatialInertia, SpatialTransform, Vec3, GRAVITY};

/// Static model describing the topology and parameters of a mechanical system.
#[derive(Debug, Clone)]
pub struct Model {
    /// Bodies in the kinematic tree (index 0 = first body, no world body).
    pub bodies: Vec<Body>,
    /// Joints connecting bodies.
    pub joints: Vec<Joint>,
    /// Named operational frames.
    pub frames: Vec<Frame>,
    /// Gravity vector in world frame.
    pub gravity: Vec3,
    /// Total number of position coordinates.
    pub nq: usize,
    /// Total number of velocity coordinates.
    pub nv: usize,
    /// Position coordinate offset for each joint.
    pub q_offsets: Vec<usize>,
    /// Velocity coordinate offset for each joint.
    pub v_offsets: Vec<usize>,
}

impl Model {
    /// Number of bodies.
    pub fn nbodies(&self) -> usize {
        self.bodies.len()
    }

    /// Look up a frame index by name.
    pub fn frame_index(&self, name: &str) -> Option<usize> {
        self.frames.iter().position(|f| f.name == name)
    }

    /// Neutral configuration: identity quaternions, zeros elsewhere.
    pub fn neutral_q(&self) -> DVec {
        let mut q = DVec::zeros(self.nq);
        for (j, joint) in self.joints.iter().enumerate() {
            let off = self.q_offsets[j];
            joint.neutral(&mut q.as_mut_slice()[off..off + joint.nq()]);
        }
        q
    }

    /// Zero velocity vector.
    pub fn zero_v(&self) -> DVec {
        DVec::zeros(self.nv)
    }
}

/// Builder for constructing models.
pub struct ModelBuilder {
    bodies: Vec<Body>,
    joints: Vec<Joint>,
    frames: Vec<Frame>,
    gravity: Vec3,
}

impl ModelBuilder {
    /// Start building a new model.
    pub fn new() -> Self {
        Self {
            bodies: Vec::new(),
            joints: Vec::new(),
            frames: Vec::new(),
            gravity: Vec3::new(0.0, 0.0, -GRAVITY),
        }
    }

    /// Set the gravity vector.
    pub fn gravity(mut self, g: Vec3) -> Self {
        self.gravity = g;
        self
    }

    /// Add a body connected by the given joint.
    ///
    /// `parent` is the index of the parent body, or -1 for world.
    pub fn add_body(
        mut self,
        name: &str,
        parent: i32,
        joint: Joint,
        inertia: SpatialInertia,
    ) -> Self {
        let joint_idx = self.joints.len();
        self.joints.push(joint);
        self.bodies.push(Body {
            name: name.to_string(),
            inertia,
            parent,
            joint_idx,
        });
        self
    }

    /// Add a body with a revolute joint about `axis`.
    pub fn add_revolute_body(
        self,
        name: &str,
        parent: i32,
        parent_to_joint: SpatialTransform,
        axis: Vec3,
        inertia: SpatialInertia,
    ) -> Self {
        self.add_body(name, parent, Joint::revolute(parent_to_joint, axis), inertia)
    }

    /// Add a body with a prismatic joint along `axis`.
    pub fn add_prismatic_body(
        self,
        name: &str,
        parent: i32,
        parent_to_joint: SpatialTransform,
        axis: Vec3,
        inertia: SpatialInertia,
    ) -> Self {
        self.add_body(
            name,
            parent,
            Joint::prismatic(parent_to_joint, axis),
            inertia,
        )
    }

    /// Add a body with a spherical (ball) joint.
    pub fn add_spherical_body(
        self,
        name: &str,
        parent: i32,
        parent_to_joint: SpatialTransform,
        inertia: SpatialInertia,
    ) -> Self {
        self.add_body(name, parent, Joint::spherical(parent_to_joint), inertia)
    }

    /// Add a body with a free joint (6 DOF).
    pub fn add_free_body(
        self,
        name: &str,
        parent: i32,
        parent_to_joint: SpatialTransform,
        inertia: SpatialInertia,
    ) -> Self {
        self.add_body(name, parent, Joint::free(parent_to_joint), inertia)
    }

    /// Add a named frame attached to a body (-1 for a world-fixed frame).
    pub fn add_frame(mut self, frame: Frame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Build the model.
    pub fn build(self) -> Model {
        let mut nq = 0;
        let mut nv = 0;
        let mut q_offsets = Vec::new();
        let mut v_offsets = Vec::new();

        for joint in &self.joints {
            q_offsets.push(nq);
            v_offsets.push(nv);
            nq += joint.nq();
            nv += joint.nv();
        }

        Model {
            bodies: self.bodies,
            joints: self.joints,
            frames: self.frames,
            gravity: self.gravity,
            nq,
            nv,
            q_offsets,
            v_offsets,
        }
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinet_math::Mat3;

    #[test]
    fn offsets_diverge_for_quaternion_joints() {
        let model = ModelBuilder::new()
            .add_free_body(
                "base",
                -1,
                SpatialTransform::identity(),
                SpatialInertia::sphere(1.0, 0.1),
            )
            .add_revolute_body(
                "arm",
                0,
                SpatialTransform::identity(),
                Vec3::z(),
                SpatialInertia::point_mass(1.0, Vec3::new(0.0, -0.5, 0.0)),
            )
            .build();

        assert_eq!(model.nq, 8);
        assert_eq!(model.nv, 7);
        assert_eq!(model.q_offsets, vec![0, 7]);
        assert_eq!(model.v_offsets, vec![0, 6]);
    }

    #[test]
    fn neutral_q_has_identity_quaternions() {
        let model = ModelBuilder::new()
            .add_free_body(
                "base",
                -1,
                SpatialTransform::identity(),
                SpatialInertia::sphere(1.0, 0.1),
            )
            .build();

        let q = model.neutral_q();
        assert_eq!(q.as_slice(), &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn frame_lookup_by_name() {
        let model = ModelBuilder::new()
            .add_revolute_body(
                "link",
                -1,
                SpatialTransform::identity(),
                Vec3::z(),
                SpatialInertia::point_mass(1.0, Vec3::zeros()),
            )
            .add_frame(Frame::new(
                "tip",
                0,
                Mat3::identity(),
                Vec3::new(0.0, -1.0, 0.0),
            ))
            .build();

        assert_eq!(model.frame_index("tip"), Some(0));
        assert_eq!(model.frame_index("missing"), None);
    }
}
