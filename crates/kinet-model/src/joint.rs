//! Joint types, transforms, and per-joint configuration arithmetic.
//!
//! Spherical and free joints store a unit quaternion in `q` (scalar first),
//! so their position dimension exceeds their velocity dimension. The
//! `integrate`/`difference` maps below are the retraction and its inverse
//! for each joint type; the tangent convention for multi-DOF joints is
//! Featherstone order [angular; linear] in the joint frame.

use kinet_math::{DMat, Mat3, SpatialTransform, SpatialVec, Vec3};
use nalgebra::{Quaternion, Rotation3, Unit, UnitQuaternion};

/// Joint type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointType {
    /// Single rotational DOF about an axis.
    Revolute,
    /// Single translational DOF along an axis.
    Prismatic,
    /// 3 DOF ball joint; q is a unit quaternion [w, x, y, z].
    Spherical,
    /// 6 DOF free-flyer; q is [x, y, z, qw, qx, qy, qz].
    Free,
    /// 0 DOF rigid attachment.
    Fixed,
}

/// A joint connecting a body to its parent.
#[derive(Debug, Clone)]
pub struct Joint {
    /// Joint type.
    pub joint_type: JointType,
    /// Transform from parent body frame to joint frame (constant).
    pub parent_to_joint: SpatialTransform,
    /// Joint axis in the joint frame (revolute/prismatic only).
    pub axis: Vec3,
}

impl Joint {
    /// Create a revolute joint rotating about the given axis.
    pub fn revolute(parent_to_joint: SpatialTransform, axis: Vec3) -> Self {
        Self {
            joint_type: JointType::Revolute,
            parent_to_joint,
            axis,
        }
    }

    /// Create a prismatic joint sliding along the given axis.
    pub fn prismatic(parent_to_joint: SpatialTransform, axis: Vec3) -> Self {
        Self {
            joint_type: JointType::Prismatic,
            parent_to_joint,
            axis,
        }
    }

    /// Create a spherical (ball) joint.
    pub fn spherical(parent_to_joint: SpatialTransform) -> Self {
        Self {
            joint_type: JointType::Spherical,
            parent_to_joint,
            axis: Vec3::zeros(),
        }
    }

    /// Create a free joint (6 DOF).
    pub fn free(parent_to_joint: SpatialTransform) -> Self {
        Self {
            joint_type: JointType::Free,
            parent_to_joint,
            axis: Vec3::zeros(),
        }
    }

    /// Create a fixed joint (rigid attachment).
    pub fn fixed(parent_to_joint: SpatialTransform) -> Self {
        Self {
            joint_type: JointType::Fixed,
            parent_to_joint,
            axis: Vec3::zeros(),
        }
    }

    /// Number of position coordinates for this joint type.
    pub fn nq(&self) -> usize {
        match self.joint_type {
            JointType::Revolute | JointType::Prismatic => 1,
            JointType::Spherical => 4,
            JointType::Free => 7,
            JointType::Fixed => 0,
        }
    }

    /// Number of velocity coordinates (tangent dimension) for this joint type.
    pub fn nv(&self) -> usize {
        match self.joint_type {
            JointType::Revolute | JointType::Prismatic => 1,
            JointType::Spherical => 3,
            JointType::Free => 6,
            JointType::Fixed => 0,
        }
    }

    /// Write the neutral configuration into `q` (identity quaternions, zeros).
    pub fn neutral(&self, q: &mut [f64]) {
        match self.joint_type {
            JointType::Revolute | JointType::Prismatic => q[0] = 0.0,
            JointType::Spherical => write_quat(&UnitQuaternion::identity(), q),
            JointType::Free => {
                q[..3].fill(0.0);
                write_quat(&UnitQuaternion::identity(), &mut q[3..7]);
            }
            JointType::Fixed => {}
        }
    }

    /// Renormalize the quaternion part of `q`, if any.
    pub fn normalize(&self, q: &mut [f64]) {
        match self.joint_type {
            JointType::Spherical => write_quat(&read_quat(&q[0..4]), &mut q[0..4]),
            JointType::Free => write_quat(&read_quat(&q[3..7]), &mut q[3..7]),
            _ => {}
        }
    }

    /// Retraction: `q_out = q ⊕ dq` for this joint's configuration slice.
    ///
    /// `dq` has `nv()` entries; quaternion parts come out unit-norm.
    pub fn integrate(&self, q: &[f64], dq: &[f64], q_out: &mut [f64]) {
        match self.joint_type {
            JointType::Revolute | JointType::Prismatic => q_out[0] = q[0] + dq[0],
            JointType::Spherical => {
                let step = UnitQuaternion::from_scaled_axis(Vec3::new(dq[0], dq[1], dq[2]));
                write_quat(&(read_quat(&q[0..4]) * step), &mut q_out[0..4]);
            }
            JointType::Free => {
                // Tangent is a body-frame twist [angular; linear]: translate
                // in the current orientation, then rotate.
                let rotation = read_quat(&q[3..7]);
                let step = UnitQuaternion::from_scaled_axis(Vec3::new(dq[0], dq[1], dq[2]));
                let shifted =
                    Vec3::new(q[0], q[1], q[2]) + rotation * Vec3::new(dq[3], dq[4], dq[5]);
                q_out[..3].copy_from_slice(shifted.as_slice());
                write_quat(&(rotation * step), &mut q_out[3..7]);
            }
            JointType::Fixed => {}
        }
    }

    /// Inverse retraction: `dq_out = q1 ⊖ q0` for this joint's slices.
    pub fn difference(&self, q0: &[f64], q1: &[f64], dq_out: &mut [f64]) {
        match self.joint_type {
            JointType::Revolute | JointType::Prismatic => dq_out[0] = q1[0] - q0[0],
            JointType::Spherical => {
                let delta = read_quat(&q0[0..4]).inverse() * read_quat(&q1[0..4]);
                dq_out[0..3].copy_from_slice(delta.scaled_axis().as_slice());
            }
            JointType::Free => {
                let rot0 = read_quat(&q0[3..7]);
                let delta = rot0.inverse() * read_quat(&q1[3..7]);
                let dp = Vec3::new(q1[0] - q0[0], q1[1] - q0[1], q1[2] - q0[2]);
                dq_out[0..3].copy_from_slice(delta.scaled_axis().as_slice());
                dq_out[3..6].copy_from_slice(rot0.inverse_transform_vector(&dp).as_slice());
            }
            JointType::Fixed => {}
        }
    }

    /// Compute the joint transform for the given configuration slice.
    ///
    /// Returns the Plücker transform from predecessor to successor frame.
    pub fn joint_transform(&self, q: &[f64]) -> SpatialTransform {
        match self.joint_type {
            JointType::Revolute => {
                // Coordinate transform rotates by the negated angle
                let rot = Rotation3::from_axis_angle(&Unit::new_normalize(self.axis), -q[0]);
                SpatialTransform::new(*rot.matrix(), Vec3::zeros())
            }
            JointType::Prismatic => {
                SpatialTransform::new(Mat3::identity(), self.axis * q[0])
            }
            JointType::Spherical => {
                let rot = read_quat(&q[0..4]).to_rotation_matrix();
                SpatialTransform::new(rot.matrix().transpose(), Vec3::zeros())
            }
            JointType::Free => {
                let rot = read_quat(&q[3..7]).to_rotation_matrix();
                SpatialTransform::new(rot.matrix().transpose(), Vec3::new(q[0], q[1], q[2]))
            }
            JointType::Fixed => SpatialTransform::identity(),
        }
    }

    /// Joint velocity contribution S * qd in the joint frame.
    pub fn joint_velocity(&self, qd: &[f64]) -> SpatialVec {
        match self.joint_type {
            JointType::Revolute => SpatialVec::new(self.axis * qd[0], Vec3::zeros()),
            JointType::Prismatic => SpatialVec::new(Vec3::zeros(), self.axis * qd[0]),
            JointType::Spherical => {
                SpatialVec::new(Vec3::new(qd[0], qd[1], qd[2]), Vec3::zeros())
            }
            JointType::Free => SpatialVec::new(
                Vec3::new(qd[0], qd[1], qd[2]),
                Vec3::new(qd[3], qd[4], qd[5]),
            ),
            JointType::Fixed => SpatialVec::zero(),
        }
    }

    /// Motion subspace matrix S for this joint, 6 × nv.
    pub fn motion_subspace_matrix(&self) -> DMat {
        let mut s = DMat::zeros(6, self.nv());
        match self.joint_type {
            JointType::Revolute => {
                for r in 0..3 {
                    s[(r, 0)] = self.axis[r];
                }
            }
            JointType::Prismatic => {
                for r in 0..3 {
                    s[(r + 3, 0)] = self.axis[r];
                }
            }
            JointType::Spherical => {
                // Angular velocity in the joint frame
                for r in 0..3 {
                    s[(r, r)] = 1.0;
                }
            }
            JointType::Free => {
                for r in 0..6 {
                    s[(r, r)] = 1.0;
                }
            }
            JointType::Fixed => {}
        }
        s
    }

    /// Motion subspace for single-DOF joints.
    ///
    /// Fixed joints return zero; multi-DOF joints must use
    /// `motion_subspace_matrix`.
    pub fn motion_subspace(&self) -> SpatialVec {
        match self.joint_type {
            JointType::Revolute => SpatialVec::new(self.axis, Vec3::zeros()),
            JointType::Prismatic => SpatialVec::new(Vec3::zeros(), self.axis),
            JointType::Fixed => SpatialVec::zero(),
            _ => panic!(
                "motion_subspace() only valid for single-DOF joints; \
                 use motion_subspace_matrix() for multi-DOF joints"
            ),
        }
    }
}

fn read_quat(q: &[f64]) -> UnitQuaternion<f64> {
    // An all-zero slice falls back to identity; NaN passes through so the
    // integrator's error heuristics can see it
    let raw = Quaternion::new(q[0], q[1], q[2], q[3]);
    if raw.norm_squared() < 1e-24 {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::from_quaternion(raw)
}

fn write_quat(rotation: &UnitQuaternion<f64>, q: &mut [f64]) {
    let raw = rotation.quaternion();
    q[0] = raw.w;
    q[1] = raw.i;
    q[2] = raw.j;
    q[3] = raw.k;
}
