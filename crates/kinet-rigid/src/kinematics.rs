//! Forward kinematics — body transforms, velocities, and bias accelerations.

use kinet_math::{DVec, SpatialTransform, SpatialVec};
use kinet_model::Model;

/// Cached outcome of one forward-kinematics sweep.
///
/// Everything downstream (frame queries, constraint jacobians, drift terms)
/// reads from this struct rather than re-deriving tree state.
#[derive(Debug, Clone)]
pub struct Kinematics {
    /// Plücker transforms from world to each body frame.
    pub x_world_to_body: Vec<SpatialTransform>,
    /// Spatial velocities in body coordinates.
    pub body_vel: Vec<SpatialVec>,
    /// Bias spatial accelerations in body coordinates: the acceleration
    /// field obtained with zero joint accelerations (and no gravity term),
    /// i.e. the velocity-product terms only.
    pub body_acc_bias: Vec<SpatialVec>,
}

/// Run forward kinematics over the tree for configuration `q`, velocity `v`.
pub fn compute_kinematics(model: &Model, q: &DVec, v: &DVec) -> Kinematics {
    let nb = model.nbodies();
    let mut x_world_to_body = vec![SpatialTransform::identity(); nb];
    let mut body_vel = vec![SpatialVec::zero(); nb];
    let mut body_acc_bias = vec![SpatialVec::zero(); nb];

    for i in 0..nb {
        let body = &model.bodies[i];
        let joint = &model.joints[body.joint_idx];
        let q_idx = model.q_offsets[body.joint_idx];
        let v_idx = model.v_offsets[body.joint_idx];

        let x_joint = joint.joint_transform(&q.as_slice()[q_idx..q_idx + joint.nq()]);
        let x_tree = x_joint.compose(&joint.parent_to_joint);

        let v_joint = joint.joint_velocity(&v.as_slice()[v_idx..v_idx + joint.nv()]);

        if body.parent < 0 {
            x_world_to_body[i] = x_tree;
            body_vel[i] = v_joint;
            // Root: no parent motion, so the velocity-product term vanishes
            body_acc_bias[i] = SpatialVec::zero();
        } else {
            let pi = body.parent as usize;
            x_world_to_body[i] = x_tree.compose(&x_world_to_body[pi]);

            let v_parent = x_tree.apply_motion(&body_vel[pi]);
            body_vel[i] = v_parent + v_joint;

            let a_parent = x_tree.apply_motion(&body_acc_bias[pi]);
            body_acc_bias[i] = a_parent + body_vel[i].cross_motion(&v_joint);
        }
    }

    Kinematics {
        x_world_to_body,
        body_vel,
        body_acc_bias,
    }
}
