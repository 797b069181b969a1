//! Recursive Newton-Euler Algorithm (RNEA) — inverse dynamics.
//!
//! Given (q, v, qdd), compute the required joint torques tau. With qdd = 0
//! this yields the nonlinear bias forces b(q, v) (Coriolis, centrifugal,
//! gravity).

use kinet_math::{DVec, SpatialTransform, SpatialVec, Vec3};
use kinet_model::Model;

/// Run RNEA: compute the joint torques realizing accelerations `qdd`.
pub fn rnea(model: &Model, q: &DVec, v: &DVec, qdd: &DVec) -> DVec {
    let nb = model.nbodies();
    let mut tau = DVec::zeros(model.nv);

    let mut x_tree = vec![SpatialTransform::identity(); nb];
    let mut vel = vec![SpatialVec::zero(); nb];
    let mut acc = vec![SpatialVec::zero(); nb];

    // Gravity enters as a fictitious base acceleration
    let a0 = SpatialVec::new(Vec3::zeros(), -model.gravity);

    // Forward pass: velocities and accelerations
    for i in 0..nb {
        let body = &model.bodies[i];
        let joint = &model.joints[body.joint_idx];
        let q_idx = model.q_offsets[body.joint_idx];
        let v_idx = model.v_offsets[body.joint_idx];

        let x_joint = joint.joint_transform(&q.as_slice()[q_idx..q_idx + joint.nq()]);
        x_tree[i] = x_joint.compose(&joint.parent_to_joint);

        let v_joint = joint.joint_velocity(&v.as_slice()[v_idx..v_idx + joint.nv()]);
        let a_joint = joint.joint_velocity(&qdd.as_slice()[v_idx..v_idx + joint.nv()]);

        if body.parent < 0 {
            vel[i] = v_joint;
            acc[i] = x_tree[i].apply_motion(&a0) + a_joint;
        } else {
            let pi = body.parent as usize;
            let v_parent = x_tree[i].apply_motion(&vel[pi]);
            vel[i] = v_parent + v_joint;

            let a_parent = x_tree[i].apply_motion(&acc[pi]);
            acc[i] = a_parent + vel[i].cross_motion(&v_joint) + a_joint;
        }
    }

    // Backward pass: forces and torques
    let mut forces = vec![SpatialVec::zero(); nb];
    for i in 0..nb {
        let inertia = &model.bodies[i].inertia;
        forces[i] = inertia.momentum(&acc[i]) + vel[i].cross_force(&inertia.momentum(&vel[i]));
    }

    for i in (0..nb).rev() {
        let body = &model.bodies[i];
        let joint = &model.joints[body.joint_idx];
        let v_idx = model.v_offsets[body.joint_idx];
        let ndof = joint.nv();

        if ndof == 1 {
            let s_i = joint.motion_subspace();
            tau[v_idx] = s_i.dot(&forces[i]);
        } else if ndof > 1 {
            let s_mat = joint.motion_subspace_matrix(); // 6 x ndof
            let f_vec = DVec::from_column_slice(forces[i].to_vec6().as_slice());
            let projected = s_mat.transpose() * &f_vec;
            for k in 0..ndof {
                tau[v_idx + k] = projected[k];
            }
        }

        if body.parent >= 0 {
            let pi = body.parent as usize;
            forces[pi] = forces[pi] + x_tree[i].inv_apply_force(&forces[i]);
        }
    }

    tau
}

/// Nonlinear bias forces b(q, v): RNEA with zero joint accelerations.
pub fn bias_forces(model: &Model, q: &DVec, v: &DVec) -> DVec {
    rnea(model, q, v, &DVec::zeros(model.nv))
}
