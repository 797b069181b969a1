//! Configuration-space Lie arithmetic.
//!
//! The configuration vector `q` lives on a product manifold (flat slices for
//! revolute/prismatic joints, unit quaternions for spherical/free joints);
//! tangent vectors have `nv` entries. These functions apply each joint's
//! retraction / inverse retraction over the whole model.

use kinet_math::DVec;
use kinet_model::Model;

/// Retraction over the whole configuration: `q_out = q ⊕ dq`.
///
/// `dq` has `nv` entries. Quaternion slices are renormalized.
pub fn integrate(model: &Model, q: &DVec, dq: &DVec, q_out: &mut DVec) {
    for (j, joint) in model.joints.iter().enumerate() {
        let qo = model.q_offsets[j];
        let vo = model.v_offsets[j];
        joint.integrate(
            &q.as_slice()[qo..qo + joint.nq()],
            &dq.as_slice()[vo..vo + joint.nv()],
            &mut q_out.as_mut_slice()[qo..qo + joint.nq()],
        );
    }
}

/// Inverse retraction over the whole configuration: `dq_out = q1 ⊖ q0`.
pub fn difference(model: &Model, q0: &DVec, q1: &DVec, dq_out: &mut DVec) {
    for (j, joint) in model.joints.iter().enumerate() {
        let qo = model.q_offsets[j];
        let vo = model.v_offsets[j];
        joint.difference(
            &q0.as_slice()[qo..qo + joint.nq()],
            &q1.as_slice()[qo..qo + joint.nq()],
            &mut dq_out.as_mut_slice()[vo..vo + joint.nv()],
        );
    }
}

/// Renormalize every quaternion slice of `q` in place.
pub fn normalize(model: &Model, q: &mut DVec) {
    for (j, joint) in model.joints.iter().enumerate() {
        let qo = model.q_offsets[j];
        joint.normalize(&mut q.as_mut_slice()[qo..qo + joint.nq()]);
    }
}
