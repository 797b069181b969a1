//! World-aligned frame queries: placement, velocity, acceleration, jacobian.
//!
//! All outputs use the local-world-aligned convention: quantities are taken
//! at the frame origin but expressed along world axes. This is the
//! convention constraint rows are written in.

use kinet_math::{DMat, Mat3, SpatialVec, Vec3};
use kinet_model::Model;

use crate::kinematics::Kinematics;

/// World placement of a frame: rotation (frame axes in world coords) and
/// origin position.
#[derive(Debug, Clone, Copy)]
pub struct FramePose {
    /// Rotation from frame to world.
    pub rot: Mat3,
    /// Frame origin in world coordinates.
    pub pos: Vec3,
}

/// Compute the world placement of a frame.
pub fn frame_pose(model: &Model, kin: &Kinematics, frame_idx: usize) -> FramePose {
    let frame = &model.frames[frame_idx];
    if frame.parent < 0 {
        return FramePose {
            rot: frame.rot,
            pos: frame.pos,
        };
    }
    let b = frame.parent as usize;
    let x = &kin.x_world_to_body[b];
    let r_body_to_world = x.rot.transpose();
    FramePose {
        rot: r_body_to_world * frame.rot,
        pos: x.pos + r_body_to_world * frame.pos,
    }
}

/// World-aligned spatial velocity [ω; v] of a frame origin.
pub fn frame_velocity(model: &Model, kin: &Kinematics, frame_idx: usize) -> SpatialVec {
    let frame = &model.frames[frame_idx];
    if frame.parent < 0 {
        return SpatialVec::zero();
    }
    let b = frame.parent as usize;
    let x = &kin.x_world_to_body[b];
    let r_body_to_world = x.rot.transpose();
    let twist = &kin.body_vel[b];
    SpatialVec::new(
        r_body_to_world * twist.ang,
        r_body_to_world * (twist.lin + twist.ang.cross(&frame.pos)),
    )
}

/// World-aligned bias spatial acceleration [α; a] of a frame origin.
///
/// This is the spatial (not classical) acceleration obtained with zero joint
/// accelerations; add ω × v to the linear part for the classical point
/// acceleration.
pub fn frame_spatial_acceleration(model: &Model, kin: &Kinematics, frame_idx: usize) -> SpatialVec {
    let frame = &model.frames[frame_idx];
    if frame.parent < 0 {
        return SpatialVec::zero();
    }
    let b = frame.parent as usize;
    let x = &kin.x_world_to_body[b];
    let r_body_to_world = x.rot.transpose();
    let acc = &kin.body_acc_bias[b];
    SpatialVec::new(
        r_body_to_world * acc.ang,
        r_body_to_world * (acc.lin + acc.ang.cross(&frame.pos)),
    )
}

/// World-aligned frame jacobian, 6 × nv: rows [angular; linear].
///
/// Column `j` is the world-aligned twist of the frame per unit velocity of
/// tangent coordinate `j`, zero for coordinates not on the path to the root.
pub fn frame_jacobian(model: &Model, kin: &Kinematics, frame_idx: usize) -> DMat {
    let mut jac = DMat::zeros(6, model.nv);
    let frame = &model.frames[frame_idx];
    if frame.parent < 0 {
        return jac;
    }

    let p_frame = frame_pose(model, kin, frame_idx).pos;

    let mut b = frame.parent;
    while b >= 0 {
        let bu = b as usize;
        let body = &model.bodies[bu];
        let joint = &model.joints[body.joint_idx];
        let v_idx = model.v_offsets[body.joint_idx];
        let subspace = joint.motion_subspace_matrix();

        for col in 0..joint.nv() {
            let s = SpatialVec::new(
                Vec3::new(subspace[(0, col)], subspace[(1, col)], subspace[(2, col)]),
                Vec3::new(subspace[(3, col)], subspace[(4, col)], subspace[(5, col)]),
            );
            // Twist in world coordinates, referenced at the world origin
            let tw = kin.x_world_to_body[bu].inv_apply_motion(&s);
            let lin = tw.lin + tw.ang.cross(&p_frame);
            for r in 0..3 {
                jac[(r, v_idx + col)] = tw.ang[r];
                jac[(r + 3, v_idx + col)] = lin[r];
            }
        }

        b = body.parent;
    }

    jac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute_kinematics;
    use approx::assert_relative_eq;
    use kinet_math::{DVec, SpatialInertia, SpatialTransform};
    use kinet_model::{Frame, ModelBuilder};

    fn pendulum_with_tip() -> Model {
        ModelBuilder::new()
            .add_revolute_body(
                "link",
                -1,
                SpatialTransform::identity(),
                Vec3::z(),
                SpatialInertia::point_mass(1.0, Vec3::new(0.0, -1.0, 0.0)),
            )
            .add_frame(Frame::at_offset("tip", 0, Vec3::new(0.0, -1.0, 0.0)))
            .build()
    }

    #[test]
    fn tip_placement_follows_rotation() {
        let model = pendulum_with_tip();
        let mut q = model.neutral_q();
        q[0] = std::f64::consts::FRAC_PI_2;
        let kin = compute_kinematics(&model, &q, &model.zero_v());

        // After +90 degrees about Z the tip at (0,-1,0) maps to (1,0,0)
        let tip = model.frame_index("tip").unwrap();
        let pose = frame_pose(&model, &kin, tip);
        assert_relative_eq!(pose.pos.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(pose.pos.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(pose.pos.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn jacobian_times_velocity_matches_frame_velocity() {
        let model = pendulum_with_tip();
        let mut q = model.neutral_q();
        q[0] = 0.4;
        let v = DVec::from_vec(vec![1.3]);
        let kin = compute_kinematics(&model, &q, &v);

        let tip = model.frame_index("tip").unwrap();
        let jac = frame_jacobian(&model, &kin, tip);
        let jv = &jac * &v;
        let vel = frame_velocity(&model, &kin, tip).to_vec6();

        for i in 0..6 {
            assert_relative_eq!(jv[i], vel[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn world_frame_is_inert() {
        let model = ModelBuilder::new()
            .add_revolute_body(
                "link",
                -1,
                SpatialTransform::identity(),
                Vec3::z(),
                SpatialInertia::point_mass(1.0, Vec3::new(0.0, -1.0, 0.0)),
            )
            .add_frame(Frame::at_offset("anchor", -1, Vec3::new(1.0, 2.0, 3.0)))
            .build();

        let kin = compute_kinematics(&model, &model.neutral_q(), &model.zero_v());
        let anchor = model.frame_index("anchor").unwrap();

        let pose = frame_pose(&model, &kin, anchor);
        assert_relative_eq!(pose.pos, Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-12);
        assert_relative_eq!(
            frame_velocity(&model, &kin, anchor).to_vec6().norm(),
            0.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            frame_jacobian(&model, &kin, anchor).norm(),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn frame_velocity_finite_difference() {
        // Compare the analytic frame velocity against a finite difference of
        // the frame position along the trajectory q(t) = q0 + t*v.
        let model = pendulum_with_tip();
        let mut q = model.neutral_q();
        q[0] = 0.3;
        let v = DVec::from_vec(vec![0.9]);
        let tip = model.frame_index("tip").unwrap();

        let h = 1e-7;
        let kin0 = compute_kinematics(&model, &q, &v);
        let mut q1 = q.clone();
        crate::integrate(&model, &q, &(&v * h), &mut q1);
        let kin1 = compute_kinematics(&model, &q1, &v);

        let p0 = frame_pose(&model, &kin0, tip).pos;
        let p1 = frame_pose(&model, &kin1, tip).pos;
        let fd = (p1 - p0) / h;
        let vel = frame_velocity(&model, &kin0, tip).lin;

        assert_relative_eq!(fd.x, vel.x, epsilon = 1e-5);
        assert_relative_eq!(fd.y, vel.y, epsilon = 1e-5);
        assert_relative_eq!(fd.z, vel.z, epsilon = 1e-5);
    }
}
