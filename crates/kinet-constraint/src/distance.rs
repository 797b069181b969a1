//! Distance constraint between two frames.

use std::rc::Rc;

use kinet_math::{DVec, Vec3};
use kinet_model::Model;
use kinet_rigid::{
    compute_kinematics, frame_jacobian, frame_pose, frame_spatial_acceleration, frame_velocity,
};

use crate::{Constraint, ConstraintBase, ConstraintError};

/// Holds two frames at a fixed distance: `c(q) = |p_A - p_B| - d_ref = 0`.
///
/// The reference distance is either supplied explicitly with
/// [`DistanceConstraint::set_reference_distance`] (in which case it is
/// preserved across `reset`) or captured from the current geometry when
/// `reset` runs.
pub struct DistanceConstraint {
    base: ConstraintBase,
    frame_names: [String; 2],
    frame_indices: Option<[usize; 2]>,
    /// Explicit reference distance, if the user supplied one.
    distance_ref_user: Option<f64>,
    /// Effective reference distance for the current episode.
    distance_ref: f64,
}

impl DistanceConstraint {
    /// Create a distance constraint between two named frames.
    pub fn new(first_frame: &str, second_frame: &str) -> Self {
        Self {
            base: ConstraintBase::new(),
            frame_names: [first_frame.to_string(), second_frame.to_string()],
            frame_indices: None,
            distance_ref_user: None,
            distance_ref: 0.0,
        }
    }

    /// Names of the two constrained frames.
    pub fn frame_names(&self) -> &[String; 2] {
        &self.frame_names
    }

    /// Set an explicit reference distance. Must be non-negative. The value
    /// survives `reset`.
    pub fn set_reference_distance(&mut self, distance_ref: f64) -> Result<(), ConstraintError> {
        if distance_ref < 0.0 {
            return Err(ConstraintError::BadInput(
                "the reference distance must be non-negative".to_string(),
            ));
        }
        self.distance_ref_user = Some(distance_ref);
        self.distance_ref = distance_ref;
        Ok(())
    }

    /// Current effective reference distance.
    pub fn reference_distance(&self) -> f64 {
        self.distance_ref
    }

    fn resolve_frames(&self, model: &Model) -> Result<[usize; 2], ConstraintError> {
        let mut indices = [0usize; 2];
        for (i, name) in self.frame_names.iter().enumerate() {
            indices[i] = model
                .frame_index(name)
                .ok_or_else(|| ConstraintError::UnknownFrame(name.clone()))?;
        }
        Ok(indices)
    }
}

impl Constraint for DistanceConstraint {
    fn attach(&mut self, model: &Rc<Model>) {
        self.base.model = Rc::downgrade(model);
        self.frame_indices = None;
    }

    fn detach(&mut self) {
        self.base.model = std::rc::Weak::new();
        self.frame_indices = None;
    }

    fn dim(&self) -> usize {
        1
    }

    fn is_enabled(&self) -> bool {
        self.base.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.base.enabled = enabled;
        if !enabled {
            self.base.lambda.fill(0.0);
        }
    }

    fn baumgarte_gains(&self) -> (f64, f64) {
        (self.base.kp, self.base.kd)
    }

    fn set_baumgarte_gains(&mut self, kp: f64, kd: f64) -> Result<(), ConstraintError> {
        self.base.set_gains(kp, kd)
    }

    fn reset(&mut self, q: &DVec, v: &DVec) -> Result<(), ConstraintError> {
        let model = self.base.model()?;
        let indices = self.resolve_frames(&model)?;
        self.frame_indices = Some(indices);
        self.base.resize(1, model.nv);

        // Capture the current distance as reference unless the user pinned one
        let kin = compute_kinematics(&model, q, v);
        let delta =
            frame_pose(&model, &kin, indices[0]).pos - frame_pose(&model, &kin, indices[1]).pos;
        self.distance_ref = match self.distance_ref_user {
            Some(d) => d,
            None => delta.norm(),
        };

        Ok(())
    }

    fn compute_jacobian_and_drift(&mut self, q: &DVec, v: &DVec) -> Result<(), ConstraintError> {
        let model = self.base.model()?;
        let indices = self.frame_indices.ok_or(ConstraintError::NotAttached)?;

        let kin = compute_kinematics(&model, q, v);

        // Direction between frames
        let delta_position = frame_pose(&model, &kin, indices[0]).pos
            - frame_pose(&model, &kin, indices[1]).pos;
        let delta_position_norm = delta_position.norm();
        if delta_position_norm < 1e-12 {
            return Err(ConstraintError::Degenerate(
                "coincident frames in distance constraint".to_string(),
            ));
        }
        let direction = delta_position / delta_position_norm;

        // Relative world-aligned velocity between frames
        let vel_a = frame_velocity(&model, &kin, indices[0]);
        let vel_b = frame_velocity(&model, &kin, indices[1]);
        let delta_velocity: Vec3 = vel_a.lin - vel_b.lin;

        // Jacobian row: u . (J_A - J_B), translational rows
        let jac_a = frame_jacobian(&model, &kin, indices[0]);
        let jac_b = frame_jacobian(&model, &kin, indices[1]);
        for col in 0..model.nv {
            let mut val = 0.0;
            for r in 0..3 {
                val += direction[r] * (jac_a[(r + 3, col)] - jac_b[(r + 3, col)]);
            }
            self.base.jacobian[(0, col)] = val;
        }

        // Drift: classical relative acceleration projected on the direction
        let mut acc = [Vec3::zeros(); 2];
        for (i, &frame_idx) in indices.iter().enumerate() {
            let spatial = frame_spatial_acceleration(&model, &kin, frame_idx);
            let vel = frame_velocity(&model, &kin, frame_idx);
            acc[i] = spatial.lin + vel.ang.cross(&vel.lin);
        }
        self.base.drift[0] = direction.dot(&(acc[0] - acc[1]));

        /* dDir.T * (dp_A - dp_B) =
               [(dp_A - dp_B)^2 - (dir.T * (dp_A - dp_B))^2] / norm(p_A - p_B) */
        let delta_velocity_proj = delta_velocity.dot(&direction);
        self.base.drift[0] += (delta_velocity.norm_squared() - delta_velocity_proj.powi(2))
            / delta_position_norm;

        // Baumgarte stabilization drift
        self.base.drift[0] += self.base.kp * (delta_position_norm - self.distance_ref)
            + self.base.kd * delta_velocity_proj;

        Ok(())
    }

    fn jacobian(&self) -> &kinet_math::DMat {
        &self.base.jacobian
    }

    fn drift(&self) -> &DVec {
        &self.base.drift
    }

    fn multiplier(&self) -> &DVec {
        &self.base.lambda
    }

    fn set_multiplier(&mut self, lambda: &[f64]) {
        self.base.lambda.as_mut_slice().copy_from_slice(lambda);
    }
}
