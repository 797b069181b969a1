//! Joint-locking constraint.

use std::rc::Rc;

use kinet_math::DVec;
use kinet_model::{JointType, Model};

use crate::{Constraint, ConstraintBase, ConstraintError};

/// Holds a single-DOF joint at a reference position:
/// `c(q) = q_j - q_ref = 0`.
///
/// The jacobian row is constant (a row of the identity), so the drift
/// reduces to the Baumgarte feedback terms. The reference position is
/// captured at `reset` unless one was supplied explicitly.
pub struct JointConstraint {
    base: ConstraintBase,
    joint_name: String,
    /// (q_offset, v_offset) of the locked joint, resolved at reset.
    offsets: Option<(usize, usize)>,
    position_ref_user: Option<f64>,
    position_ref: f64,
}

impl JointConstraint {
    /// Create a constraint locking the named joint.
    pub fn new(joint_name: &str) -> Self {
        Self {
            base: ConstraintBase::new(),
            joint_name: joint_name.to_string(),
            offsets: None,
            position_ref_user: None,
            position_ref: 0.0,
        }
    }

    /// Name of the locked joint.
    pub fn joint_name(&self) -> &str {
        &self.joint_name
    }

    /// Set an explicit reference position. The value survives `reset`.
    pub fn set_reference_position(&mut self, position_ref: f64) {
        self.position_ref_user = Some(position_ref);
        self.position_ref = position_ref;
    }

    /// Current effective reference position.
    pub fn reference_position(&self) -> f64 {
        self.position_ref
    }

    fn resolve_joint(&self, model: &Model) -> Result<(usize, usize), ConstraintError> {
        // The joint is addressed through the body it drives
        let body = model
            .bodies
            .iter()
            .find(|b| b.name == self.joint_name)
            .ok_or_else(|| ConstraintError::UnknownJoint(self.joint_name.clone()))?;
        let joint = &model.joints[body.joint_idx];
        match joint.joint_type {
            JointType::Revolute | JointType::Prismatic => Ok((
                model.q_offsets[body.joint_idx],
                model.v_offsets[body.joint_idx],
            )),
            _ => Err(ConstraintError::UnknownJoint(format!(
                "{} is not a single-DOF joint",
                self.joint_name
            ))),
        }
    }
}

impl Constraint for JointConstraint {
    fn attach(&mut self, model: &Rc<Model>) {
        self.base.model = Rc::downgrade(model);
        self.offsets = None;
    }

    fn detach(&mut self) {
        self.base.model = std::rc::Weak::new();
        self.offsets = None;
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

    fn reset(&mut self, q: &DVec, _v: &DVec) -> Result<(), ConstraintError> {
        let model = self.base.model()?;
        let (q_off, v_off) = self.resolve_joint(&model)?;
        self.offsets = Some((q_off, v_off));
        self.base.resize(1, model.nv);

        self.position_ref = match self.position_ref_user {
            Some(p) => p,
            None => q[q_off],
        };

        // Constant jacobian row
        self.base.jacobian[(0, v_off)] = 1.0;

        Ok(())
    }

    fn compute_jacobian_and_drift(&mut self, q: &DVec, v: &DVec) -> Result<(), ConstraintError> {
        let _model = self.base.model()?;
        let (q_off, v_off) = self.offsets.ok_or(ConstraintError::NotAttached)?;

        self.base.drift[0] =
            self.base.kp * (q[q_off] - self.position_ref) + self.base.kd * v[v_off];

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
