//! Kinematic equality constraints with Baumgarte stabilization.
//!
//! A constraint contributes `m` rows to the acceleration-level KKT system
//! assembled by the stage evaluator: a jacobian `J(q)` of shape `m x nv` and
//! a drift `zeta(q, v)` that already folds in the Baumgarte feedback
//! `kp * c + kd * c_dot`.
//!
//! Constraints hold a *weak* back-reference to the model: the simulation
//! driver owns the `Rc<Model>`, and a constraint whose model has been
//! dropped reports [`ConstraintError::ModelExpired`].

pub mod distance;
pub mod joint;
pub mod set;

use std::rc::{Rc, Weak};

use kinet_math::{DMat, DVec};
use kinet_model::Model;
use thiserror::Error;

pub use distance::DistanceConstraint;
pub use joint::JointConstraint;
pub use set::ConstraintSet;

/// Errors surfaced by constraint evaluation.
///
/// `ModelExpired` is fatal for the integration step; every other variant is
/// a recoverable evaluation failure the stepper converts into a rejection.
#[derive(Debug, Error)]
pub enum ConstraintError {
    /// The weak model handle expired or was never attached.
    #[error("model handle expired or unset")]
    ModelExpired,
    /// The constraint has not been attached to a model.
    #[error("constraint not attached to a model")]
    NotAttached,
    /// A named frame does not exist in the model.
    #[error("unknown frame: {0}")]
    UnknownFrame(String),
    /// A named joint does not exist or is unsupported.
    #[error("unknown or unsupported joint: {0}")]
    UnknownJoint(String),
    /// The constraint geometry is degenerate at the current state.
    #[error("degenerate constraint geometry: {0}")]
    Degenerate(String),
    /// A caller-supplied parameter violated a precondition.
    #[error("{0}")]
    BadInput(String),
}

/// A polymorphic equality constraint `c(q) = 0`.
pub trait Constraint {
    /// Attach to a model. Stores a weak handle; ownership stays with the
    /// caller.
    fn attach(&mut self, model: &Rc<Model>);

    /// Drop the model handle.
    fn detach(&mut self);

    /// Number of constraint rows.
    fn dim(&self) -> usize;

    /// Whether this constraint currently contributes rows.
    fn is_enabled(&self) -> bool;

    /// Enable or disable the constraint. Disabling clears the multipliers.
    fn set_enabled(&mut self, enabled: bool);

    /// Baumgarte position/velocity feedback gains (kp, kd).
    fn baumgarte_gains(&self) -> (f64, f64);

    /// Set the Baumgarte gains. Both must be non-negative.
    fn set_baumgarte_gains(&mut self, kp: f64, kd: f64) -> Result<(), ConstraintError>;

    /// Re-capture reference values at the given state and size the internal
    /// buffers. After a successful reset the residual at `(q, v)` is zero.
    fn reset(&mut self, q: &DVec, v: &DVec) -> Result<(), ConstraintError>;

    /// Evaluate `J` and `zeta` at `(q, v)`. Must not mutate reference
    /// values.
    fn compute_jacobian_and_drift(&mut self, q: &DVec, v: &DVec) -> Result<(), ConstraintError>;

    /// Jacobian from the latest `compute_jacobian_and_drift` call, `dim x nv`.
    fn jacobian(&self) -> &DMat;

    /// Drift from the latest `compute_jacobian_and_drift` call, length `dim`.
    fn drift(&self) -> &DVec;

    /// Most recently solved multipliers, length `dim`.
    fn multiplier(&self) -> &DVec;

    /// Store the multipliers solved by the stage evaluator.
    fn set_multiplier(&mut self, lambda: &[f64]);
}

/// Shared bookkeeping embedded in every concrete constraint.
#[derive(Debug)]
pub(crate) struct ConstraintBase {
    pub model: Weak<Model>,
    pub jacobian: DMat,
    pub drift: DVec,
    pub lambda: DVec,
    pub kp: f64,
    pub kd: f64,
    pub enabled: bool,
}

impl ConstraintBase {
    pub fn new() -> Self {
        Self {
            model: Weak::new(),
            jacobian: DMat::zeros(0, 0),
            drift: DVec::zeros(0),
            lambda: DVec::zeros(0),
            kp: 0.0,
            kd: 0.0,
            enabled: true,
        }
    }

    /// Upgrade the weak model handle.
    pub fn model(&self) -> Result<Rc<Model>, ConstraintError> {
        self.model.upgrade().ok_or(ConstraintError::ModelExpired)
    }

    /// Size the jacobian/drift/multiplier buffers for `dim` rows.
    pub fn resize(&mut self, dim: usize, nv: usize) {
        self.jacobian = DMat::zeros(dim, nv);
        self.drift = DVec::zeros(dim);
        self.lambda = DVec::zeros(dim);
    }

    pub fn set_gains(&mut self, kp: f64, kd: f64) -> Result<(), ConstraintError> {
        if kp < 0.0 || kd < 0.0 {
            return Err(ConstraintError::BadInput(
                "Baumgarte gains must be non-negative".to_string(),
            ));
        }
        self.kp = kp;
        self.kd = kd;
        Ok(())
    }
}
