//! Constrained stage evaluation: `(t, q, v, u) -> acceleration`.

use std::rc::{Rc, Weak};

use tracing::debug;

use kinet_constraint::{Constraint, ConstraintError, ConstraintSet};
use kinet_math::{DMat, DVec};
use kinet_model::Model;
use kinet_rigid::{bias_forces, crba};
use kinet_stepper::{DynamicsError, SystemDynamics};

/// Controller callback producing the applied generalized effort `u(t, q, v)`.
pub type Controller = Box<dyn FnMut(f64, &DVec, &DVec) -> DVec>;

/// Evaluates the constrained equations of motion at one integration stage.
///
/// Solves the acceleration-level KKT system
///
/// ```text
/// [ M  Jᵀ ] [ a ]    [ u - b ]
/// [ J  0  ] [ -λ ] = [ -ζ    ]
/// ```
///
/// where `M` and `b` come from the mechanics queries, `J`/`ζ` from the
/// attached constraints (with Baumgarte feedback folded into `ζ`), and the
/// solved multipliers are stored back into the constraints. The evaluation
/// is a pure function of `(t, q, v)`: constraint reference values are never
/// touched.
pub struct StageEvaluator {
    model: Weak<Model>,
    constraints: ConstraintSet,
    controller: Controller,
}

impl StageEvaluator {
    /// Create an evaluator for the model with no constraints and a zero
    /// controller.
    pub fn new(model: &Rc<Model>) -> Self {
        let nv = model.nv;
        Self {
            model: Rc::downgrade(model),
            constraints: ConstraintSet::new(),
            controller: Box::new(move |_t, _q, _v| DVec::zeros(nv)),
        }
    }

    /// Replace the controller.
    pub fn set_controller(&mut self, controller: Controller) {
        self.controller = controller;
    }

    /// Attach a constraint to the evaluator's model and add it to the set.
    pub fn add_constraint(
        &mut self,
        mut constraint: Box<dyn Constraint>,
    ) -> Result<(), ConstraintError> {
        let model = self.model.upgrade().ok_or(ConstraintError::ModelExpired)?;
        constraint.attach(&model);
        self.constraints.add(constraint);
        Ok(())
    }

    /// Access the constraint set (gain tuning, enable/disable).
    pub fn constraints_mut(&mut self) -> &mut ConstraintSet {
        &mut self.constraints
    }

    /// Re-capture every constraint's reference values at `(q, v)`.
    pub fn reset_constraints(&mut self, q: &DVec, v: &DVec) -> Result<(), ConstraintError> {
        self.constraints.reset_all(q, v)
    }
}

impl SystemDynamics for StageEvaluator {
    fn dynamics(&mut self, t: f64, q: &DVec, v: &DVec) -> Result<DVec, DynamicsError> {
        let model = self.model.upgrade().ok_or(DynamicsError::ModelExpired)?;
        let nv = model.nv;

        let u = (self.controller)(t, q, v);
        let mass_matrix = crba(&model, q);
        let bias = bias_forces(&model, q, v);
        let rhs_top = &u - &bias;

        let m_rows = self.constraints.total_dim();
        if m_rows == 0 {
            return mass_matrix
                .lu()
                .solve(&rhs_top)
                .ok_or_else(|| DynamicsError::Evaluation("singular mass matrix".to_string()));
        }

        let (jacobian, drift) = self.constraints.compute(q, v).map_err(|err| match err {
            ConstraintError::ModelExpired => DynamicsError::ModelExpired,
            other => DynamicsError::Evaluation(other.to_string()),
        })?;

        // Assemble the KKT system
        let n = nv + m_rows;
        let mut kkt = DMat::zeros(n, n);
        kkt.view_mut((0, 0), (nv, nv)).copy_from(&mass_matrix);
        kkt.view_mut((0, nv), (nv, m_rows))
            .copy_from(&jacobian.transpose());
        kkt.view_mut((nv, 0), (m_rows, nv)).copy_from(&jacobian);

        let mut rhs = DVec::zeros(n);
        rhs.rows_mut(0, nv).copy_from(&rhs_top);
        rhs.rows_mut(nv, m_rows).copy_from(&(-&drift));

        let solution = kkt.lu().solve(&rhs).ok_or_else(|| {
            debug!("KKT system is singular, surfacing to the stepper");
            DynamicsError::Evaluation("singular KKT system".to_string())
        })?;

        let acceleration = solution.rows(0, nv).into_owned();
        let lambda = -solution.rows(nv, m_rows).into_owned();
        self.constraints.distribute_multipliers(&lambda);

        Ok(acceleration)
    }
}
