//! Aggregation of constraints into one stacked system.

use kinet_math::{DMat, DVec};
use tracing::warn;

use crate::{Constraint, ConstraintError};

/// An ordered collection of constraints, stacked row-wise.
///
/// The stage evaluator owns one of these and asks it for the concatenated
/// `(J, zeta)` at every integration stage; disabled constraints contribute
/// no rows.
#[derive(Default)]
pub struct ConstraintSet {
    constraints: Vec<Box<dyn Constraint>>,
}

impl ConstraintSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            constraints: Vec::new(),
        }
    }

    /// Add a constraint. Insertion order determines row order.
    pub fn add(&mut self, constraint: Box<dyn Constraint>) {
        self.constraints.push(constraint);
    }

    /// Number of constraints (enabled or not).
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Total number of active constraint rows.
    pub fn total_dim(&self) -> usize {
        self.constraints
            .iter()
            .filter(|c| c.is_enabled())
            .map(|c| c.dim())
            .sum()
    }

    /// Access a constraint by insertion index.
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Box<dyn Constraint>> {
        self.constraints.get_mut(idx)
    }

    /// Reset every constraint at the given state.
    pub fn reset_all(&mut self, q: &DVec, v: &DVec) -> Result<(), ConstraintError> {
        for constraint in &mut self.constraints {
            constraint.reset(q, v)?;
        }
        Ok(())
    }

    /// Evaluate and stack the jacobians and drifts of all enabled
    /// constraints at `(q, v)`.
    pub fn compute(&mut self, q: &DVec, v: &DVec) -> Result<(DMat, DVec), ConstraintError> {
        let nv = v.len();
        let total = self.total_dim();
        let mut jacobian = DMat::zeros(total, nv);
        let mut drift = DVec::zeros(total);
        let mut row = 0usize;

        for constraint in &mut self.constraints {
            if !constraint.is_enabled() {
                continue;
            }
            if let Err(err) = constraint.compute_jacobian_and_drift(q, v) {
                warn!(error = %err, "constraint evaluation failed");
                return Err(err);
            }
            let jac = constraint.jacobian();
            for r in 0..constraint.dim() {
                for c in 0..nv {
                    jacobian[(row + r, c)] = jac[(r, c)];
                }
                drift[row + r] = constraint.drift()[r];
            }
            row += constraint.dim();
        }

        Ok((jacobian, drift))
    }

    /// Scatter the stacked multipliers back into the constraints, in row
    /// order.
    pub fn distribute_multipliers(&mut self, lambda: &DVec) {
        let mut row = 0usize;
        for constraint in &mut self.constraints {
            if !constraint.is_enabled() {
                continue;
            }
            let dim = constraint.dim();
            constraint.set_multiplier(&lambda.as_slice()[row..row + dim]);
            row += dim;
        }
    }
}
