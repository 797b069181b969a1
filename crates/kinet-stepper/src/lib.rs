//! Adaptive Dormand-Prince 5(4) integration for Lie-group state.
//!
//! The stepper is oblivious to whether the configuration space is flat or
//! carries quaternion components: all state arithmetic goes through the
//! retraction/difference operations of [`State`], which delegate to the
//! model's configuration maps.

pub mod dopri;
pub mod state;
pub mod tableau;

use thiserror::Error;

use kinet_math::DVec;

pub use dopri::RungeKuttaDopriStepper;
pub use state::{State, StateDerivative};

/// Continuous-time dynamics seam: `f(t, q, v) -> acceleration`.
///
/// The stage evaluator implements this; the stepper calls it once per RK
/// stage. Implementations must be pure in `(t, q, v)` and must not mutate
/// any reference values on failure.
pub trait SystemDynamics {
    fn dynamics(&mut self, t: f64, q: &DVec, v: &DVec) -> Result<DVec, DynamicsError>;
}

/// Failure of a dynamics evaluation.
#[derive(Debug, Error)]
pub enum DynamicsError {
    /// The model behind the evaluator is gone. Fatal for the integration.
    #[error("model handle expired or unset")]
    ModelExpired,
    /// Recoverable numeric failure (singular KKT system, degenerate
    /// constraint geometry). The stepper turns this into a step rejection.
    #[error("dynamics evaluation failed: {0}")]
    Evaluation(String),
}

/// Fatal stepper failure. Recoverable evaluation errors never surface here;
/// they become rejections with a reduced timestep.
#[derive(Debug, Error)]
pub enum StepperError {
    #[error("model handle expired or unset")]
    ModelExpired,
}

/// Blanket impl so plain closures can serve as dynamics in tests and simple
/// drivers.
impl<F> SystemDynamics for F
where
    F: FnMut(f64, &DVec, &DVec) -> Result<DVec, DynamicsError>,
{
    fn dynamics(&mut self, t: f64, q: &DVec, v: &DVec) -> Result<DVec, DynamicsError> {
        self(t, q, v)
    }
}
