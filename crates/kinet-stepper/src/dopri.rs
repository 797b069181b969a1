//! Adaptive Dormand-Prince 5(4) stepper with FSAL and step control.

use tracing::debug;

use kinet_math::STEPPER_MIN_TIMESTEP;
use kinet_model::Model;

use crate::state::{State, StateDerivative};
use crate::tableau::{A, C, E, MAX_FACTOR, MIN_FACTOR, SAFETY, STAGES, STEPPER_ORDER};
use crate::{DynamicsError, StepperError, SystemDynamics};

/// Embedded Runge-Kutta 5(4) stepper with Dormand-Prince coefficients.
///
/// `try_step` advances the state by one adaptive step: on acceptance the
/// state holds the 5th-order solution and `dt` the next proposed step; on
/// rejection the state is untouched and `dt` has been reduced.
///
/// The stepper is *fresh* after construction or `reset`, and *armed* once
/// the first stage slope is known; acceptance preserves the armed slope via
/// the first-same-as-last property, so each subsequent step costs six
/// dynamics evaluations instead of seven.
pub struct RungeKuttaDopriStepper {
    tol_rel: f64,
    tol_abs: f64,
    ki: Vec<StateDerivative>,
    stage_state: State,
    candidate: State,
    state_increment: StateDerivative,
    other_solution: State,
    error: StateDerivative,
    scale: StateDerivative,
    armed: bool,
}

impl RungeKuttaDopriStepper {
    /// Create a stepper for the given model with relative/absolute
    /// tolerances. Setting a tolerance to zero (or below machine epsilon)
    /// disables that error criterion.
    pub fn new(model: &Model, tol_rel: f64, tol_abs: f64) -> Self {
        Self {
            tol_rel,
            tol_abs,
            ki: (0..STAGES).map(|_| StateDerivative::zeros(model)).collect(),
            stage_state: State::neutral(model),
            candidate: State::neutral(model),
            state_increment: StateDerivative::zeros(model),
            other_solution: State::neutral(model),
            error: StateDerivative::zeros(model),
            scale: StateDerivative::zeros(model),
            armed: false,
        }
    }

    /// Forget the cached first slope (back to the fresh state). Call after
    /// any external discontinuity in state or dynamics.
    pub fn reset(&mut self) {
        self.armed = false;
    }

    /// Attempt one integration step of size `dt` from time `t`.
    ///
    /// Returns `Ok(true)` and updates `state` and `dt` on acceptance;
    /// returns `Ok(false)` with `state` unchanged and `dt` reduced on
    /// rejection. Only an expired model handle is fatal.
    pub fn try_step(
        &mut self,
        model: &Model,
        f: &mut dyn SystemDynamics,
        state: &mut State,
        t: f64,
        dt: &mut f64,
    ) -> Result<bool, StepperError> {
        // First stage slope; kept across steps once armed (FSAL)
        if !self.armed {
            match f.dynamics(t, &state.q, &state.v) {
                Ok(a) => {
                    self.ki[0].v.copy_from(&state.v);
                    self.ki[0].a = a;
                    self.armed = true;
                }
                Err(err) => return self.handle_dynamics_failure(err, dt),
            }
        }

        let h = *dt;

        // Remaining stages. The last stage state coincides with the
        // candidate solution because the last tableau row equals B.
        for i in 1..STAGES {
            self.state_increment.set_zero();
            for j in 0..i {
                if A[i][j] != 0.0 {
                    self.state_increment.sum_in_place(&self.ki[j], h * A[i][j]);
                }
            }
            state.sum(model, &self.state_increment, &mut self.stage_state);

            match f.dynamics(t + C[i] * h, &self.stage_state.q, &self.stage_state.v) {
                Ok(a) => {
                    self.ki[i].v.copy_from(&self.stage_state.v);
                    self.ki[i].a = a;
                }
                Err(err) => return self.handle_dynamics_failure(err, dt),
            }
        }
        self.candidate.q.copy_from(&self.stage_state.q);
        self.candidate.v.copy_from(&self.stage_state.v);

        let error = self.compute_error(model, h);
        let accepted = adjust_step(error, dt);

        if accepted {
            // FSAL: the slope at the accepted solution becomes k1
            self.ki.swap(0, STAGES - 1);
            state.q.copy_from(&self.candidate.q);
            state.v.copy_from(&self.candidate.v);
        }

        Ok(accepted)
    }

    /// Step-control error of the candidate solution against the embedded
    /// 4th-order solution: `min` of the absolute and relative criteria, so
    /// a disabled tolerance never dominates.
    fn compute_error(&mut self, model: &Model, dt: f64) -> f64 {
        // Embedded comparison point: candidate retracted along the error
        // coefficients, so the tangent gap is the local error estimate
        self.state_increment.set_zero();
        for i in 0..STAGES {
            if E[i] != 0.0 {
                self.state_increment.sum_in_place(&self.ki[i], dt * E[i]);
            }
        }
        self.candidate
            .sum(model, &self.state_increment, &mut self.other_solution);

        // Tangent-space error between the two solutions
        self.candidate
            .difference(model, &self.other_solution, &mut self.error);

        let mut error_abs_norm = f64::INFINITY;
        let mut error_rel_norm = f64::INFINITY;
        if self.tol_abs > f64::EPSILON {
            error_abs_norm = self.error.norm_inf() / self.tol_abs;
        }
        if self.tol_rel > f64::EPSILON {
            // Rescale by the tangent magnitude of the accepted state
            self.other_solution.set_zero(model);
            self.candidate
                .difference(model, &self.other_solution, &mut self.scale);
            self.error.component_div_assign(&self.scale);
            error_rel_norm = self.error.norm_inf() / self.tol_rel;
        }

        error_abs_norm.min(error_rel_norm)
    }

    fn handle_dynamics_failure(
        &mut self,
        err: DynamicsError,
        dt: &mut f64,
    ) -> Result<bool, StepperError> {
        match err {
            DynamicsError::ModelExpired => Err(StepperError::ModelExpired),
            DynamicsError::Evaluation(msg) => {
                // Recoverable: treat like an error estimate >= 1 and shrink
                debug!(error = %msg, "dynamics evaluation failed, rejecting step");
                *dt = (*dt * MIN_FACTOR).max(STEPPER_MIN_TIMESTEP);
                Ok(false)
            }
        }
    }
}

/// Timestep adjustment policy. Returns whether the step is accepted and
/// updates `dt` in place.
fn adjust_step(error: f64, dt: &mut f64) -> bool {
    // Make sure the error is defined, otherwise rely on a simple heuristic
    if error.is_nan() {
        *dt *= 0.1;
        return false;
    }

    if error < 1.0 {
        // Only increase if the error is sufficiently small
        if error < SAFETY.powi(STEPPER_ORDER) {
            // Prevent numeric rounding error when close to zero
            let new_error = error.max((MAX_FACTOR / SAFETY).powi(-STEPPER_ORDER));
            *dt *= SAFETY * new_error.powf(-1.0 / f64::from(STEPPER_ORDER));
        }
        true
    } else {
        *dt *= (SAFETY * error.powf(-1.0 / f64::from(STEPPER_ORDER - 2))).max(MIN_FACTOR);
        *dt = dt.max(STEPPER_MIN_TIMESTEP);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kinet_math::{DVec, SpatialInertia, SpatialTransform, Vec3};
    use kinet_model::{Model, ModelBuilder};

    /// One prismatic DOF along x with no gravity: a flat scalar state the
    /// tests drive with hand-written dynamics.
    fn scalar_model() -> Model {
        ModelBuilder::new()
            .gravity(Vec3::zeros())
            .add_prismatic_body(
                "slider",
                -1,
                SpatialTransform::identity(),
                Vec3::x(),
                SpatialInertia::point_mass(1.0, Vec3::zeros()),
            )
            .build()
    }

    /// Harmonic oscillator x'' = -x.
    fn oscillator(_t: f64, q: &DVec, _v: &DVec) -> Result<DVec, DynamicsError> {
        Ok(DVec::from_vec(vec![-q[0]]))
    }

    #[test]
    fn harmonic_oscillator_full_period() {
        let model = scalar_model();
        let mut stepper = RungeKuttaDopriStepper::new(&model, 1e-8, 1e-10);
        let mut state = State::from_parts(DVec::from_vec(vec![1.0]), DVec::zeros(1));

        let t_end = 2.0 * std::f64::consts::PI;
        let mut t = 0.0;
        let mut dt: f64 = 1e-3;
        let mut accepted_steps = 0usize;
        let mut f = oscillator;

        while t < t_end - 1e-12 {
            let mut step = dt.min(t_end - t);
            let accepted = stepper
                .try_step(&model, &mut f, &mut state, t, &mut step)
                .unwrap();
            if accepted {
                t += dt.min(t_end - t);
                accepted_steps += 1;
            }
            dt = step;
        }

        assert!((state.q[0] - 1.0).abs() < 1e-6, "x(T) = {}", state.q[0]);
        assert!(state.v[0].abs() < 1e-6, "v(T) = {}", state.v[0]);
        assert!(
            accepted_steps >= 40,
            "only {} accepted steps",
            accepted_steps
        );
    }

    #[test]
    fn nan_dynamics_rejects_and_shrinks_dt_by_ten() {
        let model = scalar_model();
        let mut stepper = RungeKuttaDopriStepper::new(&model, 1e-8, 1e-10);
        let mut state = State::from_parts(DVec::from_vec(vec![1.0]), DVec::zeros(1));
        let q_before = state.q[0];

        let mut f = |_t: f64, _q: &DVec, _v: &DVec| -> Result<DVec, DynamicsError> {
            Ok(DVec::from_vec(vec![f64::NAN]))
        };

        let mut dt = 1e-3;
        let accepted = stepper
            .try_step(&model, &mut f, &mut state, 0.0, &mut dt)
            .unwrap();

        assert!(!accepted);
        assert_relative_eq!(dt, 1e-4, epsilon = 1e-15);
        assert_eq!(state.q[0], q_before);
    }

    #[test]
    fn evaluation_error_rejects_and_shrinks_dt() {
        let model = scalar_model();
        let mut stepper = RungeKuttaDopriStepper::new(&model, 1e-8, 1e-10);
        let mut state = State::from_parts(DVec::from_vec(vec![1.0]), DVec::zeros(1));

        let mut f = |_t: f64, _q: &DVec, _v: &DVec| -> Result<DVec, DynamicsError> {
            Err(DynamicsError::Evaluation("singular system".to_string()))
        };

        let mut dt = 1e-3;
        let accepted = stepper
            .try_step(&model, &mut f, &mut state, 0.0, &mut dt)
            .unwrap();

        assert!(!accepted);
        assert!(dt < 1e-3);
    }

    #[test]
    fn expired_model_is_fatal() {
        let model = scalar_model();
        let mut stepper = RungeKuttaDopriStepper::new(&model, 1e-8, 1e-10);
        let mut state = State::from_parts(DVec::from_vec(vec![1.0]), DVec::zeros(1));

        let mut f =
            |_t: f64, _q: &DVec, _v: &DVec| -> Result<DVec, DynamicsError> {
                Err(DynamicsError::ModelExpired)
            };

        let mut dt = 1e-3;
        let result = stepper.try_step(&model, &mut f, &mut state, 0.0, &mut dt);
        assert!(matches!(result, Err(StepperError::ModelExpired)));
    }

    #[test]
    fn fsal_saves_one_evaluation_per_accepted_step() {
        let model = scalar_model();
        let mut stepper = RungeKuttaDopriStepper::new(&model, 1e-6, 1e-8);
        let mut state = State::from_parts(DVec::from_vec(vec![1.0]), DVec::zeros(1));

        let mut evals = 0usize;
        let mut f = |_t: f64, q: &DVec, _v: &DVec| -> Result<DVec, DynamicsError> {
            evals += 1;
            Ok(DVec::from_vec(vec![-q[0]]))
        };

        let mut dt = 1e-3;
        let mut t = 0.0;

        for _ in 0..3 {
            let mut step = dt;
            let accepted = stepper
                .try_step(&model, &mut f, &mut state, t, &mut step)
                .unwrap();
            assert!(accepted);
            t += dt;
            dt = step;
        }

        // 7 evaluations for the first step, 6 for each one after
        assert_eq!(evals, 7 + 6 + 6);
    }

    #[test]
    fn reset_forgets_cached_slope() {
        let model = scalar_model();
        let mut stepper = RungeKuttaDopriStepper::new(&model, 1e-6, 1e-8);
        let mut state = State::from_parts(DVec::from_vec(vec![1.0]), DVec::zeros(1));

        let evals = std::cell::Cell::new(0usize);
        let mut f = |_t: f64, q: &DVec, _v: &DVec| -> Result<DVec, DynamicsError> {
            evals.set(evals.get() + 1);
            Ok(DVec::from_vec(vec![-q[0]]))
        };

        let mut dt = 1e-3;
        stepper
            .try_step(&model, &mut f, &mut state, 0.0, &mut dt)
            .unwrap();
        assert_eq!(evals.get(), 7);

        stepper.reset();
        let mut dt2 = 1e-3;
        stepper
            .try_step(&model, &mut f, &mut state, 0.0, &mut dt2)
            .unwrap();
        assert_eq!(evals.get(), 14);
    }

    #[test]
    fn global_error_scales_as_fifth_order() {
        // Integrate the oscillator over a fixed horizon with uniform steps;
        // halving the step size must shrink the global error by about 2^5.
        let model = scalar_model();
        let t_end = 1.0;

        let run = |n_steps: usize| -> f64 {
            let h = t_end / n_steps as f64;
            // Huge tolerances so every uniform step is accepted
            let mut stepper = RungeKuttaDopriStepper::new(&model, 0.0, 1e12);
            let mut state = State::from_parts(DVec::from_vec(vec![1.0]), DVec::zeros(1));
            let mut f = oscillator;
            for k in 0..n_steps {
                let mut dt = h;
                let accepted = stepper
                    .try_step(&model, &mut f, &mut state, k as f64 * h, &mut dt)
                    .unwrap();
                assert!(accepted);
            }
            (state.q[0] - t_end.cos()).abs()
        };

        let err_coarse = run(10);
        let err_fine = run(20);

        assert!(
            err_coarse / err_fine > 16.0,
            "convergence ratio {} below 5th order",
            err_coarse / err_fine
        );
    }
}
