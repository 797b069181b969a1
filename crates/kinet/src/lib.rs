//! kinet — rigid-body simulation kernel.
//!
//! This is the umbrella crate: it re-exports the core types from the
//! sub-crates and provides the `Simulator` driver that wires the adaptive
//! stepper, the constrained stage evaluator, and the telemetry recorder
//! into one simulation loop.

pub mod dynamics;

use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, warn};

pub use kinet_constraint::{
    self, Constraint, ConstraintError, ConstraintSet, DistanceConstraint, JointConstraint,
};
pub use kinet_math::{self, DMat, DVec, Vec3, GRAVITY, STEPPER_MIN_TIMESTEP};
pub use kinet_model::{self, Frame, Joint, JointType, Model, ModelBuilder};
pub use kinet_rigid::{
    self, bias_forces, compute_kinematics, crba, frame_pose, rnea, total_energy,
};
pub use kinet_stepper::{
    self, DynamicsError, RungeKuttaDopriStepper, State, StateDerivative, StepperError,
    SystemDynamics,
};
pub use kinet_telemetry::{self, LogData, TelemetryData, TelemetryError, TelemetryRecorder};

pub use dynamics::{Controller, StageEvaluator};

/// Driver-level failure.
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// A caller-supplied argument violated a precondition.
    #[error("bad input: {0}")]
    BadInput(String),
    /// Fatal stepper failure.
    #[error(transparent)]
    Stepper(#[from] StepperError),
    /// Telemetry failure.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// Constraint failure outside the integration loop.
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
    /// The stepper rejected too many steps in a row.
    #[error("integration stalled after {0} consecutive step rejections")]
    Stalled(usize),
}

/// Main simulation driver.
///
/// Owns the model, the stepper, the stage evaluator, and the telemetry
/// pipeline. Each accepted step publishes exactly one telemetry row; the
/// initial state is logged as the first row at `t = 0`.
pub struct Simulator {
    model: Rc<Model>,
    stepper: RungeKuttaDopriStepper,
    evaluator: StageEvaluator,
    telemetry: TelemetryData,
    recorder: TelemetryRecorder,
    state: State,
    q_slots: Vec<kinet_telemetry::FloatSlot>,
    v_slots: Vec<kinet_telemetry::FloatSlot>,
    energy_slot: Option<kinet_telemetry::FloatSlot>,
    steps_slot: Option<kinet_telemetry::IntSlot>,
    t: f64,
    dt: f64,
    accepted_steps: u64,
    rejected_steps: u64,
    max_consecutive_rejections: usize,
    is_initialized: bool,
}

impl Simulator {
    /// Create a simulator for the model with the given stepper tolerances.
    pub fn new(model: Rc<Model>, tol_rel: f64, tol_abs: f64) -> Self {
        let stepper = RungeKuttaDopriStepper::new(&model, tol_rel, tol_abs);
        let evaluator = StageEvaluator::new(&model);
        let state = State::neutral(&model);
        Self {
            model,
            stepper,
            evaluator,
            telemetry: TelemetryData::new(),
            recorder: TelemetryRecorder::new(),
            state,
            q_slots: Vec::new(),
            v_slots: Vec::new(),
            energy_slot: None,
            steps_slot: None,
            t: 0.0,
            dt: 1e-3,
            accepted_steps: 0,
            rejected_steps: 0,
            max_consecutive_rejections: 100,
            is_initialized: false,
        }
    }

    /// Replace the controller producing the applied effort.
    pub fn set_controller(&mut self, controller: Controller) {
        self.evaluator.set_controller(controller);
    }

    /// Attach a constraint.
    pub fn add_constraint(&mut self, constraint: Box<dyn Constraint>) -> Result<(), SimulatorError> {
        self.evaluator.add_constraint(constraint)?;
        Ok(())
    }

    /// Initial timestep proposal for the adaptive stepper.
    pub fn set_initial_timestep(&mut self, dt: f64) {
        self.dt = dt.max(STEPPER_MIN_TIMESTEP);
    }

    /// Abort threshold for consecutive step rejections.
    pub fn set_max_consecutive_rejections(&mut self, limit: usize) {
        self.max_consecutive_rejections = limit;
    }

    /// Register the state signals, reset the constraints at the initial
    /// state, start the telemetry episode, and log the initial row.
    pub fn initialize(
        &mut self,
        q0: DVec,
        v0: DVec,
        time_unit: f64,
    ) -> Result<(), SimulatorError> {
        if q0.len() != self.model.nq || v0.len() != self.model.nv {
            return Err(SimulatorError::BadInput(format!(
                "state dimensions ({}, {}) do not match the model ({}, {})",
                q0.len(),
                v0.len(),
                self.model.nq,
                self.model.nv
            )));
        }

        self.state = State::from_parts(q0, v0);
        self.evaluator
            .reset_constraints(&self.state.q, &self.state.v)?;

        self.q_slots.clear();
        self.v_slots.clear();
        self.steps_slot = Some(self.telemetry.register_variable::<i64>("stepper.steps")?);
        for i in 0..self.model.nq {
            self.q_slots
                .push(self.telemetry.register_variable::<f64>(&format!("state.q{i}"))?);
        }
        for i in 0..self.model.nv {
            self.v_slots
                .push(self.telemetry.register_variable::<f64>(&format!("state.v{i}"))?);
        }
        self.energy_slot = Some(self.telemetry.register_variable::<f64>("state.energy")?);

        self.recorder.initialize(&mut self.telemetry, time_unit)?;

        self.stepper.reset();
        self.t = 0.0;
        self.accepted_steps = 0;
        self.rejected_steps = 0;
        self.is_initialized = true;

        self.publish_row()?;
        Ok(())
    }

    /// Advance the simulation by `duration` seconds.
    pub fn simulate(&mut self, duration: f64) -> Result<(), SimulatorError> {
        if !self.is_initialized {
            return Err(SimulatorError::BadInput(
                "simulator not initialized".to_string(),
            ));
        }

        let t_end = self.t + duration;
        let mut consecutive_rejections = 0usize;

        while self.t < t_end - 1e-12 {
            // Land exactly on t_end rather than leaving a micro-step behind
            let remaining = t_end - self.t;
            let taken = if remaining < self.dt * 1.01 {
                remaining
            } else {
                self.dt
            };
            let mut dt = taken;

            let accepted = self.stepper.try_step(
                &self.model,
                &mut self.evaluator,
                &mut self.state,
                self.t,
                &mut dt,
            )?;

            if accepted {
                self.t += taken;
                self.accepted_steps += 1;
                consecutive_rejections = 0;
                self.publish_row()?;
            } else {
                self.rejected_steps += 1;
                consecutive_rejections += 1;
                debug!(dt, consecutive_rejections, "step rejected");
                if consecutive_rejections > self.max_consecutive_rejections {
                    warn!(
                        rejections = consecutive_rejections,
                        "aborting stalled integration"
                    );
                    return Err(SimulatorError::Stalled(consecutive_rejections));
                }
            }

            self.dt = dt;
        }

        Ok(())
    }

    fn publish_row(&mut self) -> Result<(), SimulatorError> {
        if let Some(slot) = &self.steps_slot {
            slot.set(self.accepted_steps as i64);
        }
        for (i, slot) in self.q_slots.iter().enumerate() {
            slot.set(self.state.q[i]);
        }
        for (i, slot) in self.v_slots.iter().enumerate() {
            slot.set(self.state.v[i]);
        }
        if let Some(slot) = &self.energy_slot {
            slot.set(total_energy(&self.model, &self.state.q, &self.state.v));
        }
        self.recorder.append(self.t)?;
        Ok(())
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.t
    }

    /// Current state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Accepted step count.
    pub fn accepted_steps(&self) -> u64 {
        self.accepted_steps
    }

    /// Rejected step count.
    pub fn rejected_steps(&self) -> u64 {
        self.rejected_steps
    }

    /// The model driven by this simulator.
    pub fn model(&self) -> &Rc<Model> {
        &self.model
    }

    /// Access the evaluator (constraints, controller).
    pub fn evaluator_mut(&mut self) -> &mut StageEvaluator {
        &mut self.evaluator
    }

    /// Parse the in-memory telemetry into columnar log data.
    pub fn get_log(&self) -> Result<LogData, SimulatorError> {
        Ok(self.recorder.get_log()?)
    }

    /// Write the telemetry log to a file.
    pub fn write_log<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), SimulatorError> {
        Ok(self.recorder.write_log(path)?)
    }
}
