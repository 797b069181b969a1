//! Integration tests for the kinet simulation kernel.

use std::rc::Rc;

use approx::assert_relative_eq;
use kinet::{
    kinet_math::{SpatialInertia, SpatialTransform},
    total_energy, Constraint, DVec, DistanceConstraint, Frame, JointConstraint, Model,
    ModelBuilder, Simulator, SimulatorError, TelemetryRecorder, Vec3, GRAVITY,
};

/// One prismatic DOF along x with no gravity: the scalar testbed.
fn slider_model() -> Rc<Model> {
    Rc::new(
        ModelBuilder::new()
            .gravity(Vec3::zeros())
            .add_prismatic_body(
                "slider",
                -1,
                SpatialTransform::identity(),
                Vec3::x(),
                SpatialInertia::point_mass(1.0, Vec3::zeros()),
            )
            .add_frame(Frame::at_offset("anchor", -1, Vec3::zeros()))
            .add_frame(Frame::at_offset("mover", 0, Vec3::zeros()))
            .build(),
    )
}

fn pendulum_model() -> Rc<Model> {
    Rc::new(
        ModelBuilder::new()
            .gravity(Vec3::new(0.0, -GRAVITY, 0.0))
            .add_revolute_body(
                "link",
                -1,
                SpatialTransform::identity(),
                Vec3::z(),
                SpatialInertia::point_mass(1.0, Vec3::new(0.0, -0.5, 0.0)),
            )
            .build(),
    )
}

fn double_pendulum_model() -> Rc<Model> {
    let inertia = SpatialInertia::point_mass(1.0, Vec3::new(0.0, -0.5, 0.0));
    Rc::new(
        ModelBuilder::new()
            .gravity(Vec3::new(0.0, -GRAVITY, 0.0))
            .add_revolute_body("link1", -1, SpatialTransform::identity(), Vec3::z(), inertia)
            .add_revolute_body(
                "link2",
                0,
                SpatialTransform::from_translation(Vec3::new(0.0, -1.0, 0.0)),
                Vec3::z(),
                inertia,
            )
            .build(),
    )
}

#[test]
fn harmonic_oscillator_over_one_period() {
    // x'' = -x realized with a unit mass and a spring controller
    let model = slider_model();
    let mut sim = Simulator::new(Rc::clone(&model), 1e-8, 1e-10);
    sim.set_controller(Box::new(|_t, q: &DVec, _v: &DVec| {
        DVec::from_vec(vec![-q[0]])
    }));

    sim.initialize(DVec::from_vec(vec![1.0]), DVec::zeros(1), 1e-6)
        .unwrap();
    sim.simulate(2.0 * std::f64::consts::PI).unwrap();

    assert!(
        (sim.state().q[0] - 1.0).abs() < 1e-6,
        "x(T) = {}",
        sim.state().q[0]
    );
    assert!(sim.state().v[0].abs() < 1e-6, "v(T) = {}", sim.state().v[0]);
    assert!(
        sim.accepted_steps() >= 40,
        "only {} accepted steps",
        sim.accepted_steps()
    );

    // One telemetry row per accepted step plus the initial state, in time
    // order
    let log = sim.get_log().unwrap();
    assert_eq!(log.len() as u64, sim.accepted_steps() + 1);
    assert_eq!(log.timestamps[0], 0);
    for pair in log.timestamps.windows(2) {
        assert!(pair[0] < pair[1], "timestamps out of order: {pair:?}");
    }
}

#[test]
fn distance_constraint_recovers_from_perturbation() {
    let model = slider_model();
    let mut sim = Simulator::new(Rc::clone(&model), 1e-6, 1e-8);

    let mut constraint = DistanceConstraint::new("anchor", "mover");
    constraint.set_reference_distance(1.0).unwrap();
    constraint.set_baumgarte_gains(100.0, 20.0).unwrap();
    sim.add_constraint(Box::new(constraint)).unwrap();

    // Perturb the mover slightly off the reference distance
    sim.initialize(DVec::from_vec(vec![1.01]), DVec::zeros(1), 1e-6)
        .unwrap();
    sim.simulate(1.0).unwrap();

    assert!(
        (sim.state().q[0] - 1.0).abs() < 1e-3,
        "distance after 1s: {}",
        sim.state().q[0]
    );
}

#[test]
fn joint_constraint_holds_pendulum_off_vertical() {
    let model = pendulum_model();
    let mut sim = Simulator::new(Rc::clone(&model), 1e-8, 1e-10);

    let mut lock = JointConstraint::new("link");
    lock.set_baumgarte_gains(400.0, 40.0).unwrap();
    sim.add_constraint(Box::new(lock)).unwrap();

    let mut q0 = model.neutral_q();
    q0[0] = 0.3;
    sim.initialize(q0, model.zero_v(), 1e-6).unwrap();
    sim.simulate(1.0).unwrap();

    assert!(
        (sim.state().q[0] - 0.3).abs() < 1e-3,
        "locked joint drifted to {}",
        sim.state().q[0]
    );
}

#[test]
fn double_pendulum_conserves_energy() {
    let model = double_pendulum_model();
    let mut sim = Simulator::new(Rc::clone(&model), 1e-10, 1e-12);

    let mut q0 = model.neutral_q();
    q0[0] = 0.5;
    q0[1] = 0.3;
    let e0 = total_energy(&model, &q0, &model.zero_v());

    sim.initialize(q0, model.zero_v(), 1e-7).unwrap();
    sim.simulate(2.0).unwrap();

    let e_final = total_energy(&model, &sim.state().q, &sim.state().v);
    assert!(
        (e_final - e0).abs() < 1e-5,
        "energy drift {:.2e} (e0 = {:.6}, e = {:.6})",
        (e_final - e0).abs(),
        e0,
        e_final,
    );

    // The recorded energy column agrees with the final state
    let log = sim.get_log().unwrap();
    let energy_col = log
        .fieldnames
        .iter()
        .position(|n| n == "state.energy")
        .unwrap();
    // Column index into float data: skip time and int columns
    let float_idx = energy_col - 1 - log.int_data.len();
    let logged = *log.float_data[float_idx].last().unwrap();
    assert_relative_eq!(logged, e_final, epsilon = 1e-12);
}

#[test]
fn telemetry_log_round_trips_through_file() {
    let model = pendulum_model();
    let mut sim = Simulator::new(Rc::clone(&model), 1e-6, 1e-8);

    let mut q0 = model.neutral_q();
    q0[0] = 0.2;
    sim.initialize(q0, model.zero_v(), 1e-6).unwrap();
    sim.simulate(0.5).unwrap();

    let path = std::env::temp_dir().join(format!(
        "kinet-integration-{}-pendulum.data",
        std::process::id()
    ));
    sim.write_log(&path).unwrap();
    let from_file = TelemetryRecorder::read_log(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let in_memory = sim.get_log().unwrap();
    assert_eq!(from_file, in_memory);
    assert!(from_file
        .fieldnames
        .iter()
        .any(|name| name == "state.q0"));
}

#[test]
fn divergent_dynamics_stall_the_driver() {
    let model = slider_model();
    let mut sim = Simulator::new(Rc::clone(&model), 1e-8, 1e-10);
    sim.set_controller(Box::new(|_t, _q: &DVec, _v: &DVec| {
        DVec::from_vec(vec![f64::NAN])
    }));
    sim.set_max_consecutive_rejections(10);

    sim.initialize(DVec::zeros(1), DVec::zeros(1), 1e-6).unwrap();
    let result = sim.simulate(1.0);
    assert!(matches!(result, Err(SimulatorError::Stalled(_))));
}

#[test]
fn uninitialized_simulate_is_rejected() {
    let model = slider_model();
    let mut sim = Simulator::new(model, 1e-8, 1e-10);
    assert!(matches!(
        sim.simulate(1.0),
        Err(SimulatorError::BadInput(_))
    ));
}

#[test]
fn mismatched_state_dimensions_are_rejected() {
    let model = pendulum_model();
    let mut sim = Simulator::new(model, 1e-8, 1e-10);
    let result = sim.initialize(DVec::zeros(3), DVec::zeros(1), 1e-6);
    assert!(matches!(result, Err(SimulatorError::BadInput(_))));
}
