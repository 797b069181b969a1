//! Energy accounting for rigid body systems.

use kinet_math::DVec;
use kinet_model::Model;

use crate::compute_kinematics;

/// Compute kinetic energy: 0.5 * v^T * M(q) * v
pub fn kinetic_energy(model: &Model, q: &DVec, v: &DVec) -> f64 {
    let m = crate::crba(model, q);
    0.5 * v.dot(&(&m * v))
}

/// Compute gravitational potential energy.
///
/// PE = -sum_i m_i * g^T * x_com_i
pub fn potential_energy(model: &Model, q: &DVec) -> f64 {
    let kin = compute_kinematics(model, q, &DVec::zeros(model.nv));
    let mut pe = 0.0;

    for (i, body) in model.bodies.iter().enumerate() {
        let mass = body.inertia.mass;
        let com_local = body.inertia.com;

        // Transform CoM to world frame
        let xf = &kin.x_world_to_body[i];
        let com_world = xf.rot.transpose() * com_local + xf.pos;

        pe -= mass * model.gravity.dot(&com_world);
    }

    pe
}

/// Total mechanical energy (kinetic + potential).
pub fn total_energy(model: &Model, q: &DVec, v: &DVec) -> f64 {
    kinetic_energy(model, q, v) + potential_energy(model, q)
}
