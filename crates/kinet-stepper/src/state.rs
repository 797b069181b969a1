//! Integrator state and tangent-space arithmetic.

use kinet_math::DVec;
use kinet_model::Model;
use kinet_rigid::{difference, integrate};

/// Integrator state: configuration `q` on the model's Lie group and
/// velocity `v` in the tangent space. `q.len() >= v.len()` in general.
#[derive(Debug, Clone)]
pub struct State {
    /// Configuration vector (may contain unit quaternion slices).
    pub q: DVec,
    /// Velocity vector (tangent space).
    pub v: DVec,
}

impl State {
    /// Neutral state for the model: neutral configuration, zero velocity.
    pub fn neutral(model: &Model) -> Self {
        Self {
            q: model.neutral_q(),
            v: model.zero_v(),
        }
    }

    /// Create from explicit configuration and velocity.
    pub fn from_parts(q: DVec, v: DVec) -> Self {
        Self { q, v }
    }

    /// Retraction: `out = self ⊕ delta`. Quaternion slices of the
    /// configuration are renormalized by the per-joint maps.
    pub fn sum(&self, model: &Model, delta: &StateDerivative, out: &mut State) {
        integrate(model, &self.q, &delta.v, &mut out.q);
        out.v.copy_from(&self.v);
        out.v += &delta.a;
    }

    /// Inverse retraction: `out = other ⊖ self` (tangent-space delta).
    pub fn difference(&self, model: &Model, other: &State, out: &mut StateDerivative) {
        difference(model, &self.q, &other.q, &mut out.v);
        out.a.copy_from(&other.v);
        out.a -= &self.v;
    }

    /// Reset to the model's neutral state.
    pub fn set_zero(&mut self, model: &Model) {
        self.q = model.neutral_q();
        self.v.fill(0.0);
    }
}

/// Element of the tangent bundle: a configuration increment `v` and a
/// velocity increment `a`. RK stage slopes have this shape.
#[derive(Debug, Clone)]
pub struct StateDerivative {
    /// Configuration tangent (length nv).
    pub v: DVec,
    /// Velocity increment (length nv).
    pub a: DVec,
}

impl StateDerivative {
    /// Zero derivative sized for the model.
    pub fn zeros(model: &Model) -> Self {
        Self {
            v: DVec::zeros(model.nv),
            a: DVec::zeros(model.nv),
        }
    }

    /// Build from a velocity and an acceleration.
    pub fn from_parts(v: DVec, a: DVec) -> Self {
        Self { v, a }
    }

    /// Zero out both parts in place.
    pub fn set_zero(&mut self) {
        self.v.fill(0.0);
        self.a.fill(0.0);
    }

    /// In-place axpy: `self += scale * other`.
    pub fn sum_in_place(&mut self, other: &StateDerivative, scale: f64) {
        self.v.axpy(scale, &other.v, 1.0);
        self.a.axpy(scale, &other.a, 1.0);
    }

    /// Element-wise division by another derivative (error rescaling).
    pub fn component_div_assign(&mut self, scale: &StateDerivative) {
        self.v.component_div_assign(&scale.v);
        self.a.component_div_assign(&scale.a);
    }

    /// Infinity norm over both parts. NaN components make the whole norm
    /// NaN so the step controller can see them.
    pub fn norm_inf(&self) -> f64 {
        let mut max = 0.0f64;
        for x in self.v.iter().chain(self.a.iter()) {
            if x.is_nan() {
                return f64::NAN;
            }
            max = max.max(x.abs());
        }
        max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kinet_math::{SpatialInertia, SpatialTransform, Vec3};
    use kinet_model::ModelBuilder;

    fn flat_model() -> Model {
        ModelBuilder::new()
            .add_revolute_body(
                "a",
                -1,
                SpatialTransform::identity(),
                Vec3::z(),
                SpatialInertia::point_mass(1.0, Vec3::new(0.0, -0.5, 0.0)),
            )
            .add_prismatic_body(
                "b",
                0,
                SpatialTransform::identity(),
                Vec3::x(),
                SpatialInertia::point_mass(1.0, Vec3::zeros()),
            )
            .build()
    }

    #[test]
    fn sum_then_difference_roundtrip() {
        let model = flat_model();
        let x = State::neutral(&model);
        let delta = StateDerivative::from_parts(
            DVec::from_vec(vec![0.1, -0.2]),
            DVec::from_vec(vec![0.3, 0.4]),
        );

        let mut y = State::neutral(&model);
        x.sum(&model, &delta, &mut y);

        let mut back = StateDerivative::zeros(&model);
        x.difference(&model, &y, &mut back);

        for i in 0..model.nv {
            assert_relative_eq!(back.v[i], delta.v[i], epsilon = 1e-12);
            assert_relative_eq!(back.a[i], delta.a[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn norm_inf_covers_both_parts() {
        let d = StateDerivative::from_parts(
            DVec::from_vec(vec![0.5, -0.25]),
            DVec::from_vec(vec![-3.0, 1.0]),
        );
        assert_relative_eq!(d.norm_inf(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn sum_in_place_accumulates() {
        let mut acc = StateDerivative::from_parts(DVec::zeros(2), DVec::zeros(2));
        let d = StateDerivative::from_parts(
            DVec::from_vec(vec![1.0, 2.0]),
            DVec::from_vec(vec![3.0, 4.0]),
        );
        acc.sum_in_place(&d, 0.5);
        acc.sum_in_place(&d, 0.5);
        assert_relative_eq!(acc.v[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(acc.a[0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn quaternion_sum_renormalizes() {
        let model = ModelBuilder::new()
            .add_spherical_body(
                "ball",
                -1,
                SpatialTransform::identity(),
                SpatialInertia::sphere(1.0, 0.1),
            )
            .build();

        let x = State::neutral(&model);
        let delta = StateDerivative::from_parts(
            DVec::from_vec(vec![0.4, -0.1, 0.2]),
            DVec::zeros(3),
        );
        let mut y = State::neutral(&model);
        x.sum(&model, &delta, &mut y);

        let norm_sq: f64 = y.q.iter().map(|c| c * c).sum();
        assert_relative_eq!(norm_sq, 1.0, epsilon = 1e-12);
    }
}
