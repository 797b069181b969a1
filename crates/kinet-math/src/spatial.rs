//! 6D spatial algebra in Featherstone convention.
//!
//! Spatial quantities are kept as explicit angular/linear `Vec3` pairs
//! rather than packed 6-vectors: the dynamics algorithms only ever touch
//! the two halves separately, and the pair form keeps the cross-product
//! structure visible. `to_vec6` bridges to dense 6x6 work (composite
//! inertia accumulation) where a matrix form is genuinely needed.

use crate::{skew, Mat3, Mat6, Vec3, Vec6};

/// A spatial motion vector (twist, [ω; v]) or force vector (wrench,
/// [τ; f]), stored as its angular and linear halves.
#[derive(Debug, Clone, Copy)]
pub struct SpatialVec {
    /// Angular half (ω or τ).
    pub ang: Vec3,
    /// Linear half (v or f).
    pub lin: Vec3,
}

impl SpatialVec {
    /// Build from angular and linear halves.
    #[inline]
    pub fn new(ang: Vec3, lin: Vec3) -> Self {
        Self { ang, lin }
    }

    /// The zero spatial vector.
    #[inline]
    pub fn zero() -> Self {
        Self {
            ang: Vec3::zeros(),
            lin: Vec3::zeros(),
        }
    }

    /// Pack into a 6-vector, angular half first.
    #[inline]
    pub fn to_vec6(&self) -> Vec6 {
        Vec6::new(
            self.ang.x, self.ang.y, self.ang.z, self.lin.x, self.lin.y, self.lin.z,
        )
    }

    /// Unpack from a 6-vector, angular half first.
    #[inline]
    pub fn from_vec6(v: &Vec6) -> Self {
        Self {
            ang: Vec3::new(v[0], v[1], v[2]),
            lin: Vec3::new(v[3], v[4], v[5]),
        }
    }

    /// Motion-by-motion cross product, used when propagating velocities
    /// and bias accelerations down the tree.
    pub fn cross_motion(&self, m: &SpatialVec) -> SpatialVec {
        SpatialVec {
            ang: self.ang.cross(&m.ang),
            lin: self.ang.cross(&m.lin) + self.lin.cross(&m.ang),
        }
    }

    /// Motion-by-force cross product, used for gyroscopic bias forces.
    pub fn cross_force(&self, f: &SpatialVec) -> SpatialVec {
        SpatialVec {
            ang: self.ang.cross(&f.ang) + self.lin.cross(&f.lin),
            lin: self.ang.cross(&f.lin),
        }
    }

    /// Scalar product of a motion vector with a force vector (power
    /// pairing).
    #[inline]
    pub fn dot(&self, other: &SpatialVec) -> f64 {
        self.ang.dot(&other.ang) + self.lin.dot(&other.lin)
    }
}

impl std::ops::Add for SpatialVec {
    type Output = SpatialVec;
    #[inline]
    fn add(self, rhs: SpatialVec) -> SpatialVec {
        SpatialVec {
            ang: self.ang + rhs.ang,
            lin: self.lin + rhs.lin,
        }
    }
}

impl std::ops::Mul<f64> for SpatialVec {
    type Output = SpatialVec;
    #[inline]
    fn mul(self, rhs: f64) -> SpatialVec {
        SpatialVec {
            ang: self.ang * rhs,
            lin: self.lin * rhs,
        }
    }
}

/// Plücker coordinate transform between two frames.
///
/// `rot` rotates source-frame axes into destination-frame axes; `pos` is
/// the destination origin expressed in the source frame. Motion and force
/// vectors transform covariantly/contravariantly through the two `apply_*`
/// pairs below.
#[derive(Debug, Clone, Copy)]
pub struct SpatialTransform {
    /// Rotation from the source frame to the destination frame.
    pub rot: Mat3,
    /// Destination origin in source-frame coordinates.
    pub pos: Vec3,
}

impl SpatialTransform {
    /// Build from a rotation and a translation.
    pub fn new(rot: Mat3, pos: Vec3) -> Self {
        Self { rot, pos }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rot: Mat3::identity(),
            pos: Vec3::zeros(),
        }
    }

    /// A pure translation.
    pub fn from_translation(pos: Vec3) -> Self {
        Self {
            rot: Mat3::identity(),
            pos,
        }
    }

    /// Chain with a transform applied before this one: the result maps the
    /// inner transform's source frame to this transform's destination.
    pub fn compose(&self, inner: &SpatialTransform) -> SpatialTransform {
        SpatialTransform {
            rot: self.rot * inner.rot,
            pos: inner.pos + inner.rot.tr_mul(&self.pos),
        }
    }

    /// The transform mapping destination back to source.
    pub fn inverse(&self) -> SpatialTransform {
        SpatialTransform {
            rot: self.rot.transpose(),
            pos: -(self.rot * self.pos),
        }
    }

    /// Carry a motion vector from the source frame into the destination
    /// frame.
    pub fn apply_motion(&self, m: &SpatialVec) -> SpatialVec {
        SpatialVec {
            ang: self.rot * m.ang,
            lin: self.rot * (m.lin - self.pos.cross(&m.ang)),
        }
    }

    /// Carry a motion vector from the destination frame back to the
    /// source frame.
    pub fn inv_apply_motion(&self, m: &SpatialVec) -> SpatialVec {
        let ang = self.rot.tr_mul(&m.ang);
        SpatialVec {
            lin: self.rot.tr_mul(&m.lin) + self.pos.cross(&ang),
            ang,
        }
    }

    /// Carry a force vector from the source frame into the destination
    /// frame.
    pub fn apply_force(&self, f: &SpatialVec) -> SpatialVec {
        SpatialVec {
            ang: self.rot * (f.ang - self.pos.cross(&f.lin)),
            lin: self.rot * f.lin,
        }
    }

    /// Carry a force vector from the destination frame back to the source
    /// frame.
    pub fn inv_apply_force(&self, f: &SpatialVec) -> SpatialVec {
        let lin = self.rot.tr_mul(&f.lin);
        SpatialVec {
            ang: self.rot.tr_mul(&f.ang) + self.pos.cross(&lin),
            lin,
        }
    }

    /// Dense 6x6 form acting on packed motion vectors, for composite
    /// inertia accumulation.
    pub fn motion_matrix(&self) -> Mat6 {
        let mut x = Mat6::zeros();
        x.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rot);
        x.fixed_view_mut::<3, 3>(3, 3).copy_from(&self.rot);
        let coupling = -self.rot * skew(&self.pos);
        x.fixed_view_mut::<3, 3>(3, 0).copy_from(&coupling);
        x
    }
}

/// Rigid-body inertia: mass, center of mass in the body frame, and
/// rotational inertia about the center of mass.
#[derive(Debug, Clone, Copy)]
pub struct SpatialInertia {
    /// Body mass.
    pub mass: f64,
    /// Center of mass in body-frame coordinates.
    pub com: Vec3,
    /// Rotational inertia about the center of mass (symmetric 3x3).
    pub inertia: Mat3,
}

impl SpatialInertia {
    /// Build from mass, center of mass, and rotational inertia.
    pub fn new(mass: f64, com: Vec3, inertia: Mat3) -> Self {
        Self { mass, com, inertia }
    }

    /// A point mass at the given body-frame position.
    pub fn point_mass(mass: f64, pos: Vec3) -> Self {
        Self {
            mass,
            com: pos,
            inertia: Mat3::zeros(),
        }
    }

    /// A uniform solid sphere centered at the body origin.
    pub fn sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self {
            mass,
            com: Vec3::zeros(),
            inertia: Mat3::from_diagonal_element(i),
        }
    }

    /// Apply the inertia to a motion vector: momentum for a velocity,
    /// required force for an acceleration.
    ///
    /// Works directly on the pair form: the linear half is the momentum of
    /// the center of mass, and the angular half adds its moment about the
    /// body origin.
    pub fn momentum(&self, m: &SpatialVec) -> SpatialVec {
        let lin = (m.lin + m.ang.cross(&self.com)) * self.mass;
        SpatialVec {
            ang: self.inertia * m.ang + self.com.cross(&lin),
            lin,
        }
    }

    /// Dense 6x6 spatial inertia about the body-frame origin, for
    /// composite-inertia work.
    pub fn to_mat6(&self) -> Mat6 {
        let cx = skew(&self.com);
        let h = cx * self.mass;

        let mut m = Mat6::zeros();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(self.inertia - cx * h));
        m.fixed_view_mut::<3, 3>(0, 3).copy_from(&h);
        m.fixed_view_mut::<3, 3>(3, 0).copy_from(&h.transpose());
        m.fixed_view_mut::<3, 3>(3, 3)
            .copy_from(&(Mat3::identity() * self.mass));
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn motion_cross_of_pure_rotations() {
        let spin_z = SpatialVec::new(Vec3::z(), Vec3::zeros());
        let spin_x = SpatialVec::new(Vec3::x(), Vec3::zeros());
        let result = spin_z.cross_motion(&spin_x);
        assert_relative_eq!(result.ang, Vec3::y(), epsilon = 1e-12);
        assert_relative_eq!(result.lin, Vec3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn vec6_pack_unpack_roundtrip() {
        let v = SpatialVec::new(Vec3::new(1.0, -2.0, 3.0), Vec3::new(-4.0, 5.0, -6.0));
        let back = SpatialVec::from_vec6(&v.to_vec6());
        assert_relative_eq!(back.ang, v.ang);
        assert_relative_eq!(back.lin, v.lin);
    }

    #[test]
    fn translation_shifts_linear_velocity() {
        // A frame one meter along x sees an extra ω x r linear term from a
        // rotation about z at the source origin.
        let xf = SpatialTransform::from_translation(Vec3::x());
        let spin = SpatialVec::new(Vec3::z(), Vec3::zeros());
        let moved = xf.apply_motion(&spin);
        assert_relative_eq!(moved.ang, Vec3::z(), epsilon = 1e-12);
        assert_relative_eq!(moved.lin, Vec3::y(), epsilon = 1e-12);
    }

    #[test]
    fn inverse_undoes_transform() {
        let rot = *nalgebra::Rotation3::from_axis_angle(&nalgebra::Vector3::y_axis(), 0.8)
            .matrix();
        let xf = SpatialTransform::new(rot, Vec3::new(0.5, -1.0, 2.0));
        let v = SpatialVec::new(Vec3::new(0.1, 0.2, 0.3), Vec3::new(-0.4, 0.5, 0.6));

        let there_and_back = xf.inverse().apply_motion(&xf.apply_motion(&v));
        assert_relative_eq!(there_and_back.ang, v.ang, epsilon = 1e-12);
        assert_relative_eq!(there_and_back.lin, v.lin, epsilon = 1e-12);
    }

    #[test]
    fn momentum_agrees_with_dense_inertia() {
        let inertia = SpatialInertia::new(
            2.5,
            Vec3::new(0.1, -0.3, 0.2),
            Mat3::from_diagonal(&Vec3::new(0.4, 0.5, 0.6)),
        );
        let motion = SpatialVec::new(Vec3::new(1.0, -0.5, 0.25), Vec3::new(0.5, 2.0, -1.0));

        let direct = inertia.momentum(&motion);
        let dense = inertia.to_mat6() * motion.to_vec6();
        assert_relative_eq!(direct.to_vec6(), dense, epsilon = 1e-12);
    }

    #[test]
    fn sphere_momentum_of_pure_spin() {
        let inertia = SpatialInertia::sphere(5.0, 0.2);
        let spin = SpatialVec::new(Vec3::z() * 3.0, Vec3::zeros());
        let h = inertia.momentum(&spin);
        assert_relative_eq!(h.ang.z, 0.4 * 5.0 * 0.04 * 3.0, epsilon = 1e-12);
        assert_relative_eq!(h.lin.norm(), 0.0, epsilon = 1e-12);
    }
}
