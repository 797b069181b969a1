//! Math primitives for the kinet simulation kernel.
//!
//! Thin nalgebra aliases plus the 6D spatial algebra the dynamics
//! algorithms are written in. Rotation arithmetic (unit quaternions,
//! rotation matrices) comes straight from nalgebra; only the spatial
//! vector/transform/inertia layer is bespoke.

pub mod spatial;

pub use spatial::{SpatialInertia, SpatialTransform, SpatialVec};

/// 3D vector alias.
pub type Vec3 = nalgebra::Vector3<f64>;
/// 6D vector alias.
pub type Vec6 = nalgebra::Vector6<f64>;
/// 3x3 matrix alias.
pub type Mat3 = nalgebra::Matrix3<f64>;
/// 6x6 matrix alias.
pub type Mat6 = nalgebra::Matrix6<f64>;
/// Dynamic vector.
pub type DVec = nalgebra::DVector<f64>;
/// Dynamic matrix.
pub type DMat = nalgebra::DMatrix<f64>;

/// Cross-product matrix: [v]x such that [v]x w = v x w.
#[inline]
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Standard gravity (m/s^2).
pub const GRAVITY: f64 = 9.81;

/// Lower bound on the integration timestep (s). Also fixes the number of
/// significant digits used when stringifying the telemetry time unit.
pub const STEPPER_MIN_TIMESTEP: f64 = 1e-10;
