//! Model types for the kinet simulation kernel.
//!
//! `Model` is the static description of a mechanical system (topology,
//! masses, joint types, named frames). Mutable simulation state lives with
//! the integrator; the dynamics algorithms take `(model, q, v)` directly.
//!
//! Configurations live on a Lie group: spherical and free joints store unit
//! quaternions in `q`, so `nq >= nv` in general and configuration arithmetic
//! goes through each joint's `integrate`/`difference` maps.

pub mod body;
pub mod frame;
pub mod joint;
pub mod model;

pub use body::Body;
pub use frame::Frame;
pub use joint::{Joint, JointType};
pub use model::{Model, ModelBuilder};
