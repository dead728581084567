//! Gravitational physics
//!
//! Everything here is plain Rust with no ECS dependency beyond logging; the
//! [`engine::Engine`] is inserted as a resource by the simulation plugin.

pub mod body;
pub mod collision;
pub mod engine;
pub mod force;
pub mod integrators;
pub mod kepler;
pub mod massless;
pub mod math;
pub mod orbit;
pub mod particles;
pub mod units;
