//! Gravitas library
//!
//! Gravitational N-body engine: unit scaling, softened force laws, leapfrog,
//! Hermite and regularized three-body integrators, a massless fast path,
//! particle swarms and collision resolution. The [`plugins::GravityPlugin`]
//! drives an [`physics::engine::Engine`] from a Bevy app.

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod physics;
pub mod plugins;
pub mod prelude;
pub mod resources;
pub mod scenarios;
pub mod states;

// Test utilities are public for integration tests
pub mod test_utils;
