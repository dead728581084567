pub mod simulation;

pub use simulation::{GravityPlugin, PhysicsSet};
