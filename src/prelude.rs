//! Gravitas prelude module
//!
//! Re-exports the types most call sites need to reduce import boilerplate.

// External crate re-exports
pub use bevy::prelude::*;
pub use rand::Rng;

// Internal re-exports - Math
pub use crate::physics::math::{Rotation, Scalar, Vector};

// Internal re-exports - Config, states and events
pub use crate::config::SimulationConfig;
pub use crate::events::SimulationCommand;
pub use crate::states::AppState;

// Internal re-exports - Resources
pub use crate::resources::{InitialEnergy, SharedRng};

// Internal re-exports - Engine
pub use crate::error::{EngineError, Result as EngineResult};
pub use crate::physics::body::BodyId;
pub use crate::physics::collision::CollisionPolicy;
pub use crate::physics::engine::{BodyDesc, Engine, EngineOptions};
pub use crate::physics::orbit::{OrbitData, OrbitElements};
pub use crate::physics::units::{ScaleState, UnitSystem};
