//! Centralized event definitions
//!
//! Simulation control goes through a single command event so input sources
//! (keyboard, scripts, tests) share one handler.

use crate::physics::math::Scalar;
use bevy::prelude::*;

#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub enum SimulationCommand {
    /// Rebuild the engine from the current configuration
    Restart,
    TogglePause,
    /// Queue a new ratio of physical to world time
    SetTimeZoom(Scalar),
}
