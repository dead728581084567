//! N-body integrators for the massive bodies
//!
//! Exactly one integrator is active per engine. It mirrors the registry's slot
//! order in its own arrays (velocities, accelerations and whatever history it
//! needs), so every add, removal and growth of the registry is forwarded to it.
//!
//! Flag handling is shared by all implementations: an `INACTIVE` body neither
//! sources nor feels force, a `FIXED_MOTION` body sources force but is moved by
//! the engine rather than by the integrator.

use crate::error::Result;
use crate::physics::body::{BodyFlags, BodyView};
use crate::physics::math::{Scalar, Vector};

pub mod azt;
pub mod hermite;
pub mod leapfrog;
pub mod registry;

pub use azt::AztTriple;
pub use hermite::Hermite;
pub use leapfrog::Leapfrog;

/// Initial state of one body as handed to [`NBodyIntegrator::add_body`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyInit {
    /// Internal (mass-scaled) mass
    pub mass: Scalar,
    /// Physics-space position
    pub position: Vector,
    /// Physics-space velocity
    pub velocity: Vector,
    /// Radius inside which pairs stop interacting (Hermite only)
    pub capture_radius: Scalar,
}

/// Common contract of the massive-body integrators.
pub trait NBodyIntegrator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Resets all internal arrays for up to `capacity` bodies at base step `dt`.
    fn setup(&mut self, capacity: usize, dt: Scalar) -> Result<()>;

    /// Appends a body at `index`, which must equal the current body count.
    fn add_body(&mut self, index: usize, body: &BodyInit) -> Result<()>;

    /// Removes slot `index`, shifting every later slot down by one.
    fn remove_body_at(&mut self, index: usize) -> Result<()>;

    /// Extends the internal arrays by `by` slots, preserving order.
    fn grow(&mut self, by: usize) -> Result<()>;

    /// Seeds accelerations (and any derived state) from the initial positions.
    fn pre_evolve(&mut self, bodies: &mut BodyView<'_>) -> Result<()>;

    /// Advances by at least `duration` and returns the time actually evolved,
    /// which falls short only when the integrator halts.
    fn evolve(&mut self, duration: Scalar, bodies: &mut BodyView<'_>) -> Scalar;

    fn velocity(&self, index: usize) -> Result<Vector>;

    fn set_velocity(&mut self, index: usize, velocity: Vector) -> Result<()>;

    fn acceleration(&self, index: usize) -> Vector;

    /// Total energy of the current state
    fn energy(&self, mass: &[Scalar], position: &[Vector], flags: &[BodyFlags]) -> Scalar;

    /// Total energy captured by the last [`pre_evolve`](Self::pre_evolve)
    fn initial_energy(&self) -> Scalar;

    /// Reason integration stopped, if a step failed beyond recovery.
    /// Cleared by the next [`pre_evolve`](Self::pre_evolve).
    fn halted(&self) -> Option<&str> {
        None
    }

    /// Hard upper bound on the number of bodies, if any
    fn body_limit(&self) -> Option<usize> {
        None
    }
}

/// Kinetic plus pairwise potential energy, skipping inactive bodies.
pub fn total_energy(
    mass: &[Scalar],
    position: &[Vector],
    velocity: &[Vector],
    flags: &[BodyFlags],
) -> Scalar {
    let n = mass.len();
    let mut kinetic = 0.0;
    let mut potential = 0.0;

    for i in 0..n {
        if flags[i].is_inactive() {
            continue;
        }
        kinetic += 0.5 * mass[i] * velocity[i].length_squared();
        for j in (i + 1)..n {
            if flags[j].is_inactive() {
                continue;
            }
            let r = position[i].distance(position[j]);
            if r > 0.0 {
                potential -= mass[i] * mass[j] / r;
            }
        }
    }

    kinetic + potential
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_energy_of_circular_pair() {
        // m = 1 each, separation 2, relative speed sqrt(M/r) = 1
        let mass = [1.0, 1.0];
        let position = [Vector::new(-1.0, 0.0, 0.0), Vector::new(1.0, 0.0, 0.0)];
        let velocity = [Vector::new(0.0, -0.5, 0.0), Vector::new(0.0, 0.5, 0.0)];
        let flags = [BodyFlags::NONE; 2];

        let energy = total_energy(&mass, &position, &velocity, &flags);
        assert!((energy - (0.25 - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_total_energy_skips_inactive() {
        let mass = [1.0, 5.0];
        let position = [Vector::ZERO, Vector::X];
        let velocity = [Vector::X, Vector::ZERO];
        let flags = [BodyFlags::NONE, BodyFlags::INACTIVE];

        let energy = total_energy(&mass, &position, &velocity, &flags);
        assert!((energy - 0.5).abs() < 1e-12);
    }
}
