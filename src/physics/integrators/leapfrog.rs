//! Leapfrog (kick-drift-kick) integration method

use super::{BodyInit, NBodyIntegrator, total_energy};
use crate::error::{EngineError, Result};
use crate::physics::body::{BodyFlags, BodyView};
use crate::physics::force::{SharedForceLaw, pair_coefficient};
use crate::physics::math::{Scalar, Vector, finite_vector};

/// Softening added to r³ (or r for a custom law) in the pairwise sum
pub const LEAPFROG_EPSILON: Scalar = 1e-4;

/// Fixed-step symplectic leapfrog integrator
///
/// Second-order, time-reversible and symplectic: the energy error oscillates but
/// does not grow secularly, which makes it the default for long runs. Each step
/// costs one O(N²) pairwise acceleration sum.
///
/// The algorithm per step:
/// 1. Kick: v(t+dt/2) = v(t) + a(t)·dt/2
/// 2. Drift: x(t+dt) = x(t) + v(t+dt/2)·dt
/// 3. Recompute a(t+dt) from the new positions
/// 4. Kick: v(t+dt) = v(t+dt/2) + a(t+dt)·dt/2
///
/// `evolve` takes whole steps until at least the requested duration is covered,
/// so it may overshoot by up to one `dt`.
#[derive(Debug, Default)]
pub struct Leapfrog {
    dt: Scalar,
    velocity: Vec<Vector>,
    acceleration: Vec<Vector>,
    capacity: usize,
    initial_energy: Scalar,
    force: Option<SharedForceLaw>,
}

impl Leapfrog {
    pub fn new(force: Option<SharedForceLaw>) -> Self {
        Self {
            force,
            ..Default::default()
        }
    }

    pub fn dt(&self) -> Scalar {
        self.dt
    }

    pub fn body_count(&self) -> usize {
        self.velocity.len()
    }

    fn kick(&mut self, flags: &[BodyFlags], half_dt: Scalar) {
        for ((v, a), flag) in self.velocity.iter_mut().zip(&self.acceleration).zip(flags) {
            if flag.is_free() {
                *v += *a * half_dt;
            }
        }
    }
}

/// Overwrites `acceleration` with the pairwise attraction between active bodies.
pub(crate) fn accumulate_accelerations(
    mass: &[Scalar],
    position: &[Vector],
    flags: &[BodyFlags],
    acceleration: &mut [Vector],
    force: Option<&SharedForceLaw>,
    epsilon: Scalar,
) {
    let n = acceleration.len();
    acceleration.fill(Vector::ZERO);

    for i in 0..n {
        if flags[i].is_inactive() {
            continue;
        }
        for j in (i + 1)..n {
            if flags[j].is_inactive() {
                continue;
            }
            let rji = position[j] - position[i];
            let c = pair_coefficient(force.map(|law| law.as_ref()), rji.length_squared(), epsilon);
            acceleration[i] += rji * (mass[j] * c);
            acceleration[j] -= rji * (mass[i] * c);
        }
    }
}

impl NBodyIntegrator for Leapfrog {
    fn name(&self) -> &'static str {
        "leapfrog"
    }

    fn setup(&mut self, capacity: usize, dt: Scalar) -> Result<()> {
        if !(dt > 0.0) {
            return Err(EngineError::ZeroScale { name: "integrator time step" });
        }
        self.dt = dt;
        self.capacity = capacity;
        self.velocity = Vec::with_capacity(capacity);
        self.acceleration = Vec::with_capacity(capacity);
        self.initial_energy = 0.0;
        Ok(())
    }

    fn add_body(&mut self, index: usize, body: &BodyInit) -> Result<()> {
        if index != self.velocity.len() || index >= self.capacity {
            return Err(EngineError::BodyLimit {
                integrator: self.name(),
                limit: self.capacity,
            });
        }
        self.velocity.push(finite_vector(body.velocity));
        self.acceleration.push(Vector::ZERO);
        Ok(())
    }

    fn remove_body_at(&mut self, index: usize) -> Result<()> {
        self.velocity.remove(index);
        self.acceleration.remove(index);
        Ok(())
    }

    fn grow(&mut self, by: usize) -> Result<()> {
        self.capacity += by;
        self.velocity.reserve(by);
        self.acceleration.reserve(by);
        Ok(())
    }

    fn pre_evolve(&mut self, bodies: &mut BodyView<'_>) -> Result<()> {
        accumulate_accelerations(
            bodies.mass,
            bodies.position,
            bodies.flags,
            &mut self.acceleration,
            self.force.as_ref(),
            LEAPFROG_EPSILON,
        );
        self.initial_energy = total_energy(bodies.mass, bodies.position, &self.velocity, bodies.flags);
        Ok(())
    }

    fn evolve(&mut self, duration: Scalar, bodies: &mut BodyView<'_>) -> Scalar {
        let dt = self.dt;
        let half_dt = dt / 2.0;
        let mut steps: u64 = 0;
        let mut t = 0.0;

        while t < duration {
            steps += 1;

            self.kick(bodies.flags, half_dt);
            for ((r, v), flag) in bodies.position.iter_mut().zip(&self.velocity).zip(bodies.flags) {
                if flag.is_free() {
                    *r += *v * dt;
                }
            }

            accumulate_accelerations(
                bodies.mass,
                bodies.position,
                bodies.flags,
                &mut self.acceleration,
                self.force.as_ref(),
                LEAPFROG_EPSILON,
            );

            self.kick(bodies.flags, half_dt);
            t += dt;
        }

        steps as Scalar * dt
    }

    fn velocity(&self, index: usize) -> Result<Vector> {
        Ok(self.velocity[index])
    }

    fn set_velocity(&mut self, index: usize, velocity: Vector) -> Result<()> {
        self.velocity[index] = finite_vector(velocity);
        Ok(())
    }

    fn acceleration(&self, index: usize) -> Vector {
        self.acceleration[index]
    }

    fn energy(&self, mass: &[Scalar], position: &[Vector], flags: &[BodyFlags]) -> Scalar {
        total_energy(mass, position, &self.velocity, flags)
    }

    fn initial_energy(&self) -> Scalar {
        self.initial_energy
    }
}
