//! Fourth-order Hermite predictor-corrector with adaptive step

use super::{BodyInit, NBodyIntegrator, total_energy};
use crate::error::{EngineError, Result};
use crate::physics::body::{BodyFlags, BodyView};
use crate::physics::force::SharedForceLaw;
use crate::physics::math::{Scalar, Vector, finite_vector};

/// Softening added to r² and r³ in the pairwise terms
pub const HERMITE_EPSILON: Scalar = 1e-3;

/// Hermite integrator
///
/// Uses acceleration and its time derivative (jerk) at both ends of a step to
/// build a fourth-order Taylor expansion. Each step:
///
/// 1. Predict:
///    x_p = x + v·dt + a·dt²/2 + j·dt³/6
///    v_p = v + a·dt + j·dt²/2
/// 2. Evaluate a_1, j_1 at the predicted state
/// 3. Correct:
///    v_1 = v + (a + a_1)·dt/2 + (j - j_1)·dt²/12
///    x_1 = x + (v + v_1)·dt/2 + (a - a_1)·dt²/12
///
/// The pairwise sum also estimates a collision time, the minimum over all pairs
/// of `r/v` and `sqrt(r/|a_pair|)`. The next step is the base step scaled by
/// that estimate and clamped to `[duration/1000, duration/5]`.
///
/// Pairs closer than the sum of their capture radii are skipped; collision
/// handling is expected to have resolved them.
#[derive(Debug, Default)]
pub struct Hermite {
    dt: Scalar,
    dt_initial: Scalar,
    coll_time: Scalar,
    capacity: usize,
    velocity: Vec<Vector>,
    acceleration: Vec<Vector>,
    jerk: Vec<Vector>,
    old_position: Vec<Vector>,
    old_velocity: Vec<Vector>,
    old_acceleration: Vec<Vector>,
    old_jerk: Vec<Vector>,
    capture_radius: Vec<Scalar>,
    initial_energy: Scalar,
    force: Option<SharedForceLaw>,
}

impl Hermite {
    pub fn new(force: Option<SharedForceLaw>) -> Self {
        Self {
            force,
            coll_time: Scalar::MAX,
            ..Default::default()
        }
    }

    /// Step size chosen for the next internal step
    pub fn current_dt(&self) -> Scalar {
        self.dt
    }

    /// Latest collision-time estimate
    pub fn collision_time(&self) -> Scalar {
        self.coll_time
    }

    fn step(&mut self, bodies: &mut BodyView<'_>) {
        self.old_position.clear();
        self.old_position.extend_from_slice(bodies.position);
        self.old_velocity.clone_from(&self.velocity);
        self.old_acceleration.clone_from(&self.acceleration);
        self.old_jerk.clone_from(&self.jerk);

        self.predict(bodies);
        self.evaluate(bodies.mass, bodies.position, bodies.flags);
        self.correct(bodies);
    }

    fn predict(&mut self, bodies: &mut BodyView<'_>) {
        let dt = self.dt;
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;
        for i in 0..self.velocity.len() {
            if !bodies.flags[i].is_free() {
                continue;
            }
            let (v, a, j) = (self.velocity[i], self.acceleration[i], self.jerk[i]);
            bodies.position[i] += v * dt + a * (dt2 / 2.0) + j * (dt3 / 6.0);
            self.velocity[i] += a * dt + j * (dt2 / 2.0);
        }
    }

    fn correct(&mut self, bodies: &mut BodyView<'_>) {
        let dt = self.dt;
        let dt2 = dt * dt;
        for i in 0..self.velocity.len() {
            if !bodies.flags[i].is_free() {
                continue;
            }
            let velocity = self.old_velocity[i]
                + (self.old_acceleration[i] + self.acceleration[i]) * (dt / 2.0)
                + (self.old_jerk[i] - self.jerk[i]) * (dt2 / 12.0);
            bodies.position[i] = self.old_position[i]
                + (self.old_velocity[i] + velocity) * (dt / 2.0)
                + (self.old_acceleration[i] - self.acceleration[i]) * (dt2 / 12.0);
            self.velocity[i] = velocity;
        }
    }

    /// Recomputes acceleration, jerk and the collision-time estimate.
    fn evaluate(&mut self, mass: &[Scalar], position: &[Vector], flags: &[BodyFlags]) {
        let n = self.velocity.len();
        self.acceleration.fill(Vector::ZERO);
        self.jerk.fill(Vector::ZERO);

        // collision time to the fourth power, minimised over pairs
        let mut coll_time_q = Scalar::MAX;

        for i in 0..n {
            if flags[i].is_inactive() {
                continue;
            }
            for j in (i + 1)..n {
                if flags[j].is_inactive() {
                    continue;
                }
                let rji = position[j] - position[i];
                let vji = self.velocity[j] - self.velocity[i];
                let r2 = rji.length_squared();
                let v2 = vji.length_squared();
                let rv_r2 = rji.dot(vji) / (r2 + HERMITE_EPSILON);
                let r = libm::sqrt(r2);

                if r < self.capture_radius[i] + self.capture_radius[j] {
                    continue;
                }

                let (da, dj) = match &self.force {
                    None => {
                        let r3 = r * r2 + HERMITE_EPSILON;
                        (rji / r3, (vji - rji * (3.0 * rv_r2)) / r3)
                    }
                    Some(law) => {
                        let r_sep = r + HERMITE_EPSILON;
                        let f = law.magnitude(r_sep);
                        let fdot = law.derivative(r_sep);
                        let da = rji * (f / r_sep);
                        let dj = rji * (rv_r2 * fdot) - rji * (rv_r2 * f / r_sep)
                            + vji * (f / r_sep);
                        (da, dj)
                    }
                };

                self.acceleration[i] += da * mass[j];
                self.acceleration[j] -= da * mass[i];
                self.jerk[i] += dj * mass[j];
                self.jerk[j] -= dj * mass[i];

                if v2 > 0.0 {
                    coll_time_q = coll_time_q.min((r2 * r2) / (v2 * v2));
                }
                let mij = mass[i] + mass[j];
                let da2 = da.length_squared() * mij * mij;
                if da2 > 0.0 {
                    coll_time_q = coll_time_q.min(r2 / da2);
                }
            }
        }

        if n > 1 && coll_time_q < Scalar::MAX {
            self.coll_time = libm::sqrt(libm::sqrt(coll_time_q));
        }
    }
}

impl NBodyIntegrator for Hermite {
    fn name(&self) -> &'static str {
        "hermite"
    }

    fn setup(&mut self, capacity: usize, dt: Scalar) -> Result<()> {
        if !(dt > 0.0) {
            return Err(EngineError::ZeroScale { name: "integrator time step" });
        }
        let force = self.force.take();
        *self = Hermite::new(force);
        self.dt = dt;
        self.dt_initial = dt;
        self.capacity = capacity;
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
        self.jerk.push(Vector::ZERO);
        self.capture_radius.push(body.capture_radius.max(0.0));
        Ok(())
    }

    fn remove_body_at(&mut self, index: usize) -> Result<()> {
        self.velocity.remove(index);
        self.acceleration.remove(index);
        self.jerk.remove(index);
        self.capture_radius.remove(index);
        Ok(())
    }

    fn grow(&mut self, by: usize) -> Result<()> {
        self.capacity += by;
        self.velocity.reserve(by);
        self.acceleration.reserve(by);
        self.jerk.reserve(by);
        self.capture_radius.reserve(by);
        Ok(())
    }

    fn pre_evolve(&mut self, bodies: &mut BodyView<'_>) -> Result<()> {
        self.evaluate(bodies.mass, bodies.position, bodies.flags);
        self.initial_energy = total_energy(bodies.mass, bodies.position, &self.velocity, bodies.flags);
        Ok(())
    }

    fn evolve(&mut self, duration: Scalar, bodies: &mut BodyView<'_>) -> Scalar {
        let max_dt = duration / 5.0;
        let min_dt = duration / 1000.0;
        let mut t = 0.0;

        while t < duration {
            t += self.dt;
            self.step(bodies);
            self.dt = (self.dt_initial * self.coll_time).clamp(min_dt, max_dt);
        }

        t
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
