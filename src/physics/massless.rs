//! Fast path for massless test bodies
//!
//! Test bodies feel the field of the massive bodies but never source it and
//! never interact with each other, so they are evolved here with a built-in
//! leapfrog whose double loop runs over (massive × massless) pairs only. This
//! keeps the O(N²) integrator free of bodies that contribute nothing to it and
//! lets capped integrators (AZT) coexist with any number of test bodies.

use crate::physics::body::{BodyFlags, BodyId};
use crate::physics::force::{SharedForceLaw, pair_coefficient};
use crate::physics::math::{Scalar, Vector, finite_vector};
use bevy::log::debug;

/// Softening added to r³ (or r for a custom law)
pub const MASSLESS_EPSILON: Scalar = 1e-4;

/// Capacity increment when the arrays are full
pub const MASSLESS_GROW_BY: usize = 10;

const INITIAL_CAPACITY: usize = 10;

/// Massive-body arrays the test bodies are evolved against.
#[derive(Clone, Copy)]
pub struct FieldSources<'a> {
    pub mass: &'a [Scalar],
    pub position: &'a [Vector],
    pub flags: &'a [BodyFlags],
    /// Squared capture radius per source (used by particle swarms)
    pub capture_radius2: &'a [Scalar],
}

impl FieldSources<'_> {
    pub fn is_empty(&self) -> bool {
        self.mass.is_empty()
    }

    /// Acceleration at `point` from every active source.
    pub fn acceleration_at(&self, point: Vector, force: Option<&SharedForceLaw>, epsilon: Scalar) -> Vector {
        let mut a = Vector::ZERO;
        for i in 0..self.mass.len() {
            if self.flags[i].is_inactive() {
                continue;
            }
            let rji = point - self.position[i];
            let c = pair_coefficient(force.map(|law| law.as_ref()), rji.length_squared(), epsilon);
            a -= rji * (self.mass[i] * c);
        }
        a
    }
}

#[derive(Debug)]
pub struct MasslessBodies {
    dt: Scalar,
    position: Vec<Vector>,
    velocity: Vec<Vector>,
    acceleration: Vec<Vector>,
    flags: Vec<BodyFlags>,
    ids: Vec<BodyId>,
    capacity: usize,
    force: Option<SharedForceLaw>,
}

impl MasslessBodies {
    pub fn new(dt: Scalar, force: Option<SharedForceLaw>) -> Self {
        Self {
            dt,
            position: Vec::with_capacity(INITIAL_CAPACITY),
            velocity: Vec::with_capacity(INITIAL_CAPACITY),
            acceleration: Vec::with_capacity(INITIAL_CAPACITY),
            flags: Vec::with_capacity(INITIAL_CAPACITY),
            ids: Vec::with_capacity(INITIAL_CAPACITY),
            capacity: INITIAL_CAPACITY,
            force,
        }
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dt(&self) -> Scalar {
        self.dt
    }

    pub fn set_force(&mut self, force: Option<SharedForceLaw>) {
        self.force = force;
    }

    /// Appends a test body (physics-space position and velocity) and returns its slot.
    pub fn add(&mut self, id: BodyId, position: Vector, velocity: Vector) -> usize {
        if self.len() + 1 >= self.capacity {
            self.grow(MASSLESS_GROW_BY);
        }
        self.position.push(finite_vector(position));
        self.velocity.push(finite_vector(velocity));
        self.acceleration.push(Vector::ZERO);
        self.flags.push(BodyFlags::NONE);
        self.ids.push(id);
        debug!("Added massless {} at slot {}", id, self.len() - 1);
        self.len() - 1
    }

    fn grow(&mut self, by: usize) {
        self.capacity += by;
        let additional = self.capacity - self.len();
        self.position.reserve(additional);
        self.velocity.reserve(additional);
        self.acceleration.reserve(additional);
        self.flags.reserve(additional);
        self.ids.reserve(additional);
    }

    /// Removes `index`, shifting the tail down. Returns the ids whose slot changed.
    pub fn remove(&mut self, index: usize) -> Vec<BodyId> {
        self.position.remove(index);
        self.velocity.remove(index);
        self.acceleration.remove(index);
        self.flags.remove(index);
        self.ids.remove(index);
        self.ids[index..].to_vec()
    }

    pub fn set_active(&mut self, index: usize, active: bool) {
        if active {
            self.flags[index].remove(BodyFlags::INACTIVE);
        } else {
            self.flags[index].insert(BodyFlags::INACTIVE);
        }
    }

    pub fn is_active(&self, index: usize) -> bool {
        !self.flags[index].is_inactive()
    }

    pub fn ids(&self) -> &[BodyId] {
        &self.ids
    }

    pub fn positions(&self) -> &[Vector] {
        &self.position
    }

    pub fn position(&self, index: usize) -> Vector {
        self.position[index]
    }

    pub fn set_position(&mut self, index: usize, position: Vector) {
        self.position[index] = finite_vector(position);
    }

    pub fn velocity(&self, index: usize) -> Vector {
        self.velocity[index]
    }

    pub fn set_velocity(&mut self, index: usize, velocity: Vector) {
        self.velocity[index] = finite_vector(velocity);
    }

    pub fn acceleration(&self, index: usize) -> Vector {
        self.acceleration[index]
    }

    /// Seeds accelerations from the current massive-body positions.
    pub fn pre_evolve(&mut self, sources: FieldSources<'_>) {
        if sources.is_empty() && self.is_empty() {
            return;
        }
        self.compute_accelerations(sources);
    }

    fn compute_accelerations(&mut self, sources: FieldSources<'_>) {
        for j in 0..self.position.len() {
            self.acceleration[j] = if self.flags[j].is_inactive() {
                Vector::ZERO
            } else {
                sources.acceleration_at(self.position[j], self.force.as_ref(), MASSLESS_EPSILON)
            };
        }
    }

    /// Advances every active test body by whole steps of `dt` until at least
    /// `duration` is covered. Returns the time evolved.
    pub fn evolve(&mut self, duration: Scalar, sources: FieldSources<'_>) -> Scalar {
        if sources.is_empty() && self.is_empty() {
            return duration;
        }

        let dt = self.dt;
        let half_dt = dt / 2.0;
        let mut time = 0.0;

        while time < duration {
            time += dt;
            for i in 0..self.position.len() {
                if self.flags[i].is_inactive() {
                    continue;
                }
                self.velocity[i] += self.acceleration[i] * half_dt;
                self.position[i] += self.velocity[i] * dt;
            }

            self.compute_accelerations(sources);

            for i in 0..self.velocity.len() {
                if !self.flags[i].is_inactive() {
                    self.velocity[i] += self.acceleration[i] * half_dt;
                }
            }
        }

        time
    }
}
