//! Built-in particle initializers
//!
//! Both work entirely in physics space; callers convert world-space inputs
//! with the current `physics_to_world` factor before constructing them.

use super::ParticleInitializer;
use crate::physics::math::{Rotation, Scalar, Vector, gaussian, random_unit_vector};
use crate::resources::SharedRng;
use bevy::log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Shape of an ejecta cone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplosionParams {
    /// Half-angle of the cone around the contact normal, degrees
    pub cone_width: Scalar,
    /// Distance at which ejecta would come to rest (physics units)
    pub size: Scalar,
    /// Standard deviation of the ejection speed
    pub velocity_spread: Scalar,
    /// Multiplier on the computed ejection speed
    pub soften: Scalar,
}

impl Default for ExplosionParams {
    fn default() -> Self {
        Self {
            cone_width: 30.0,
            size: 20.0,
            velocity_spread: 0.0,
            soften: 1.0,
        }
    }
}

/// The body the ejecta leave from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExplosionSource {
    /// Internal mass
    pub mass: Scalar,
    pub position: Vector,
    pub velocity: Vector,
    /// Diameter
    pub size: Scalar,
}

/// Emits debris from a contact point in a cone around the surface normal.
///
/// The mean ejection speed is chosen so that a particle starting at the
/// contact radius would just reach `params.size` from the body centre.
#[derive(Debug, Clone)]
pub struct ExplosionInitializer {
    params: ExplosionParams,
    contact: Vector,
    rotate_to_normal: Rotation,
    body_velocity: Vector,
    speed: Scalar,
    rng: SharedRng,
}

impl ExplosionInitializer {
    pub fn new(params: ExplosionParams, source: ExplosionSource, contact: Vector, rng: SharedRng) -> Self {
        let normal = (contact - source.position).try_normalize().unwrap_or(Vector::Z);
        let mut contact = contact;
        let mut start_radius = contact.distance(source.position);

        // start outside the body
        if start_radius < source.size / 2.0 {
            start_radius = 1.2 * source.size / 2.0;
            contact = source.position + normal * start_radius;
            debug!("Explosion contact moved out to radius {}", start_radius);
        }

        let speed = ejection_speed(source.mass, params.size, start_radius, params.soften);
        debug!("Explosion: contact = {:?}, normal = {:?}, speed = {}", contact, normal, speed);

        Self {
            params,
            contact,
            rotate_to_normal: Rotation::from_rotation_arc(Vector::Z, normal),
            body_velocity: source.velocity,
            speed,
            rng,
        }
    }

    pub fn contact(&self) -> Vector {
        self.contact
    }

    /// Mean ejection speed relative to the body
    pub fn speed(&self) -> Scalar {
        self.speed
    }
}

/// Speed at `start_radius` whose kinetic energy is used up exactly at `size`.
fn ejection_speed(mass: Scalar, size: Scalar, start_radius: Scalar, soften: Scalar) -> Scalar {
    if size <= 0.0 || start_radius <= 0.0 {
        return 0.0;
    }
    let energy = -mass / size;
    let potential_start = -mass / start_radius;
    let kinetic_start = energy - potential_start;
    soften * libm::sqrt((2.0 * kinetic_start).max(0.0))
}

impl ParticleInitializer for ExplosionInitializer {
    fn init_particles(&mut self, range: Range<usize>, position: &mut [Vector], velocity: &mut [Vector]) {
        let sin_cone = libm::sin(self.params.cone_width.to_radians());
        for i in range {
            let offset = sin_cone * self.rng.random::<Scalar>();
            let angle = 2.0 * std::f64::consts::PI * self.rng.random::<Scalar>();
            let direction = Vector::new(offset * libm::sin(angle), offset * libm::cos(angle), 1.0).normalize();
            let speed = gaussian(&mut self.rng, self.speed, self.params.velocity_spread);

            position[i] = self.contact;
            velocity[i] = self.rotate_to_normal * (direction * speed) + self.body_velocity;
        }
    }
}

/// Fills a sphere uniformly, every particle sharing one velocity.
#[derive(Debug, Clone)]
pub struct DustBall {
    center: Vector,
    radius: Scalar,
    velocity: Vector,
    rng: SharedRng,
}

impl DustBall {
    pub fn new(center: Vector, radius: Scalar, velocity: Vector, rng: SharedRng) -> Self {
        Self {
            center,
            radius,
            velocity,
            rng,
        }
    }
}

impl ParticleInitializer for DustBall {
    fn init_particles(&mut self, range: Range<usize>, position: &mut [Vector], velocity: &mut [Vector]) {
        for i in range {
            let r = self.radius * libm::cbrt(self.rng.random::<Scalar>());
            position[i] = self.center + random_unit_vector(&mut self.rng) * r;
            velocity[i] = self.velocity;
        }
    }
}
